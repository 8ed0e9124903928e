//! State payload helpers: checksum, base64 armoring, lineage extraction.
//!
//! The payload is treated as an opaque blob except for the `lineage`
//! field, which the target backend requires alongside the original
//! serial. The checksum is an MD5 hex digest of the raw bytes, matching
//! the target's state-version wire contract.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use md5::{Digest as _, Md5};

use crate::error::{MigrateError, Result};

/// MD5 hex digest over the raw payload bytes.
#[must_use]
pub fn checksum_hex(raw: &[u8]) -> String {
    hex::encode(Md5::digest(raw))
}

/// Base64-armor the raw payload for transport.
#[must_use]
pub fn armor(raw: &[u8]) -> String {
    STANDARD.encode(raw)
}

/// Decode an armored payload back to raw bytes.
pub fn unarmor(encoded: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(encoded.trim())
        .map_err(|err| MigrateError::InvalidStatePayload {
            reason: format!("invalid base64 armor: {err}"),
        })
}

/// Extract the lineage identifier from a raw state payload.
pub fn lineage(raw: &[u8]) -> Result<String> {
    let value: serde_json::Value =
        serde_json::from_slice(raw).map_err(|err| MigrateError::InvalidStatePayload {
            reason: format!("payload is not JSON: {err}"),
        })?;
    value
        .get("lineage")
        .and_then(serde_json::Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| MigrateError::InvalidStatePayload {
            reason: "payload has no lineage field".to_string(),
        })
}
