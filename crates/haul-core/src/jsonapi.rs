//! Minimal JSON:API document model shared by both backend clients.
//!
//! Attributes and relationships stay as raw `serde_json::Value`s at this
//! layer; typed extraction into domain structs happens in [`crate::model`].

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Value, json};

/// Query-string filters. A `BTreeMap` keeps encoding deterministic.
pub type Filters = BTreeMap<String, String>;

/// One JSON:API resource object.
#[derive(Debug, Clone, Deserialize)]
pub struct Resource {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Value,
    #[serde(default)]
    pub relationships: Value,
}

/// Pagination links block. `next` is `null` on the last page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Links {
    #[serde(default)]
    pub next: Option<String>,
}

/// Page-number pagination metadata.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pagination {
    #[serde(default, rename = "next-page")]
    pub next_page: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

/// A list response: `data` is an array of resources.
#[derive(Debug, Clone, Deserialize)]
pub struct ListDocument {
    #[serde(default)]
    pub data: Vec<Resource>,
    #[serde(default)]
    pub links: Links,
    #[serde(default)]
    pub meta: Meta,
}

/// A single-resource response, as returned by create operations.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemDocument {
    pub data: Resource,
}

/// Build a `{"data": {"type": …, "id": …}}` relationship object.
#[must_use]
pub fn relationship(kind: &str, id: &str) -> Value {
    json!({ "data": { "type": kind, "id": id } })
}

/// Encode filters as a query string, `?`-prefixed, or empty when there
/// are no filters. Keys are emitted in sorted order.
#[must_use]
pub fn encode_query(filters: &Filters) -> String {
    if filters.is_empty() {
        return String::new();
    }
    let mut out = String::from("?");
    for (i, (key, value)) in filters.iter().enumerate() {
        if i > 0 {
            out.push('&');
        }
        percent_encode_into(&mut out, key);
        out.push('=');
        percent_encode_into(&mut out, value);
    }
    out
}

/// Percent-encode everything outside the URL-unreserved set.
fn percent_encode_into(out: &mut String, raw: &str) {
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'*' => {
                out.push(byte as char);
            }
            _ => {
                out.push('%');
                out.push_str(&format!("{byte:02X}"));
            }
        }
    }
}
