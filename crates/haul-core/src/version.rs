//! Terraform version parsing and the supported-version ceiling.
//!
//! Versions are compared numerically, segment by segment, so that
//! `1.5.10` sorts above `1.5.7`. A leading `~>` pessimistic-constraint
//! marker is accepted only by the lenient parser used during eligibility
//! filtering; the strict parser used at workspace-creation time rejects
//! anything that is not a plain dotted version.

use std::fmt;

/// Highest Terraform version the target backend accepts.
pub const MAX_SUPPORTED: TerraformVersion = TerraformVersion {
    major: 1,
    minor: 5,
    patch: 7,
};

/// A plain dotted Terraform version, e.g. `1.5.7`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TerraformVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl TerraformVersion {
    /// Parse a plain `major[.minor[.patch]]` version. Missing segments
    /// default to zero. Returns `None` for constraint markers, extra
    /// segments, or non-numeric input.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let mut segments = raw.trim().split('.');
        let major = segments.next()?.parse().ok()?;
        let minor = match segments.next() {
            Some(s) => s.parse().ok()?,
            None => 0,
        };
        let patch = match segments.next() {
            Some(s) => s.parse().ok()?,
            None => 0,
        };
        if segments.next().is_some() {
            return None;
        }
        Some(Self {
            major,
            minor,
            patch,
        })
    }

    /// Parse after stripping a leading `~>` pessimistic marker.
    #[must_use]
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        Self::parse(raw.trim().trim_start_matches("~>"))
    }
}

impl fmt::Display for TerraformVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Eligibility-filter check: strips a `~>` marker before comparing.
/// Unparseable versions count as unsupported.
#[must_use]
pub fn supported_lenient(raw: &str) -> bool {
    TerraformVersion::parse_lenient(raw).is_some_and(|v| v <= MAX_SUPPORTED)
}

/// Creation-time check: the version must be a plain dotted version at or
/// below the ceiling. Constraint strings that slipped past the lenient
/// filter are rejected here.
#[must_use]
pub fn supported_strict(raw: &str) -> bool {
    TerraformVersion::parse(raw).is_some_and(|v| v <= MAX_SUPPORTED)
}
