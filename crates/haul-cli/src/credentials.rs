//! Backend credentials from the local `credentials.tfrc.json` file.
//!
//! Tokens are keyed by hostname; both the source and the target backend
//! must have an entry before a migration can run.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct CredentialsFile {
    credentials: HashMap<String, HostCredential>,
}

#[derive(Debug, Deserialize)]
struct HostCredential {
    token: String,
}

impl CredentialsFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read credentials file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid credentials file {}", path.display()))
    }

    /// Token for one backend hostname.
    pub fn token_for(&self, hostname: &str) -> Result<String> {
        self.credentials
            .get(hostname)
            .map(|credential| credential.token.clone())
            .with_context(|| format!("no credentials entry for hostname '{hostname}'"))
    }
}

/// Conventional credentials location: `~/.terraform.d/credentials.tfrc.json`.
pub fn default_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("could not determine home directory")?;
    Ok(home.join(".terraform.d").join("credentials.tfrc.json"))
}
