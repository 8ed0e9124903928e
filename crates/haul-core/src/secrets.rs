//! Secret resolution for sensitive variables.
//!
//! The source API withholds sensitive values, so they are re-read from a
//! path-scoped secret store under `{prefix}/{workspace}/{key}`. The store
//! itself sits behind a trait; production drives the `aws ssm` CLI the
//! same way the rest of the pipeline shells out to external tooling, and
//! tests substitute an in-memory map.

use std::collections::BTreeMap;
use std::process::Command;

use serde::Deserialize;

use crate::error::{MigrateError, Result};

/// Path-scoped, recursive, decrypting secret lookup.
pub trait SecretStore {
    /// Fetch every secret under `path`, keyed by the leaf path segment.
    fn fetch_by_path(&self, path: &str) -> Result<BTreeMap<String, String>>;
}

/// Store implementation over `aws ssm get-parameters-by-path`.
pub struct ParameterStoreCli {
    profile: Option<String>,
    region: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ParameterPage {
    #[serde(default)]
    parameters: Vec<Parameter>,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Parameter {
    name: String,
    value: String,
}

impl ParameterStoreCli {
    #[must_use]
    pub fn new(profile: Option<String>, region: Option<String>) -> Self {
        Self { profile, region }
    }

    fn fetch_page(&self, path: &str, starting_token: Option<&str>) -> Result<ParameterPage> {
        let mut cmd = Command::new("aws");
        cmd.args([
            "ssm",
            "get-parameters-by-path",
            "--path",
            path,
            "--recursive",
            "--with-decryption",
            "--output",
            "json",
        ]);
        if let Some(profile) = &self.profile {
            cmd.args(["--profile", profile]);
        }
        if let Some(region) = &self.region {
            cmd.args(["--region", region]);
        }
        if let Some(token) = starting_token {
            cmd.args(["--starting-token", token]);
        }

        let output = cmd
            .output()
            .map_err(|err| MigrateError::SecretStore(format!("failed to run aws CLI: {err}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MigrateError::SecretStore(format!(
                "aws ssm get-parameters-by-path failed: {}",
                stderr.trim()
            )));
        }
        serde_json::from_slice(&output.stdout)
            .map_err(|err| MigrateError::SecretStore(format!("unparseable aws CLI output: {err}")))
    }
}

impl SecretStore for ParameterStoreCli {
    fn fetch_by_path(&self, path: &str) -> Result<BTreeMap<String, String>> {
        let mut secrets = BTreeMap::new();
        let mut token: Option<String> = None;
        loop {
            let page = self.fetch_page(path, token.as_deref())?;
            for parameter in page.parameters {
                secrets.insert(leaf_key(&parameter.name).to_string(), parameter.value);
            }
            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        Ok(secrets)
    }
}

/// Last path segment of a parameter name.
fn leaf_key(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Fetches the secret set for one workspace, on demand.
pub struct SecretResolver {
    store: Box<dyn SecretStore>,
    prefix: String,
}

impl SecretResolver {
    #[must_use]
    pub fn new(store: Box<dyn SecretStore>, prefix: String) -> Self {
        Self { store, prefix }
    }

    /// All secrets scoped to `workspace_name`, keyed by variable key.
    pub fn fetch(&self, workspace_name: &str) -> Result<BTreeMap<String, String>> {
        let path = format!(
            "{}/{workspace_name}",
            self.prefix.trim_end_matches('/')
        );
        self.store.fetch_by_path(&path)
    }
}
