//! Typed views over JSON:API resource attributes.

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::jsonapi::Resource;

fn attributes<T: DeserializeOwned>(resource: &Resource) -> Result<T> {
    Ok(serde_json::from_value(resource.attributes.clone())?)
}

/// A workspace as reported by the source backend.
#[derive(Debug, Clone)]
pub struct SourceWorkspace {
    pub id: String,
    pub name: String,
    pub terraform_version: String,
    pub locked: bool,
    pub resource_count: u64,
    pub auto_apply: bool,
    pub operations: bool,
    pub working_directory: String,
    pub vcs_repo: Option<VcsRepo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct SourceWorkspaceAttrs {
    name: String,
    terraform_version: String,
    #[serde(default)]
    locked: bool,
    #[serde(default)]
    resource_count: u64,
    #[serde(default)]
    auto_apply: bool,
    #[serde(default)]
    operations: bool,
    #[serde(default)]
    working_directory: Option<String>,
    #[serde(default)]
    vcs_repo: Option<VcsRepo>,
}

/// VCS repository binding on a source workspace.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct VcsRepo {
    pub display_identifier: String,
}

impl SourceWorkspace {
    pub fn from_resource(resource: &Resource) -> Result<Self> {
        let attrs: SourceWorkspaceAttrs = attributes(resource)?;
        Ok(Self {
            id: resource.id.clone(),
            name: attrs.name,
            terraform_version: attrs.terraform_version,
            locked: attrs.locked,
            resource_count: attrs.resource_count,
            auto_apply: attrs.auto_apply,
            operations: attrs.operations,
            working_directory: attrs.working_directory.unwrap_or_default(),
            vcs_repo: attrs.vcs_repo,
        })
    }

    /// Trailing `-{account}` segment of the workspace name.
    #[must_use]
    pub fn account(&self) -> &str {
        self.name.rsplit('-').next().unwrap_or(&self.name)
    }
}

/// Metadata for one state version on the source backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StateVersionAttrs {
    pub serial: u64,
    pub hosted_state_download_url: String,
}

impl StateVersionAttrs {
    pub fn from_resource(resource: &Resource) -> Result<Self> {
        attributes(resource)
    }
}

/// A workspace variable on the source backend. Sensitive variables carry
/// a `null` value in the API response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourceVariable {
    pub key: String,
    #[serde(default)]
    pub value: Option<String>,
    pub category: String,
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default)]
    pub description: Option<String>,
}

impl SourceVariable {
    pub fn from_resource(resource: &Resource) -> Result<Self> {
        attributes(resource)
    }
}

/// Attributes of an environment in the target backend.
#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentAttrs {
    pub name: String,
}

impl EnvironmentAttrs {
    pub fn from_resource(resource: &Resource) -> Result<Self> {
        attributes(resource)
    }
}
