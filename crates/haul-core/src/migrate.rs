//! The migration orchestrator.
//!
//! Drives the per-workspace pipeline: eligibility filtering, the
//! idempotency gate against the target backend, workspace creation,
//! state transfer, variable transfer, source locking, and local
//! artifact patching. Every workspace yields a typed
//! [`WorkspaceOutcome`]; failures inside the pipeline are isolated to
//! the workspace they belong to and never abort the batch.
//!
//! # Partial failure
//!
//! No rollback is attempted. A workspace that fails mid-pipeline may be
//! left partially migrated (target created, state missing); a re-run
//! skips it at the idempotency gate without retrying the missed steps.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::backend::{SourceBackend, TargetBackend};
use crate::env_dir::EnvironmentDirectory;
use crate::error::{MigrateError, Result};
use crate::jsonapi::{Filters, relationship};
use crate::model::{SourceVariable, SourceWorkspace, StateVersionAttrs};
use crate::patch::{ArtifactPatcher, PatchContext};
use crate::secrets::SecretResolver;
use crate::{statefile, version};

/// Reason attached to the lock placed on migrated source workspaces.
pub const LOCK_REASON: &str = "Locked by migrator";

const LIST_PAGE_SIZE: &str = "100";

/// Run-wide settings for one migration.
pub struct MigrationConfig {
    /// Source organization owning the workspaces.
    pub organization: String,
    /// Wildcard pattern selecting workspaces by name.
    pub workspace_filter: String,
    /// VCS provider attached to workspaces that carry a repo binding.
    pub vcs_provider_id: String,
    /// Lock each source workspace once its migration succeeds.
    pub lock_source: bool,
}

/// Why a workspace was skipped. Skips are expected outcomes, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    UnsupportedVersion(String),
    Locked,
    NoResources,
    AlreadyExists,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedVersion(version) => {
                write!(f, "unsupported Terraform version {version}")
            }
            Self::Locked => write!(f, "currently locked"),
            Self::NoResources => write!(f, "no managed resources"),
            Self::AlreadyExists => write!(f, "already exists on the target backend"),
        }
    }
}

/// Terminal result for one workspace.
#[derive(Debug)]
pub enum WorkspaceOutcome {
    /// Fully migrated; `warnings` carries non-fatal issues (e.g. a
    /// failed source lock).
    Migrated { warnings: Vec<String> },
    Skipped(SkipReason),
    Failed { error: String },
}

/// One line of the run summary.
#[derive(Debug, Serialize)]
pub struct WorkspaceRecord {
    pub name: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Aggregated result of a migration run.
#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub migrated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub workspaces: Vec<WorkspaceRecord>,
}

impl RunSummary {
    pub fn record(&mut self, name: &str, outcome: &WorkspaceOutcome) {
        self.total += 1;
        let record = match outcome {
            WorkspaceOutcome::Migrated { warnings } => {
                self.migrated += 1;
                WorkspaceRecord {
                    name: name.to_string(),
                    status: "migrated",
                    detail: None,
                    warnings: warnings.clone(),
                }
            }
            WorkspaceOutcome::Skipped(reason) => {
                self.skipped += 1;
                WorkspaceRecord {
                    name: name.to_string(),
                    status: "skipped",
                    detail: Some(reason.to_string()),
                    warnings: Vec::new(),
                }
            }
            WorkspaceOutcome::Failed { error } => {
                self.failed += 1;
                WorkspaceRecord {
                    name: name.to_string(),
                    status: "failed",
                    detail: Some(error.clone()),
                    warnings: Vec::new(),
                }
            }
        };
        self.workspaces.push(record);
    }

    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// The end-to-end migration pipeline for one source organization.
pub struct Migrator {
    source: SourceBackend,
    target: TargetBackend,
    environments: EnvironmentDirectory,
    secrets: SecretResolver,
    patcher: ArtifactPatcher,
    config: MigrationConfig,
}

impl Migrator {
    #[must_use]
    pub fn new(
        source: SourceBackend,
        target: TargetBackend,
        environments: EnvironmentDirectory,
        secrets: SecretResolver,
        patcher: ArtifactPatcher,
        config: MigrationConfig,
    ) -> Self {
        Self {
            source,
            target,
            environments,
            secrets,
            patcher,
            config,
        }
    }

    /// Fetch every source workspace matching the configured wildcard.
    /// Failures here are fatal to the run: with no listing there is
    /// nothing to migrate.
    pub fn list_workspaces(&self) -> Result<Vec<SourceWorkspace>> {
        let mut filters = Filters::new();
        filters.insert("page[size]".to_string(), LIST_PAGE_SIZE.to_string());
        filters.insert(
            "search[wildcard-name]".to_string(),
            self.config.workspace_filter.clone(),
        );
        let route = format!("organizations/{}/workspaces", self.config.organization);
        let resources = self.source.fetch_all(&route, &filters)?;
        let workspaces = resources
            .iter()
            .map(SourceWorkspace::from_resource)
            .collect::<Result<Vec<_>>>()?;
        info!(count = workspaces.len(), "listed source workspaces");
        Ok(workspaces)
    }

    /// Run the full pipeline for one workspace, isolating any failure.
    pub fn migrate_workspace(
        &self,
        ctx: &mut PatchContext,
        workspace: &SourceWorkspace,
    ) -> WorkspaceOutcome {
        if let Some(reason) = eligibility(workspace) {
            debug!(workspace = %workspace.name, %reason, "skipping");
            return WorkspaceOutcome::Skipped(reason);
        }
        match self.pipeline(ctx, workspace) {
            Ok(outcome) => outcome,
            Err(err) => WorkspaceOutcome::Failed {
                error: err.to_string(),
            },
        }
    }

    fn pipeline(
        &self,
        ctx: &mut PatchContext,
        workspace: &SourceWorkspace,
    ) -> Result<WorkspaceOutcome> {
        let environment_id = self.environments.resolve(workspace.account())?.to_string();

        // Idempotency gate: never create the same (name, environment)
        // twice. A race between check and create is possible across
        // concurrent runs; this is a gate, not a transaction.
        if self.target_workspace_exists(&workspace.name, &environment_id)? {
            return Ok(WorkspaceOutcome::Skipped(SkipReason::AlreadyExists));
        }

        let target_id = self.create_target_workspace(workspace, &environment_id)?;
        self.migrate_state(workspace, &target_id)?;
        self.migrate_variables(workspace, &target_id)?;

        let mut warnings = Vec::new();
        if self.config.lock_source && !workspace.locked {
            // Locking is a post-migration safety step; a failure here
            // must not undo an otherwise complete migration.
            if let Err(err) = self.source.lock_workspace(&workspace.id, LOCK_REASON) {
                warnings.push(format!("failed to lock source workspace: {err}"));
            }
        }

        self.patcher.patch_workspace(ctx, &workspace.name)?;
        info!(workspace = %workspace.name, "migrated");
        Ok(WorkspaceOutcome::Migrated { warnings })
    }

    fn target_workspace_exists(&self, name: &str, environment_id: &str) -> Result<bool> {
        let mut filters = Filters::new();
        filters.insert("filter[name]".to_string(), name.to_string());
        filters.insert(
            "filter[environment]".to_string(),
            environment_id.to_string(),
        );
        let doc = self.target.fetch_page("workspaces", &filters)?;
        Ok(!doc.data.is_empty())
    }

    fn create_target_workspace(
        &self,
        workspace: &SourceWorkspace,
        environment_id: &str,
    ) -> Result<String> {
        // Second version guard: the eligibility filter strips constraint
        // markers, this one does not. A constraint string that slipped
        // past the filter fails the workspace here.
        if !version::supported_strict(&workspace.terraform_version) {
            return Err(MigrateError::UnsupportedVersion {
                version: workspace.terraform_version.clone(),
            });
        }
        let body = workspace_create_body(workspace, environment_id, &self.config.vcs_provider_id);
        let doc = self.target.create("workspaces", &body)?;
        Ok(doc.data.id)
    }

    /// Transfer the latest state version, if any. A workspace without
    /// state is a no-op, not an error.
    fn migrate_state(&self, workspace: &SourceWorkspace, target_id: &str) -> Result<()> {
        let mut filters = Filters::new();
        filters.insert(
            "filter[workspace][name]".to_string(),
            workspace.name.clone(),
        );
        filters.insert(
            "filter[organization][name]".to_string(),
            self.config.organization.clone(),
        );
        filters.insert("page[size]".to_string(), "1".to_string());

        let doc = self.source.fetch_page("state-versions", &filters)?;
        let Some(resource) = doc.data.first() else {
            debug!(workspace = %workspace.name, "no state version to transfer");
            return Ok(());
        };

        let attrs = StateVersionAttrs::from_resource(resource)?;
        let raw = self.source.download(&attrs.hosted_state_download_url)?;
        let body = json!({
            "data": {
                "type": "state-versions",
                "attributes": {
                    "serial": attrs.serial,
                    "md5": statefile::checksum_hex(&raw),
                    "lineage": statefile::lineage(&raw)?,
                    "state": statefile::armor(&raw),
                },
                "relationships": {
                    "workspace": relationship("workspaces", target_id),
                },
            }
        });
        self.target.create("state-versions", &body)?;
        Ok(())
    }

    /// Transfer all variables, resolving sensitive values from the
    /// secret store. The store is queried at most once per workspace,
    /// and only when a sensitive variable exists.
    fn migrate_variables(&self, workspace: &SourceWorkspace, target_id: &str) -> Result<()> {
        let mut filters = Filters::new();
        filters.insert(
            "filter[workspace][name]".to_string(),
            workspace.name.clone(),
        );
        filters.insert(
            "filter[organization][name]".to_string(),
            self.config.organization.clone(),
        );

        let resources = self.source.fetch_all("vars", &filters)?;
        let variables = resources
            .iter()
            .map(SourceVariable::from_resource)
            .collect::<Result<Vec<_>>>()?;

        let resolved = if variables.iter().any(|v| v.sensitive) {
            self.secrets.fetch(&workspace.name)?
        } else {
            BTreeMap::new()
        };

        for variable in &variables {
            let value = transfer_value(variable, &workspace.name, &resolved)?;
            let body = json!({
                "data": {
                    "type": "vars",
                    "attributes": {
                        "key": variable.key,
                        "value": value,
                        "category": variable.category,
                        "sensitive": variable.sensitive,
                        "description": variable.description,
                    },
                    "relationships": {
                        "workspace": relationship("workspaces", target_id),
                    },
                }
            });
            self.target.create("vars", &body)?;
        }
        Ok(())
    }
}

/// Eligibility filter applied before the pipeline. `None` means eligible.
fn eligibility(workspace: &SourceWorkspace) -> Option<SkipReason> {
    if !version::supported_lenient(&workspace.terraform_version) {
        return Some(SkipReason::UnsupportedVersion(
            workspace.terraform_version.clone(),
        ));
    }
    if workspace.locked {
        return Some(SkipReason::Locked);
    }
    if workspace.resource_count == 0 {
        return Some(SkipReason::NoResources);
    }
    None
}

/// Creation payload for the target workspace, mirroring the source's
/// operational attributes.
fn workspace_create_body(
    workspace: &SourceWorkspace,
    environment_id: &str,
    vcs_provider_id: &str,
) -> Value {
    let mut attributes = json!({
        "deletion-protection-enabled": true,
        "name": workspace.name,
        "auto-apply": workspace.auto_apply,
        "operations": workspace.operations,
        "terraform-version": workspace.terraform_version,
        "working-directory": workspace.working_directory,
    });
    let mut relationships = json!({
        "environment": relationship("environments", environment_id),
    });
    if let Some(vcs_repo) = &workspace.vcs_repo {
        attributes["vcs-repo"] = json!({
            "identifier": vcs_repo.display_identifier,
            "branch": "main",
            "dry-runs-enabled": false,
            "trigger-prefixes": [workspace.working_directory],
        });
        relationships["vcs-provider"] = relationship("vcs-providers", vcs_provider_id);
    }
    json!({
        "data": {
            "type": "workspaces",
            "attributes": attributes,
            "relationships": relationships,
        }
    })
}

/// Value carried to the target for one variable: verbatim for plain
/// variables, secret-store lookup for sensitive ones.
fn transfer_value(
    variable: &SourceVariable,
    workspace_name: &str,
    resolved: &BTreeMap<String, String>,
) -> Result<String> {
    if variable.sensitive {
        resolved
            .get(&variable.key)
            .cloned()
            .ok_or_else(|| MigrateError::MissingSecret {
                workspace: workspace_name.to_string(),
                key: variable.key.clone(),
            })
    } else {
        Ok(variable.value.clone().unwrap_or_default())
    }
}
