//! Local artifact patching: point generated build output at the new
//! backend.
//!
//! Two patch operations per migrated workspace, keyed by the project
//! segment of the workspace name:
//!
//! - a one-time (per project, per run) injection into the build script
//!   `main.ts`, inserted immediately before the `app.synth()` call, that
//!   overrides backend hostname and organization for every child stack;
//! - a rewrite of the generated `cdk.tf.json` for the workspace's
//!   (environment, account) stack, with a metadata annotation so later
//!   regeneration diffs treat the override as intentional.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Value, json};

use crate::env_dir::EnvironmentDirectory;
use crate::error::{MigrateError, Result};

const SYNTH_MARKER: &str = "app.synth()";
const BEGIN_SENTINEL: &str = "// BEGIN backend override (inserted by haul)";
const END_SENTINEL: &str = "// END backend override (inserted by haul)";

/// Run-scoped record of projects whose build script was already injected.
#[derive(Debug, Default)]
pub struct PatchContext {
    injected: HashSet<String>,
}

impl PatchContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Split `{project}-{environment}-{account}` into its three parts. The
/// environment may itself contain hyphens; project and account may not.
fn split_workspace_name(name: &str) -> Result<(&str, &str, &str)> {
    let malformed = || MigrateError::MalformedWorkspaceName {
        name: name.to_string(),
    };
    let (project, rest) = name.split_once('-').ok_or_else(malformed)?;
    let (environment, account) = rest.rsplit_once('-').ok_or_else(malformed)?;
    if project.is_empty() || environment.is_empty() || account.is_empty() {
        return Err(malformed());
    }
    Ok((project, environment, account))
}

/// Rewrites local build artifacts for migrated workspaces.
pub struct ArtifactPatcher {
    project_dirs: HashMap<String, PathBuf>,
    backend_hostname: String,
    environments: EnvironmentDirectory,
}

impl ArtifactPatcher {
    /// Scan `{root}/projects/*` for project directories (lowercased
    /// directory name → path) and capture the override inputs.
    pub fn discover(
        root: &Path,
        backend_hostname: &str,
        environments: EnvironmentDirectory,
    ) -> Result<Self> {
        let projects_dir = root.join("projects");
        let mut project_dirs = HashMap::new();
        for entry in fs::read_dir(&projects_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                let name = entry.file_name().to_string_lossy().to_lowercase();
                project_dirs.insert(name, entry.path());
            }
        }
        tracing::debug!(count = project_dirs.len(), "discovered project directories");
        Ok(Self {
            project_dirs,
            backend_hostname: backend_hostname.to_string(),
            environments,
        })
    }

    /// Patch both artifacts for one migrated workspace.
    pub fn patch_workspace(&self, ctx: &mut PatchContext, workspace_name: &str) -> Result<()> {
        let (project, environment, account) = split_workspace_name(workspace_name)?;
        if !ctx.injected.contains(project) {
            self.inject_build_override(project)?;
            ctx.injected.insert(project.to_string());
        }
        self.patch_generated_config(project, environment, account)
    }

    fn project_dir(&self, project: &str) -> Result<&Path> {
        self.project_dirs
            .get(project)
            .map(PathBuf::as_path)
            .ok_or_else(|| MigrateError::UnknownProject {
                project: project.to_string(),
            })
    }

    /// Insert the override fragment into the project's `main.ts`,
    /// immediately before the `app.synth()` marker line. A file already
    /// carrying the sentinel (from a previous run) is left untouched.
    fn inject_build_override(&self, project: &str) -> Result<()> {
        let path = self.project_dir(project)?.join("main.ts");
        let content = fs::read_to_string(&path)?;
        if content.contains(BEGIN_SENTINEL) {
            tracing::debug!(project, "build script already carries the override");
            return Ok(());
        }

        let marker_line = content
            .lines()
            .position(|line| line.trim_end() == SYNTH_MARKER)
            .ok_or_else(|| MigrateError::MarkerNotFound { path: path.clone() })?;

        let fragment = self.override_fragment();
        let mut patched = String::with_capacity(content.len() + fragment.len());
        for (index, line) in content.lines().enumerate() {
            if index == marker_line {
                patched.push_str(&fragment);
            }
            patched.push_str(line);
            patched.push('\n');
        }
        fs::write(&path, patched)?;
        Ok(())
    }

    /// The injected TypeScript fragment: per-stack overrides of backend
    /// hostname and organization, keyed by account label.
    fn override_fragment(&self) -> String {
        let mut entries = String::new();
        for (name, id) in self.environments.entries_sorted() {
            let _ = writeln!(entries, "        {name}: '{id}',");
        }
        format!(
            "\n{BEGIN_SENTINEL}\n\
             app.node.children.forEach((stack) => {{\n\
             \x20   const backendEnvironments = {{\n\
             {entries}\
             \x20   }}\n\
             \x20   const infraStack = stack as InfraStack\n\
             \x20   const environment = backendEnvironments[infraStack.configuration.awsConfiguration.accountLabel]\n\
             \x20   infraStack.addOverride('terraform.backend.remote.hostname', '{host}')\n\
             \x20   infraStack.addOverride('terraform.backend.remote.organization', environment)\n\
             }})\n\
             {END_SENTINEL}\n",
            host = self.backend_hostname,
        )
    }

    /// Rewrite the generated backend config for one (environment,
    /// account) stack, annotating the overridden fields.
    fn patch_generated_config(&self, project: &str, environment: &str, account: &str) -> Result<()> {
        let path = self
            .project_dir(project)?
            .join("cdktf.out")
            .join("stacks")
            .join(format!("{environment}-{account}"))
            .join("cdk.tf.json");

        let content = fs::read_to_string(&path)?;
        let mut doc: Value = serde_json::from_str(&content)?;
        let organization = self.environments.resolve(account)?.to_string();

        doc["terraform"]["backend"]["remote"]["hostname"] = json!(self.backend_hostname);
        doc["terraform"]["backend"]["remote"]["organization"] = json!(organization);
        // Mark the fields as intentional so regeneration diff tooling
        // does not flag them as drift.
        doc["//"]["metadata"]["overrides"] = json!({ "stack": ["terraform"] });

        let mut rendered = serde_json::to_string_pretty(&doc)?;
        rendered.push('\n');
        fs::write(&path, rendered)?;
        Ok(())
    }
}
