//! `haul migrate`: the one-way workspace cutover.

use std::env;
use std::io::Write as _;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use haul_core::backend::{SourceBackend, TargetBackend};
use haul_core::env_dir::EnvironmentDirectory;
use haul_core::migrate::{MigrationConfig, Migrator, RunSummary, WorkspaceOutcome};
use haul_core::patch::{ArtifactPatcher, PatchContext};
use haul_core::secrets::{ParameterStoreCli, SecretResolver};

use crate::credentials::{self, CredentialsFile};
use crate::output::{OutputMode, render};

#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Wildcard pattern selecting source workspaces to migrate.
    #[arg(long, value_name = "PATTERN")]
    pub workspace_filter: String,

    /// Root of the build-tool repository containing projects/.
    #[arg(long, value_name = "PATH")]
    pub project_root: PathBuf,

    /// Target backend account identifier.
    #[arg(long, value_name = "ID")]
    pub account_id: String,

    /// Target backend VCS provider identifier.
    #[arg(long, value_name = "ID")]
    pub vcs_provider: String,

    /// Source backend hostname.
    #[arg(long, default_value = "app.terraform.io", value_name = "HOST")]
    pub source_hostname: String,

    /// Target backend hostname.
    #[arg(long, value_name = "HOST")]
    pub target_hostname: String,

    /// Source backend organization name.
    #[arg(long, value_name = "NAME")]
    pub organization: String,

    /// AWS profile for secret lookups. Falls back to AWS_PROFILE.
    #[arg(long, value_name = "NAME")]
    pub aws_profile: Option<String>,

    /// AWS region for secret lookups. Falls back to AWS_REGION.
    #[arg(long, value_name = "NAME")]
    pub aws_region: Option<String>,

    /// Secret path prefix; secrets live under {prefix}/{workspace}/{key}.
    #[arg(long, value_name = "PREFIX")]
    pub secret_prefix: String,

    /// Leave source workspaces unlocked after migration.
    #[arg(long)]
    pub no_lock: bool,

    /// Credentials file (defaults to ~/.terraform.d/credentials.tfrc.json).
    #[arg(long, value_name = "PATH")]
    pub credentials_file: Option<PathBuf>,

    /// Output the run summary as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Run the migration and return the aggregated summary. Per-workspace
/// failures are recorded in the summary, not returned as errors; only
/// run-fatal setup and listing failures propagate.
pub fn run_migrate(args: &MigrateArgs, output: OutputMode) -> Result<RunSummary> {
    let credentials_path = match &args.credentials_file {
        Some(path) => path.clone(),
        None => credentials::default_path()?,
    };
    let credentials = CredentialsFile::load(&credentials_path)?;

    let source = SourceBackend::new(
        &args.source_hostname,
        credentials.token_for(&args.source_hostname)?,
    );
    let target = TargetBackend::new(
        &args.target_hostname,
        credentials.token_for(&args.target_hostname)?,
    );

    let environments = EnvironmentDirectory::load(&target, &args.account_id)
        .context("failed to load target environments")?;
    let patcher =
        ArtifactPatcher::discover(&args.project_root, &args.target_hostname, environments.clone())
            .with_context(|| {
                format!(
                    "failed to discover projects under {}",
                    args.project_root.display()
                )
            })?;

    let store = ParameterStoreCli::new(
        args.aws_profile
            .clone()
            .or_else(|| env::var("AWS_PROFILE").ok()),
        args.aws_region
            .clone()
            .or_else(|| env::var("AWS_REGION").ok()),
    );
    let resolver = SecretResolver::new(Box::new(store), args.secret_prefix.clone());

    let migrator = Migrator::new(
        source,
        target,
        environments,
        resolver,
        patcher,
        MigrationConfig {
            organization: args.organization.clone(),
            workspace_filter: args.workspace_filter.clone(),
            vcs_provider_id: args.vcs_provider.clone(),
            lock_source: !args.no_lock,
        },
    );

    let workspaces = migrator
        .list_workspaces()
        .context("failed to list source workspaces")?;
    info!(count = workspaces.len(), "starting migration");

    let progress = ProgressBar::new(workspaces.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let mut ctx = PatchContext::new();
    let mut summary = RunSummary::default();
    for workspace in &workspaces {
        progress.set_message(workspace.name.clone());
        let outcome = migrator.migrate_workspace(&mut ctx, workspace);
        match &outcome {
            WorkspaceOutcome::Skipped(reason) => {
                progress.println(format!("skipping {}: {reason}", workspace.name));
            }
            WorkspaceOutcome::Failed { error } => {
                progress.println(format!("failed to migrate {}: {error}", workspace.name));
            }
            WorkspaceOutcome::Migrated { warnings } => {
                for warning in warnings {
                    progress.println(format!("warning for {}: {warning}", workspace.name));
                }
            }
        }
        summary.record(&workspace.name, &outcome);
        progress.inc(1);
    }
    progress.finish_and_clear();

    render(output, &summary, |summary, w| {
        writeln!(w, "haul migrate {}", args.workspace_filter)?;
        writeln!(w, "  workspaces:  {}", summary.total)?;
        writeln!(w, "  migrated:    {}", summary.migrated)?;
        writeln!(w, "  skipped:     {}", summary.skipped)?;
        writeln!(w, "  failed:      {}", summary.failed)?;
        for record in summary.workspaces.iter().filter(|r| r.status == "failed") {
            writeln!(
                w,
                "    {}: {}",
                record.name,
                record.detail.as_deref().unwrap_or("unknown error")
            )?;
        }
        Ok(())
    })?;

    Ok(summary)
}
