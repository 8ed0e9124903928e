//! Error taxonomy for the migration pipeline.
//!
//! Run-fatal phases (workspace listing, environment directory load)
//! propagate these errors to the caller. Inside the per-workspace
//! pipeline they are converted into a failed outcome for that workspace
//! and never abort the batch.

use std::path::PathBuf;

/// Errors that can occur while migrating a workspace.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// A backend returned a non-success status.
    #[error("backend request failed: {url}: {message}")]
    BackendRequest { url: String, message: String },

    /// The account suffix of a workspace name has no matching environment.
    #[error("no environment found for account '{account}'")]
    UnknownEnvironment { account: String },

    /// A sensitive variable has no counterpart in the secret store.
    #[error("no secret found for sensitive variable '{key}' of workspace '{workspace}'")]
    MissingSecret { workspace: String, key: String },

    /// A local artifact is missing the expected patch anchor line.
    #[error("patch marker not found in {}", path.display())]
    MarkerNotFound { path: PathBuf },

    /// Terraform version exceeds the supported ceiling.
    #[error("unsupported Terraform version: {version}")]
    UnsupportedVersion { version: String },

    /// A downloaded state payload could not be interpreted.
    #[error("invalid state payload: {reason}")]
    InvalidStatePayload { reason: String },

    /// A workspace name does not follow `{project}-{environment}-{account}`.
    #[error("malformed workspace name: '{name}'")]
    MalformedWorkspaceName { name: String },

    /// No project directory was discovered for the workspace's project.
    #[error("no project directory found for '{project}'")]
    UnknownProject { project: String },

    /// The secret store could not be queried.
    #[error("secret store error: {0}")]
    SecretStore(String),

    /// I/O error while reading or patching local artifacts.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Malformed JSON in a response or local artifact.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MigrateError>;
