//! haul-core: one-way migration of remote Terraform workspaces between
//! state backends.
//!
//! The [`migrate::Migrator`] drives the pipeline: list and filter source
//! workspaces, check the target for an existing counterpart, create it,
//! transfer the latest state snapshot and all variables (resolving
//! sensitive values from a secret store), lock the source, and patch the
//! local generated build artifacts to point at the new backend.

pub mod backend;
pub mod env_dir;
pub mod error;
pub mod jsonapi;
pub mod migrate;
pub mod model;
pub mod patch;
pub mod secrets;
pub mod statefile;
pub mod version;
