//! Directory of target-backend environments, loaded once per run.

use std::collections::HashMap;

use crate::backend::TargetBackend;
use crate::error::{MigrateError, Result};
use crate::jsonapi::Filters;
use crate::model::EnvironmentAttrs;

/// Environment name → identifier, with O(1) resolution by account label.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentDirectory {
    by_name: HashMap<String, String>,
}

impl EnvironmentDirectory {
    /// Walk the paginated environment listing of the target backend.
    /// Any page failure is fatal to the run.
    pub fn load(target: &TargetBackend, account_id: &str) -> Result<Self> {
        let mut filters = Filters::new();
        filters.insert("filter[account]".to_string(), account_id.to_string());
        let resources = target.fetch_all("environments", &filters)?;

        let mut by_name = HashMap::with_capacity(resources.len());
        for resource in &resources {
            let attrs = EnvironmentAttrs::from_resource(resource)?;
            by_name.insert(attrs.name, resource.id.clone());
        }
        tracing::debug!(count = by_name.len(), "loaded target environments");
        Ok(Self { by_name })
    }

    /// Build a directory from known entries (prefetched or test data).
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            by_name: entries.into_iter().collect(),
        }
    }

    /// Resolve an account label to an environment identifier.
    pub fn resolve(&self, account: &str) -> Result<&str> {
        self.by_name
            .get(account)
            .map(String::as_str)
            .ok_or_else(|| MigrateError::UnknownEnvironment {
                account: account.to_string(),
            })
    }

    /// All (name, id) entries, sorted by name for deterministic output.
    #[must_use]
    pub fn entries_sorted(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<(&str, &str)> = self
            .by_name
            .iter()
            .map(|(name, id)| (name.as_str(), id.as_str()))
            .collect();
        entries.sort_unstable();
        entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
