//! Changelog source contract
//!
//! The classifier never talks to a source-control host itself. Callers
//! hand it a [`ChangeLogSource`] that answers "which changelogs landed in
//! `(old, new]` of this repository".

use crate::models::ChangeLog;
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Errors raised by a changelog source
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("repository {repo_url} is unavailable: {message}")]
    Unavailable { repo_url: String, message: String },

    #[error("failed to fetch changelogs for {repo_url} ({old_revision}..{new_revision}): {message}")]
    FetchFailed {
        repo_url: String,
        old_revision: String,
        new_revision: String,
        message: String,
    },
}

/// Supplies ordered changelogs for a dependency roll.
pub trait ChangeLogSource {
    /// Changelogs strictly after `old_revision` up to and including
    /// `new_revision`, oldest first. An empty list means nothing is
    /// known about the window.
    fn get_change_logs(
        &self,
        repo_url: &str,
        old_revision: &str,
        new_revision: &str,
    ) -> Result<Vec<ChangeLog>, RepositoryError>;
}

impl<F> ChangeLogSource for F
where
    F: Fn(&str, &str, &str) -> Result<Vec<ChangeLog>, RepositoryError>,
{
    fn get_change_logs(
        &self,
        repo_url: &str,
        old_revision: &str,
        new_revision: &str,
    ) -> Result<Vec<ChangeLog>, RepositoryError> {
        self(repo_url, old_revision, new_revision)
    }
}

/// In-memory history per repository, oldest first
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    histories: FxHashMap<String, Vec<ChangeLog>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `changelogs` to the history of `repo_url`
    pub fn add_history(&mut self, repo_url: &str, changelogs: Vec<ChangeLog>) {
        self.histories
            .entry(repo_url.to_string())
            .or_default()
            .extend(changelogs);
    }

    pub fn with_history(mut self, repo_url: &str, changelogs: Vec<ChangeLog>) -> Self {
        self.add_history(repo_url, changelogs);
        self
    }
}

impl ChangeLogSource for MemoryRepository {
    fn get_change_logs(
        &self,
        repo_url: &str,
        old_revision: &str,
        new_revision: &str,
    ) -> Result<Vec<ChangeLog>, RepositoryError> {
        let Some(history) = self.histories.get(repo_url) else {
            return Ok(Vec::new());
        };

        let Some(end) = history.iter().position(|c| c.revision == new_revision) else {
            return Ok(Vec::new());
        };

        // An unknown old revision means the window starts before our history.
        let start = history[..end]
            .iter()
            .position(|c| c.revision == old_revision)
            .map(|i| i + 1)
            .unwrap_or(0);

        Ok(history[start..=end].to_vec())
    }
}
