//! Candidate generation from dependency rolls

use super::suspect::CandidateSuspect;
use crate::models::DependencyRoll;
use crate::repository::{ChangeLogSource, RepositoryError};
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Collect the changelists of every roll, keyed by revision.
///
/// Reverts are never suspects, and a changelist reverted inside the
/// window can't be the culprit either, so both sides of a revert pair are
/// dropped. The map keeps generation order: rolls by dependency path,
/// then changelogs in repository order.
pub fn generate_suspects<S>(
    source: &S,
    dependency_rolls: &BTreeMap<String, DependencyRoll>,
) -> Result<IndexMap<String, CandidateSuspect>, RepositoryError>
where
    S: ChangeLogSource + ?Sized,
{
    let mut suspects: IndexMap<String, CandidateSuspect> = IndexMap::new();
    let mut reverted: FxHashSet<String> = FxHashSet::default();

    for roll in dependency_rolls.values() {
        let Some((old_revision, new_revision)) = roll.window() else {
            debug!(dep_path = %roll.path, "skipping roll without both ends");
            continue;
        };

        let changelogs = source.get_change_logs(&roll.repo_url, old_revision, new_revision)?;
        debug!(
            dep_path = %roll.path,
            old_revision,
            new_revision,
            count = changelogs.len(),
            "fetched changelogs"
        );

        for changelog in changelogs {
            if changelog.is_revert() {
                reverted.extend(changelog.reverted_revision);
                continue;
            }
            if suspects.contains_key(&changelog.revision) {
                continue;
            }
            let revision = changelog.revision.clone();
            suspects.insert(
                revision,
                CandidateSuspect::new(Arc::new(changelog), &roll.path, &roll.repo_url),
            );
        }
    }

    suspects.retain(|revision, _| !reverted.contains(revision));
    Ok(suspects)
}
