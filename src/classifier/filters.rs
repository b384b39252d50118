//! Suspect filters
//!
//! Pre-ranking filters see [`CandidateSuspect`]s and can only use what
//! the changelog says; post-ranking filters see [`ScoredSuspect`]s and
//! can compare confidences.

use super::suspect::{CandidateSuspect, ScoredSuspect};
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// A pure list-to-list transformation over suspects
pub trait SuspectFilter<S>: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, suspects: Vec<S>) -> Vec<S>;
}

/// Run `filters` in order. Lists of zero or one suspect pass through
/// untouched: there is nothing to choose between.
pub fn apply_filters<S>(filters: &[Box<dyn SuspectFilter<S>>], suspects: Vec<S>) -> Vec<S> {
    if suspects.len() <= 1 || filters.is_empty() {
        return suspects;
    }

    filters.iter().fold(suspects, |suspects, filter| {
        let before = suspects.len();
        let kept = filter.apply(suspects);
        debug!(filter = filter.name(), before, after = kept.len(), "applied suspect filter");
        kept
    })
}

/// Drops revisions known to be irrelevant, per repository
#[derive(Debug, Clone, Default)]
pub struct FilterIgnoredRevisions {
    ignored: FxHashMap<String, FxHashSet<String>>,
}

impl FilterIgnoredRevisions {
    /// `ignored` maps a repository url to its ignorable revisions
    pub fn new(ignored: &BTreeMap<String, Vec<String>>) -> Self {
        Self {
            ignored: ignored
                .iter()
                .map(|(repo, revisions)| (repo.clone(), revisions.iter().cloned().collect()))
                .collect(),
        }
    }

    pub fn is_ignored(&self, suspect: &CandidateSuspect) -> bool {
        self.ignored
            .get(&suspect.repo_url)
            .is_some_and(|revisions| revisions.contains(suspect.revision()))
    }
}

impl SuspectFilter<CandidateSuspect> for FilterIgnoredRevisions {
    fn name(&self) -> &str {
        "FilterIgnoredRevisions"
    }

    fn apply(&self, suspects: Vec<CandidateSuspect>) -> Vec<CandidateSuspect> {
        suspects.into_iter().filter(|s| !self.is_ignored(s)).collect()
    }
}

/// Drops changelists authored by automation (rollers, bots)
#[derive(Debug, Clone)]
pub struct FilterSuspectFromRobotAuthor {
    patterns: Vec<Regex>,
}

impl FilterSuspectFromRobotAuthor {
    /// Build from regexes matched against the author email
    pub fn new<P: AsRef<str>>(patterns: &[P]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn is_robot(&self, suspect: &CandidateSuspect) -> bool {
        let email = &suspect.changelog.author.email;
        self.patterns.iter().any(|p| p.is_match(email))
    }
}

impl SuspectFilter<CandidateSuspect> for FilterSuspectFromRobotAuthor {
    fn name(&self) -> &str {
        "FilterSuspectFromRobotAuthor"
    }

    fn apply(&self, suspects: Vec<CandidateSuspect>) -> Vec<CandidateSuspect> {
        suspects.into_iter().filter(|s| !self.is_robot(s)).collect()
    }
}

/// A probability ratio outside `(0, 1]`
#[derive(Error, Debug, Clone, Copy, PartialEq)]
#[error("probability ratio must be in (0, 1], got {0}")]
pub struct InvalidRatio(pub f64);

/// Keeps suspects whose probability is at least `ratio` times that of
/// the best suspect.
///
/// Confidences are log-domain, so this compares differences against
/// `ln(ratio)`. The ratio is at most 1, so the best suspect always
/// survives.
#[derive(Debug, Clone, Copy)]
pub struct FilterLessLikelySuspects {
    ratio: f64,
}

impl FilterLessLikelySuspects {
    pub fn new(ratio: f64) -> Result<Self, InvalidRatio> {
        if ratio > 0.0 && ratio <= 1.0 {
            Ok(Self { ratio })
        } else {
            Err(InvalidRatio(ratio))
        }
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }
}

impl SuspectFilter<ScoredSuspect> for FilterLessLikelySuspects {
    fn name(&self) -> &str {
        "FilterLessLikelySuspects"
    }

    fn apply(&self, suspects: Vec<ScoredSuspect>) -> Vec<ScoredSuspect> {
        let Some(best) = suspects
            .iter()
            .map(|s| s.confidence)
            .max_by(|a, b| a.total_cmp(b))
        else {
            return suspects;
        };
        let threshold = self.ratio.ln();

        suspects
            .into_iter()
            .filter(|s| s.confidence - best >= threshold)
            .collect()
    }
}

/// Keeps the first `n` suspects
#[derive(Debug, Clone, Copy)]
pub struct KeepTopSuspects {
    pub n: usize,
}

impl KeepTopSuspects {
    pub fn new(n: usize) -> Self {
        Self { n }
    }
}

impl SuspectFilter<ScoredSuspect> for KeepTopSuspects {
    fn name(&self) -> &str {
        "KeepTopSuspects"
    }

    fn apply(&self, mut suspects: Vec<ScoredSuspect>) -> Vec<ScoredSuspect> {
        suspects.truncate(self.n);
        suspects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChangeLog, Contributor};
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn candidate(revision: &str, email: &str) -> CandidateSuspect {
        let who = Contributor {
            name: "someone".into(),
            email: email.into(),
            time: Utc.with_ymd_and_hms(2016, 3, 31, 21, 24, 43).unwrap(),
        };
        let changelog = ChangeLog {
            revision: revision.into(),
            reverted_revision: None,
            author: who.clone(),
            committer: who,
            message: String::new(),
            commit_position: None,
            touched_files: Vec::new(),
            commit_url: String::new(),
            code_review_url: None,
        };
        CandidateSuspect::new(Arc::new(changelog), "src/", "https://src")
    }

    fn scored(revision: &str, confidence: f64) -> ScoredSuspect {
        ScoredSuspect {
            candidate: candidate(revision, "dev@example.org"),
            confidence,
            reasons: Vec::new(),
            changed_files: Vec::new(),
        }
    }

    fn revisions<S>(suspects: &[S], revision: impl Fn(&S) -> &str) -> Vec<&str> {
        suspects.iter().map(revision).collect()
    }

    #[test]
    fn test_ignored_revisions_are_per_repository() {
        let ignored: BTreeMap<String, Vec<String>> =
            [("https://src".to_string(), vec!["2".to_string()])].into_iter().collect();
        let filter = FilterIgnoredRevisions::new(&ignored);

        let mut other_repo = candidate("2", "dev@example.org");
        other_repo.repo_url = "https://elsewhere".into();
        let kept = filter.apply(vec![
            candidate("1", "dev@example.org"),
            candidate("2", "dev@example.org"),
            other_repo,
        ]);

        assert_eq!(kept.len(), 2);
        assert_eq!(kept[1].repo_url, "https://elsewhere");
    }

    #[test]
    fn test_robot_authors() {
        let filter = FilterSuspectFromRobotAuthor::new(&["-autoroll@", r"^bot@"]).unwrap();
        let kept = filter.apply(vec![
            candidate("1", "v8-autoroll@chromium.org"),
            candidate("2", "dev@example.org"),
            candidate("3", "bot@example.org"),
        ]);
        assert_eq!(revisions(&kept, |s| s.revision()), vec!["2"]);

        assert!(FilterSuspectFromRobotAuthor::new(&["("]).is_err());
    }

    #[test]
    fn test_less_likely_suspects() {
        let filter = FilterLessLikelySuspects::new(0.5).unwrap();
        let kept = filter.apply(vec![scored("a", 1.0), scored("b", 0.5), scored("c", -1.0)]);
        assert_eq!(revisions(&kept, |s| s.revision()), vec!["a", "b"]);

        let strict = FilterLessLikelySuspects::new(1.0).unwrap();
        let kept = strict.apply(vec![scored("a", 1.0), scored("b", 1.0), scored("c", 0.9)]);
        assert_eq!(revisions(&kept, |s| s.revision()), vec!["a", "b"]);
    }

    #[test]
    fn test_ratio_outside_unit_interval_is_rejected() {
        for ratio in [2.0, 1.0 + 1e-9, 0.0, -0.5, f64::NAN, f64::INFINITY] {
            assert!(FilterLessLikelySuspects::new(ratio).is_err(), "ratio {}", ratio);
        }

        // At the boundary the best suspect is kept even when it is alone
        // at the top.
        let strict = FilterLessLikelySuspects::new(1.0).unwrap();
        let kept = strict.apply(vec![scored("a", -3.0), scored("b", -3.5)]);
        assert_eq!(revisions(&kept, |s| s.revision()), vec!["a"]);

        let tiny = FilterLessLikelySuspects::new(f64::MIN_POSITIVE).unwrap();
        let kept = tiny.apply(vec![scored("a", 0.0), scored("b", -100.0)]);
        assert_eq!(revisions(&kept, |s| s.revision()), vec!["a", "b"]);
    }

    #[test]
    fn test_pipeline_short_circuits_small_lists() {
        let filters: Vec<Box<dyn SuspectFilter<ScoredSuspect>>> =
            vec![Box::new(KeepTopSuspects::new(0))];

        assert_eq!(apply_filters(&filters, vec![scored("a", 1.0)]).len(), 1);
        assert!(apply_filters(&filters, vec![scored("a", 1.0), scored("b", 0.0)]).is_empty());
        assert_eq!(apply_filters(&[], vec![scored("a", 1.0), scored("b", 0.0)]).len(), 2);
    }
}
