//! Suspects before and after ranking
//!
//! Generation produces [`CandidateSuspect`]s; ranking turns the ones that
//! survive into [`ScoredSuspect`]s. Only a scored suspect has a
//! confidence.

use crate::loglinear::{ChangedFile, Keyed, Reason};
use crate::models::ChangeLog;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A changelist that may have caused the crash
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateSuspect {
    pub changelog: Arc<ChangeLog>,
    /// Dependency the changelog landed in
    pub dep_path: String,
    pub repo_url: String,
}

impl CandidateSuspect {
    pub fn new(changelog: Arc<ChangeLog>, dep_path: &str, repo_url: &str) -> Self {
        Self {
            changelog,
            dep_path: dep_path.to_string(),
            repo_url: repo_url.to_string(),
        }
    }

    pub fn revision(&self) -> &str {
        &self.changelog.revision
    }

    /// Repository-relative paths of every touched file
    pub fn touched_paths(&self) -> impl Iterator<Item = &str> {
        self.changelog.touched_files.iter().filter_map(|f| f.path())
    }
}

impl Keyed for CandidateSuspect {
    fn key(&self) -> &str {
        self.revision()
    }
}

/// A ranked suspect
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSuspect {
    pub candidate: CandidateSuspect,
    /// Log-domain score; higher is more likely
    pub confidence: f64,
    pub reasons: Vec<Reason>,
    pub changed_files: Vec<ChangedFile>,
}

impl ScoredSuspect {
    pub fn revision(&self) -> &str {
        self.candidate.revision()
    }

    pub fn changelog(&self) -> &ChangeLog {
        &self.candidate.changelog
    }

    pub fn dep_path(&self) -> &str {
        &self.candidate.dep_path
    }

    /// Reasons as display lines, e.g. `TouchCrashedFile (1.000000): ...`
    pub fn reason_lines(&self) -> Vec<String> {
        self.reasons
            .iter()
            .map(|r| format!("{} ({:.6}): {}", r.feature, r.score, r.message))
            .collect()
    }

    /// Flat, serializable view for callers that persist results
    pub fn summary(&self) -> SuspectSummary {
        let changelog = self.changelog();
        SuspectSummary {
            url: changelog.commit_url.clone(),
            review_url: changelog.code_review_url.clone(),
            revision: changelog.revision.clone(),
            project_path: self.candidate.dep_path.clone(),
            author: changelog.author.email.clone(),
            time: changelog.author.time,
            reasons: self.reason_lines(),
            confidence: self.confidence,
            changed_files: self.changed_files.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspectSummary {
    pub url: String,
    pub review_url: Option<String>,
    pub revision: String,
    pub project_path: String,
    pub author: String,
    pub time: DateTime<Utc>,
    pub reasons: Vec<String>,
    pub confidence: f64,
    pub changed_files: Vec<ChangedFile>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Contributor, FileChangeInfo};
    use chrono::TimeZone;

    fn candidate() -> CandidateSuspect {
        let who = Contributor {
            name: "dev".into(),
            email: "dev@example.org".into(),
            time: Utc.with_ymd_and_hms(2016, 4, 1, 21, 24, 43).unwrap(),
        };
        let changelog = ChangeLog {
            revision: "3".into(),
            reverted_revision: None,
            author: who.clone(),
            committer: who,
            message: "dummy".into(),
            commit_position: Some(176000),
            touched_files: vec![FileChangeInfo::modify("f.cc")],
            commit_url: "https://repo.test/+/3".into(),
            code_review_url: Some("https://codereview.test/3281".into()),
        };
        CandidateSuspect::new(Arc::new(changelog), "src/", "https://repo.test")
    }

    #[test]
    fn test_candidate_is_keyed_by_revision() {
        let suspect = candidate();
        assert_eq!(suspect.key(), "3");
        assert_eq!(suspect.touched_paths().collect::<Vec<_>>(), vec!["f.cc"]);
    }

    #[test]
    fn test_summary_serializes() {
        let scored = ScoredSuspect {
            candidate: candidate(),
            confidence: 0.5,
            reasons: vec![Reason {
                feature: "TouchCrashedFile".into(),
                score: 1.0,
                message: "Touched crashed file f.cc".into(),
            }],
            changed_files: vec![ChangedFile {
                name: "f.cc".into(),
                blame_url: None,
                reasons: vec!["frame #0".into()],
            }],
        };

        let json = serde_json::to_value(scored.summary()).unwrap();
        assert_eq!(json["revision"], "3");
        assert_eq!(json["project_path"], "src/");
        assert_eq!(json["author"], "dev@example.org");
        assert_eq!(json["confidence"], 0.5);
        assert_eq!(
            json["reasons"][0],
            "TouchCrashedFile (1.000000): Touched crashed file f.cc"
        );
        assert_eq!(json["changed_files"][0]["name"], "f.cc");
    }
}
