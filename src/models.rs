//! Core data models for culprit
//!
//! These models describe what the classifier consumes: crash reports,
//! parsed stack traces, dependency rolls and the changelogs fetched for
//! them. They are produced by external collaborators and only read here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of change a changelog made to a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Add,
    Delete,
    Modify,
    Copy,
    Rename,
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeType::Add => write!(f, "add"),
            ChangeType::Delete => write!(f, "delete"),
            ChangeType::Modify => write!(f, "modify"),
            ChangeType::Copy => write!(f, "copy"),
            ChangeType::Rename => write!(f, "rename"),
        }
    }
}

/// One file touched by a changelog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChangeInfo {
    pub change_type: ChangeType,
    #[serde(default)]
    pub old_path: Option<String>,
    #[serde(default)]
    pub new_path: Option<String>,
}

impl FileChangeInfo {
    pub fn new(change_type: ChangeType, old_path: Option<&str>, new_path: Option<&str>) -> Self {
        Self {
            change_type,
            old_path: old_path.map(str::to_string),
            new_path: new_path.map(str::to_string),
        }
    }

    /// Shorthand for a modification of `path`
    pub fn modify(path: &str) -> Self {
        Self::new(ChangeType::Modify, Some(path), Some(path))
    }

    /// Path the change is attributed to.
    ///
    /// Deletes only have an old path; everything else is attributed to
    /// the path the file has after the change.
    pub fn path(&self) -> Option<&str> {
        match self.change_type {
            ChangeType::Delete => self.old_path.as_deref(),
            _ => self.new_path.as_deref().or(self.old_path.as_deref()),
        }
    }
}

/// Author or committer identity of a changelog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    pub name: String,
    pub email: String,
    pub time: DateTime<Utc>,
}

/// One source-control revision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLog {
    pub revision: String,
    /// Revision this changelog reverts, if it is a revert
    #[serde(default)]
    pub reverted_revision: Option<String>,
    pub author: Contributor,
    pub committer: Contributor,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub commit_position: Option<u64>,
    #[serde(default)]
    pub touched_files: Vec<FileChangeInfo>,
    #[serde(default)]
    pub commit_url: String,
    #[serde(default)]
    pub code_review_url: Option<String>,
}

impl ChangeLog {
    /// Whether this changelog reverts another revision
    pub fn is_revert(&self) -> bool {
        self.reverted_revision.is_some()
    }
}

/// A dependency's version window within the regression range
///
/// Either side may be missing when the dependency was added or removed
/// inside the range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRoll {
    /// Mount point of the dependency in the build, e.g. `src/` or `src/v8/`
    pub path: String,
    pub repo_url: String,
    #[serde(default)]
    pub old_revision: Option<String>,
    #[serde(default)]
    pub new_revision: Option<String>,
}

impl DependencyRoll {
    pub fn new(path: &str, repo_url: &str, old_revision: &str, new_revision: &str) -> Self {
        Self {
            path: path.to_string(),
            repo_url: repo_url.to_string(),
            old_revision: Some(old_revision.to_string()),
            new_revision: Some(new_revision.to_string()),
        }
    }

    /// Both ends of the window, if the roll is bounded
    pub fn window(&self) -> Option<(&str, &str)> {
        match (&self.old_revision, &self.new_revision) {
            (Some(old), Some(new)) => Some((old.as_str(), new.as_str())),
            _ => None,
        }
    }
}

/// A frame in a parsed stack trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    /// Index shown in the trace (`#3 ...`), or position in the stack
    pub index: usize,
    /// Dependency the frame belongs to, e.g. `src/`
    pub dep_path: String,
    pub function: String,
    /// Path of the file relative to `dep_path`
    pub file_path: String,
    /// Normalized path as it appeared in the trace
    pub raw_file_path: String,
    #[serde(default)]
    pub crashed_line_numbers: Vec<u32>,
    #[serde(default)]
    pub repo_url: Option<String>,
}

impl StackFrame {
    pub fn new(index: usize, dep_path: &str, function: &str, file_path: &str) -> Self {
        Self {
            index,
            dep_path: dep_path.to_string(),
            function: function.to_string(),
            file_path: file_path.to_string(),
            raw_file_path: format!("{}{}", dep_path, file_path),
            crashed_line_numbers: Vec::new(),
            repo_url: None,
        }
    }

    /// Blame link for this frame's file at `revision`
    pub fn blame_url(&self, revision: &str) -> Option<String> {
        let repo_url = self.repo_url.as_deref()?;
        if self.dep_path.is_empty() {
            return None;
        }

        let mut url = format!("{}/+blame/{}/{}", repo_url, revision, self.file_path);
        if let Some(line) = self.crashed_line_numbers.first() {
            url.push_str(&format!("#{}", line));
        }
        Some(url)
    }
}

impl std::fmt::Display for StackFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} in {} @ {}", self.index, self.function, self.file_path)?;
        if let Some(first) = self.crashed_line_numbers.first() {
            write!(f, ":{}", first)?;
        }
        if self.crashed_line_numbers.len() > 1 {
            write!(f, ":{}", self.crashed_line_numbers.len() - 1)?;
        }
        Ok(())
    }
}

/// One call stack of a stack trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallStack {
    /// Lower is more important; the crashing thread is usually 0
    pub priority: u32,
    pub frames: Vec<StackFrame>,
}

impl CallStack {
    pub fn new(priority: u32, frames: Vec<StackFrame>) -> Self {
        Self { priority, frames }
    }
}

/// A parsed stack trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stacktrace {
    pub stacks: Vec<CallStack>,
    /// Index into `stacks` of the stack that crashed
    #[serde(default)]
    pub crash_stack_index: usize,
}

impl Stacktrace {
    pub fn new(stacks: Vec<CallStack>) -> Self {
        Self {
            stacks,
            crash_stack_index: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.iter().all(|stack| stack.frames.is_empty())
    }
}

/// Everything known about one crash
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrashReport {
    #[serde(default)]
    pub crashed_version: String,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub platform: String,
    /// `None` when the raw trace could not be parsed
    #[serde(default)]
    pub stacktrace: Option<Stacktrace>,
    /// `(last_good, first_bad)`
    #[serde(default)]
    pub regression_range: Option<(String, String)>,
    /// Dependency path -> roll, ordered by path
    #[serde(default)]
    pub dependency_rolls: BTreeMap<String, DependencyRoll>,
}

impl CrashReport {
    /// Human-readable identity of the report
    pub fn identity(&self) -> String {
        format!(
            "{}@{}/{}",
            self.signature, self.crashed_version, self.platform
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_change_path() {
        let delete = FileChangeInfo::new(ChangeType::Delete, Some("a.cc"), None);
        assert_eq!(delete.path(), Some("a.cc"));

        let rename = FileChangeInfo::new(ChangeType::Rename, Some("old.cc"), Some("new.cc"));
        assert_eq!(rename.path(), Some("new.cc"));

        let add = FileChangeInfo::new(ChangeType::Add, None, Some("b.cc"));
        assert_eq!(add.path(), Some("b.cc"));
    }

    #[test]
    fn test_dependency_roll_window() {
        let roll = DependencyRoll::new("src/", "https://repo", "1", "5");
        assert_eq!(roll.window(), Some(("1", "5")));

        let added = DependencyRoll {
            old_revision: None,
            ..roll
        };
        assert_eq!(added.window(), None);
    }

    #[test]
    fn test_blame_url() {
        let mut frame = StackFrame::new(0, "src/", "func", "a.cc");
        assert_eq!(frame.blame_url("9"), None);

        frame.repo_url = Some("https://repo".into());
        frame.crashed_line_numbers = vec![12, 13];
        assert_eq!(
            frame.blame_url("9").as_deref(),
            Some("https://repo/+blame/9/a.cc#12")
        );
        assert_eq!(frame.to_string(), "#0 in func @ a.cc:12:1");
    }

    #[test]
    fn test_report_deserializes_with_defaults() {
        let report: CrashReport = serde_json::from_str(r#"{"signature": "sig"}"#).unwrap();
        assert_eq!(report.signature, "sig");
        assert!(report.stacktrace.is_none());
        assert!(report.regression_range.is_none());
        assert!(report.dependency_rolls.is_empty());
    }
}
