//! A report prepared for scoring
//!
//! An [`Analysis`] is the model input for one report: the candidate
//! suspects it is scored against plus, per suspect, which touched files
//! and directories line up with the crash. The matching happens once
//! here so that the features stay cheap lookups.

use super::suspect::CandidateSuspect;
use crate::loglinear::{Instance, Keyed};
use crate::models::{CrashReport, StackFrame};
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use sha2::{Digest, Sha256};

/// A touched file that matches a file in the stack trace
#[derive(Debug, Clone, PartialEq)]
pub struct CrashMatch {
    /// Path as touched by the changelog
    pub touched_path: String,
    /// Path as it appears in the stack trace
    pub crashed_path: String,
    /// Frames in that file, in stack order
    pub frames: Vec<StackFrame>,
}

impl CrashMatch {
    /// Smallest frame index among the matched frames
    pub fn top_frame_index(&self) -> Option<usize> {
        self.frames.iter().map(|f| f.index).min()
    }
}

/// What one suspect has in common with the crash
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuspectMatches {
    pub files: Vec<CrashMatch>,
    /// Directories the suspect touched that also hold a crashed file
    pub directories: Vec<String>,
}

impl SuspectMatches {
    pub fn top_frame_index(&self) -> Option<usize> {
        self.files.iter().filter_map(CrashMatch::top_frame_index).min()
    }
}

/// Whether a changelog path and a stack trace path name the same file.
///
/// Either may carry extra leading directories, so one has to be a suffix
/// of the other on a path component boundary.
pub fn is_same_file(touched: &str, crashed: &str) -> bool {
    let touched = touched.trim_start_matches("./");
    let crashed = crashed.trim_start_matches("./");
    if touched.is_empty() || crashed.is_empty() {
        return false;
    }

    let (long, short) = if touched.len() >= crashed.len() {
        (touched, crashed)
    } else {
        (crashed, touched)
    };
    long == short || (long.ends_with(short) && long[..long.len() - short.len()].ends_with('/'))
}

fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Crashed files of one dependency, in first-seen order
type CrashedFiles = IndexMap<String, Vec<StackFrame>>;

/// Model input for one report
#[derive(Debug, Clone)]
pub struct Analysis {
    key: String,
    suspects: Vec<CandidateSuspect>,
    matches: FxHashMap<String, SuspectMatches>,
}

impl Analysis {
    /// Match every suspect's touched files against the report's stack
    /// trace. Frames are matched within the suspect's own dependency.
    pub fn new(report: &CrashReport, suspects: Vec<CandidateSuspect>) -> Self {
        let mut crashed: FxHashMap<&str, CrashedFiles> = FxHashMap::default();
        for stack in report.stacktrace.iter().flat_map(|t| &t.stacks) {
            for frame in &stack.frames {
                if frame.file_path.is_empty() {
                    continue;
                }
                crashed
                    .entry(frame.dep_path.as_str())
                    .or_default()
                    .entry(frame.file_path.clone())
                    .or_default()
                    .push(frame.clone());
            }
        }

        let matches = suspects
            .iter()
            .map(|suspect| {
                let found = crashed
                    .get(suspect.dep_path.as_str())
                    .map(|files| match_suspect(suspect, files))
                    .unwrap_or_default();
                (suspect.revision().to_string(), found)
            })
            .collect();

        Self {
            key: instance_key(report, &suspects),
            suspects,
            matches,
        }
    }

    pub fn suspects(&self) -> &[CandidateSuspect] {
        &self.suspects
    }

    /// Crash matches of `suspect`; empty for an unknown suspect
    pub fn matches(&self, suspect: &CandidateSuspect) -> &SuspectMatches {
        static NONE: SuspectMatches = SuspectMatches {
            files: Vec::new(),
            directories: Vec::new(),
        };
        self.matches.get(suspect.revision()).unwrap_or(&NONE)
    }
}

fn match_suspect(suspect: &CandidateSuspect, crashed: &CrashedFiles) -> SuspectMatches {
    let crashed_dirs: FxHashSet<&str> = crashed.keys().map(|p| parent_dir(p)).collect();
    let mut found = SuspectMatches::default();

    for touched in suspect.touched_paths() {
        for (crashed_path, frames) in crashed {
            if is_same_file(touched, crashed_path) {
                found.files.push(CrashMatch {
                    touched_path: touched.to_string(),
                    crashed_path: crashed_path.clone(),
                    frames: frames.clone(),
                });
            }
        }

        let dir = parent_dir(touched);
        if crashed_dirs
            .iter()
            .any(|crashed_dir| is_same_file(dir, crashed_dir))
            && !found.directories.iter().any(|d| d == dir)
        {
            found.directories.push(dir.to_string());
        }
    }

    found
}

/// Memo key: the report identity plus a digest of everything the features
/// read. Two analyses share memos only when they have the same crashed
/// frames and the same label universe.
fn instance_key(report: &CrashReport, suspects: &[CandidateSuspect]) -> String {
    let mut hasher = Sha256::new();
    for (position, stack) in report.stacktrace.iter().flat_map(|t| &t.stacks).enumerate() {
        for frame in &stack.frames {
            hasher.update(
                format!("{}|{}|{}|{}\n", position, frame.index, frame.dep_path, frame.file_path)
                    .as_bytes(),
            );
        }
    }
    hasher.update(b"--\n");
    for suspect in suspects {
        hasher.update(format!("{}|{}\n", suspect.dep_path, suspect.revision()).as_bytes());
    }
    let digest = format!("{:x}", hasher.finalize());
    format!("{}#{}", report.identity(), &digest[..16])
}

impl Keyed for Analysis {
    fn key(&self) -> &str {
        &self.key
    }
}

impl Instance for Analysis {
    type Label = CandidateSuspect;

    fn labels(&self) -> &[CandidateSuspect] {
        &self.suspects
    }
}
