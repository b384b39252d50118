//! Changelist features
//!
//! Every feature reads the crash matches precomputed by [`Analysis`], so
//! evaluating one is a lookup plus a little arithmetic.

use super::analysis::{Analysis, CrashMatch};
use super::suspect::CandidateSuspect;
use crate::loglinear::{ChangedFile, Feature, FeatureValue, MetaFeature, WeightMap};

/// Default cap for [`ChangelistFeature::TopFrameIndex`]
pub const DEFAULT_MAX_FRAME_INDEX: usize = 7;

/// The closed set of features scoring a suspect against a crash
#[derive(Debug, Clone, PartialEq)]
pub enum ChangelistFeature {
    /// 1.0 when the suspect touched a file in the stack trace
    TouchCrashedFile,
    /// `1 - i / max_frame_index` for the topmost matched frame `i`;
    /// `-inf` when nothing matched within the cap
    TopFrameIndex { max_frame_index: usize },
    /// 1.0 when the suspect touched a directory holding a crashed file
    TouchCrashedDirectory,
    /// `-ln(n)` for `n` touched files
    NumberOfTouchedFiles,
}

impl ChangelistFeature {
    pub const TOUCH_CRASHED_FILE: &'static str = "TouchCrashedFile";
    pub const TOP_FRAME_INDEX: &'static str = "TopFrameIndex";
    pub const TOUCH_CRASHED_DIRECTORY: &'static str = "TouchCrashedDirectory";
    pub const NUMBER_OF_TOUCHED_FILES: &'static str = "NumberOfTouchedFiles";
}

/// Every feature, in weight order
pub fn default_features(max_frame_index: usize) -> MetaFeature<ChangelistFeature> {
    MetaFeature::new(vec![
        ChangelistFeature::TouchCrashedFile,
        ChangelistFeature::TopFrameIndex { max_frame_index },
        ChangelistFeature::TouchCrashedDirectory,
        ChangelistFeature::NumberOfTouchedFiles,
    ])
}

/// Hand-tuned weights for [`default_features`]
pub fn default_weights() -> WeightMap {
    [
        (ChangelistFeature::TOUCH_CRASHED_FILE, 1.0),
        (ChangelistFeature::TOP_FRAME_INDEX, 1.0),
        (ChangelistFeature::TOUCH_CRASHED_DIRECTORY, 0.5),
        (ChangelistFeature::NUMBER_OF_TOUCHED_FILES, 0.5),
    ]
    .into_iter()
    .map(|(name, weight)| (name.to_string(), weight))
    .collect()
}

impl Feature for ChangelistFeature {
    type Input = Analysis;

    fn name(&self) -> &str {
        match self {
            ChangelistFeature::TouchCrashedFile => Self::TOUCH_CRASHED_FILE,
            ChangelistFeature::TopFrameIndex { .. } => Self::TOP_FRAME_INDEX,
            ChangelistFeature::TouchCrashedDirectory => Self::TOUCH_CRASHED_DIRECTORY,
            ChangelistFeature::NumberOfTouchedFiles => Self::NUMBER_OF_TOUCHED_FILES,
        }
    }

    fn evaluate(&self, x: &Analysis, y: &CandidateSuspect) -> FeatureValue {
        let name = self.name();
        let matches = x.matches(y);

        match self {
            ChangelistFeature::TouchCrashedFile => {
                if matches.files.is_empty() {
                    return FeatureValue::new(name, 0.0);
                }
                let paths: Vec<&str> = matches
                    .files
                    .iter()
                    .map(|m| m.touched_path.as_str())
                    .collect();
                let changed_files = matches
                    .files
                    .iter()
                    .map(|m| changed_file(m, y.revision()))
                    .collect();
                FeatureValue::new(name, 1.0)
                    .with_reason(format!("Touched crashed file(s): {}", paths.join(", ")))
                    .with_changed_files(changed_files)
            }

            ChangelistFeature::TopFrameIndex { max_frame_index } => {
                match matches.top_frame_index() {
                    Some(index) if index < *max_frame_index => {
                        let value = 1.0 - index as f64 / *max_frame_index as f64;
                        FeatureValue::new(name, value)
                            .with_reason(format!("Top frame changed is frame #{}", index))
                    }
                    _ => FeatureValue::new(name, f64::NEG_INFINITY),
                }
            }

            ChangelistFeature::TouchCrashedDirectory => {
                if matches.directories.is_empty() {
                    FeatureValue::new(name, 0.0)
                } else {
                    FeatureValue::new(name, 1.0).with_reason(format!(
                        "Touched crashed directory: {}",
                        matches.directories.join(", ")
                    ))
                }
            }

            ChangelistFeature::NumberOfTouchedFiles => {
                let touched = y.touched_paths().count();
                if touched == 0 {
                    FeatureValue::new(name, 0.0)
                } else {
                    FeatureValue::new(name, -(touched as f64).ln())
                }
            }
        }
    }
}

fn changed_file(found: &CrashMatch, revision: &str) -> ChangedFile {
    let frames: Vec<String> = found.frames.iter().map(|f| f.to_string()).collect();
    ChangedFile {
        name: found
            .touched_path
            .rsplit('/')
            .next()
            .unwrap_or(&found.touched_path)
            .to_string(),
        blame_url: found.frames.first().and_then(|f| f.blame_url(revision)),
        reasons: vec![format!(
            "Touched crashed file {} in frame(s) {}",
            found.touched_path,
            frames.join(", ")
        )],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loglinear::Instance;
    use crate::models::{CallStack, ChangeLog, Contributor, CrashReport, FileChangeInfo, StackFrame, Stacktrace};
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn suspect(revision: &str, files: &[&str]) -> CandidateSuspect {
        let who = Contributor {
            name: "dev".into(),
            email: "dev@example.org".into(),
            time: Utc.with_ymd_and_hms(2016, 3, 31, 21, 24, 43).unwrap(),
        };
        let changelog = ChangeLog {
            revision: revision.into(),
            reverted_revision: None,
            author: who.clone(),
            committer: who,
            message: String::new(),
            commit_position: None,
            touched_files: files.iter().map(|f| FileChangeInfo::modify(f)).collect(),
            commit_url: String::new(),
            code_review_url: None,
        };
        CandidateSuspect::new(Arc::new(changelog), "src/", "https://repo")
    }

    fn analysis() -> Analysis {
        let mut top = StackFrame::new(2, "src/", "Crash", "base/a.cc");
        top.repo_url = Some("https://repo".into());
        top.crashed_line_numbers = vec![10];
        let report = CrashReport {
            signature: "sig".into(),
            stacktrace: Some(Stacktrace::new(vec![CallStack::new(
                0,
                vec![top, StackFrame::new(9, "src/", "Deep", "base/deep.cc")],
            )])),
            ..CrashReport::default()
        };
        Analysis::new(
            &report,
            vec![
                suspect("hit", &["base/a.cc", "README"]),
                suspect("dir", &["base/b.cc"]),
                suspect("deep", &["base/deep.cc"]),
                suspect("empty", &[]),
            ],
        )
    }

    fn value(feature: &ChangelistFeature, revision: &str) -> FeatureValue {
        let x = analysis();
        let y = x.labels().iter().find(|s| s.revision() == revision).unwrap().clone();
        feature.evaluate(&x, &y)
    }

    #[test]
    fn test_touch_crashed_file() {
        let hit = value(&ChangelistFeature::TouchCrashedFile, "hit");
        assert_eq!(hit.value, 1.0);
        assert_eq!(hit.reason.as_deref(), Some("Touched crashed file(s): base/a.cc"));

        let files = hit.changed_files.unwrap();
        assert_eq!(files[0].name, "a.cc");
        assert_eq!(files[0].blame_url.as_deref(), Some("https://repo/+blame/hit/base/a.cc#10"));

        assert_eq!(value(&ChangelistFeature::TouchCrashedFile, "dir").value, 0.0);
    }

    #[test]
    fn test_top_frame_index() {
        let feature = ChangelistFeature::TopFrameIndex { max_frame_index: 7 };
        let hit = value(&feature, "hit");
        assert!((hit.value - (1.0 - 2.0 / 7.0)).abs() < 1e-12);

        assert_eq!(value(&feature, "deep").value, f64::NEG_INFINITY);
        assert_eq!(value(&feature, "dir").value, f64::NEG_INFINITY);
    }

    #[test]
    fn test_touch_crashed_directory() {
        assert_eq!(value(&ChangelistFeature::TouchCrashedDirectory, "dir").value, 1.0);
        assert_eq!(value(&ChangelistFeature::TouchCrashedDirectory, "empty").value, 0.0);
    }

    #[test]
    fn test_number_of_touched_files() {
        let two = value(&ChangelistFeature::NumberOfTouchedFiles, "hit");
        assert!((two.value + 2f64.ln()).abs() < 1e-12);
        assert_eq!(value(&ChangelistFeature::NumberOfTouchedFiles, "empty").value, 0.0);
    }

    #[test]
    fn test_default_weights_cover_default_features() {
        let names = default_features(DEFAULT_MAX_FRAME_INDEX).names();
        let weights = default_weights();
        assert_eq!(names.len(), weights.len());
        assert!(names.iter().all(|n| weights.contains_key(n)));
    }
}
