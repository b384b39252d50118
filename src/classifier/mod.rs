//! Changelist classifier
//!
//! Finds the changelists most likely to have caused a crash:
//!
//! ```text
//! CrashReport -> generate suspects -> pre-filters -> rank -> post-filters
//! ```
//!
//! Degenerate reports (no regression range, no candidates, a single
//! candidate, no stack trace) are settled before any feature is computed;
//! why is recorded in the [`AnalysisLog`].

pub mod analysis;
pub mod features;
pub mod filters;
pub mod generate;
pub mod log;
pub mod suspect;

pub use analysis::{is_same_file, Analysis, CrashMatch, SuspectMatches};
pub use features::{default_features, default_weights, ChangelistFeature, DEFAULT_MAX_FRAME_INDEX};
pub use filters::{
    apply_filters, FilterIgnoredRevisions, FilterLessLikelySuspects, FilterSuspectFromRobotAuthor,
    InvalidRatio, KeepTopSuspects, SuspectFilter,
};
pub use generate::generate_suspects;
pub use log::{AnalysisLog, LogEntry, LogKind, LogLevel};
pub use suspect::{CandidateSuspect, ScoredSuspect, SuspectSummary};

use crate::config::ClassifierConfig;
use crate::loglinear::{Instance, LogLinearModel, ModelError, Reason};
use crate::models::CrashReport;
use crate::repository::{ChangeLogSource, RepositoryError};
use thiserror::Error;
use tracing::{debug, info};

/// Confidence given to the only suspect of a regression range
pub const ABSOLUTE_CONFIDENCE_SCORE: f64 = 1.0;

pub const ONLY_SUSPECT_REASON: &str = "The suspect is the only commit in the regression range.";

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("invalid robot author pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error(transparent)]
    InvalidRatio(#[from] InvalidRatio),
}

pub type ChangelistModel = LogLinearModel<ChangelistFeature>;

/// Ranks the changelists of a report's regression range
pub struct ChangelistClassifier<S> {
    source: S,
    model: ChangelistModel,
    pre_filters: Vec<Box<dyn SuspectFilter<CandidateSuspect>>>,
    post_filters: Vec<Box<dyn SuspectFilter<ScoredSuspect>>>,
    log: AnalysisLog,
}

impl<S: ChangeLogSource> ChangelistClassifier<S> {
    /// A classifier with no filters
    pub fn new(source: S, model: ChangelistModel) -> Self {
        Self {
            source,
            model,
            pre_filters: Vec::new(),
            post_filters: Vec::new(),
            log: AnalysisLog::new(),
        }
    }

    /// Build the model and filter pipelines described by `config`.
    ///
    /// Post-ranking filters run less-likely pruning first, then the
    /// top-n cut.
    pub fn from_config(source: S, config: &ClassifierConfig) -> Result<Self, ClassifyError> {
        let model = LogLinearModel::new(
            default_features(config.model.max_frame_index),
            &config.model.weights,
        )?
        .with_epsilon(config.model.epsilon);

        let mut classifier = Self::new(source, model)
            .with_pre_filter(FilterIgnoredRevisions::new(&config.filters.ignore_revisions))
            .with_pre_filter(FilterSuspectFromRobotAuthor::new(config.filters.robot_authors.as_slice())?);

        if let Some(ratio) = config.filters.probability_ratio {
            classifier = classifier.with_post_filter(FilterLessLikelySuspects::new(ratio)?);
        }
        Ok(classifier.with_post_filter(KeepTopSuspects::new(config.top_n_suspects)))
    }

    pub fn with_pre_filter(mut self, filter: impl SuspectFilter<CandidateSuspect> + 'static) -> Self {
        self.pre_filters.push(Box::new(filter));
        self
    }

    pub fn with_post_filter(mut self, filter: impl SuspectFilter<ScoredSuspect> + 'static) -> Self {
        self.post_filters.push(Box::new(filter));
        self
    }

    pub fn model(&self) -> &ChangelistModel {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut ChangelistModel {
        &mut self.model
    }

    /// Diagnostics of the most recent [`classify`](Self::classify) call
    pub fn log(&self) -> &AnalysisLog {
        &self.log
    }

    /// Suspects for `report`, most likely first.
    ///
    /// An empty list is a normal answer; see [`log`](Self::log) for why.
    /// Only changelog source failures are errors.
    pub fn classify(&mut self, report: &CrashReport) -> Result<Vec<ScoredSuspect>, ClassifyError> {
        self.log.clear();

        if report.regression_range.is_none() {
            self.log.warning(
                LogKind::NoRegressionRange,
                "Can't find culprits due to unavailable regression range.",
            );
            return Ok(Vec::new());
        }

        let mut suspects = generate_suspects(&self.source, &report.dependency_rolls)?;

        if suspects.is_empty() {
            self.log.warning(
                LogKind::NoSuspects,
                "Can't find any suspected changelists in the regression range.",
            );
            return Ok(Vec::new());
        }

        if suspects.len() == 1 {
            if let Some((_, only)) = suspects.pop() {
                self.log.info(
                    LogKind::OnlyOneSuspect,
                    format!("Suspect {} is the only commit in the regression range.", only.revision()),
                );
                return Ok(vec![only_suspect(only)]);
            }
        }

        if report.stacktrace.as_ref().map_or(true, |t| t.is_empty()) {
            self.log.error(
                LogKind::FailedToParseStacktrace,
                "Can't find culprits because the stacktrace could not be parsed.",
            );
            return Ok(Vec::new());
        }

        Ok(self.find_suspects(report, suspects.into_values().collect()))
    }

    /// Filter, rank and filter again
    pub fn find_suspects(
        &mut self,
        report: &CrashReport,
        suspects: Vec<CandidateSuspect>,
    ) -> Vec<ScoredSuspect> {
        let generated = suspects.len();
        let suspects = apply_filters(&self.pre_filters, suspects);

        let analysis = Analysis::new(report, suspects);
        let ranked = rank_suspects(&mut self.model, &analysis);
        self.model.forget(&analysis);

        let kept = apply_filters(&self.post_filters, ranked);
        if kept.is_empty() {
            self.log.info(
                LogKind::AllSuspectsFiltered,
                format!("All {} suspects were filtered out or scored as impossible.", generated),
            );
        }
        info!(report = %report.identity(), generated, kept = kept.len(), "classified report");
        kept
    }
}

/// Score every suspect of `analysis`, drop the impossible ones and sort
/// the rest by confidence, highest first.
///
/// The sort is stable, so equal confidences keep generation order.
pub fn rank_suspects(model: &mut ChangelistModel, analysis: &Analysis) -> Vec<ScoredSuspect> {
    let mut ranked = Vec::with_capacity(analysis.labels().len());

    for suspect in analysis.labels() {
        let score = model.score(analysis, suspect);
        if ChangelistModel::log_zeroish(score) {
            debug!(revision = suspect.revision(), "pruning suspect with zero probability");
            continue;
        }

        let value = model.features(analysis, suspect).clone();
        ranked.push(ScoredSuspect {
            candidate: suspect.clone(),
            confidence: score,
            reasons: model.format_reasons(&value),
            changed_files: model.aggregate_changed_files(&value),
        });
    }

    ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    ranked
}

fn only_suspect(candidate: CandidateSuspect) -> ScoredSuspect {
    ScoredSuspect {
        candidate,
        confidence: ABSOLUTE_CONFIDENCE_SCORE,
        reasons: vec![Reason {
            feature: "OnlyOneSuspect".to_string(),
            score: ABSOLUTE_CONFIDENCE_SCORE,
            message: ONLY_SUSPECT_REASON.to_string(),
        }],
        changed_files: Vec::new(),
    }
}
