//! culprit - changelist culprit classification for crash reports
//!
//! Given a crash report with a regression range, finds the changelists
//! that most likely caused the crash and explains why:
//!
//! - [`classifier`] generates suspects from the report's dependency rolls,
//!   filters them and ranks them with a log-linear model
//! - [`loglinear`] is the model itself plus an L-BFGS trainer that fits
//!   its weights on labelled reports
//! - [`repository`] is the contract for fetching changelogs
//!
//! ```no_run
//! use culprit::{ChangelistClassifier, ClassifierConfig, CrashReport, MemoryRepository};
//!
//! let config = ClassifierConfig::default();
//! let mut classifier = ChangelistClassifier::from_config(MemoryRepository::new(), &config)?;
//! for suspect in classifier.classify(&CrashReport::default())? {
//!     println!("{} {:.3}", suspect.revision(), suspect.confidence);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod classifier;
pub mod config;
pub mod loglinear;
pub mod models;
pub mod repository;

pub use classifier::{
    ChangelistClassifier, ClassifyError, LogKind, ScoredSuspect, SuspectSummary,
};
pub use config::ClassifierConfig;
pub use loglinear::{train, LogLinearModel, TrainOptions, TrainingError};
pub use models::{ChangeLog, CrashReport, DependencyRoll};
pub use repository::{ChangeLogSource, MemoryRepository, RepositoryError};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Send `tracing` output to the test harness, filtered by `RUST_LOG`.
/// Safe to call from every test.
pub fn init_test_logging() {
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_test_writer())
        .with(EnvFilter::from_default_env())
        .try_init();
}
