//! Log-linear (maximum-entropy) models
//!
//! - [`feature`]: the [`Feature`] capability and ordered [`MetaFeature`]s
//! - [`weights`]: named weights laid out in feature order
//! - [`model`]: memoized scoring, partition function and expectations
//! - [`train`]: L2-regularized maximum-likelihood fitting with L-BFGS
//!
//! The model is generic over its input: anything implementing [`Instance`]
//! (which owns its label universe) can be scored.

mod cache;
pub mod feature;
pub mod math;
pub mod model;
pub mod train;
pub mod weights;

pub use feature::{
    ChangedFile, Feature, FeatureValue, Instance, Keyed, MetaFeature, MetaFeatureValue, Reason,
};
pub use model::{Label, LogLinearModel, EPSILON};
pub use train::{train, TrainOptions, TrainableLogLinearModel, TrainingError, TrainingSummary};
pub use weights::{WeightMap, Weights};

use thiserror::Error;

/// Errors raised when building a model or replacing its weights
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("expected {expected} weights, got {actual}")]
    WeightLengthMismatch { expected: usize, actual: usize },

    #[error("weight for feature {feature} is not finite ({value})")]
    NonFiniteWeight { feature: String, value: f64 },

    #[error("weight given for unknown feature {0}")]
    UnknownWeight(String),

    #[error("no weight given for feature {0}")]
    MissingWeight(String),
}
