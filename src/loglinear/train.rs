//! Maximum-likelihood training for log-linear models
//!
//! Fits weights by minimizing the L2-regularized negative conditional
//! log-likelihood with L-BFGS:
//!
//! ```text
//! LL(w)         = w · Σᵢ φ(xᵢ, yᵢ) − Σᵢ log Z(xᵢ)
//! ∇LL(w)        = observed − Σᵢ E_{y ~ Pr(·|xᵢ)}[φ(xᵢ, y)]
//! objective(w)  = −LL(w) + ½ λ ‖w‖²
//! gradient(w)   = −∇LL(w) + λ w
//! ```
//!
//! The observed feature vector is a property of the training set alone,
//! so it is computed once up front.

use super::feature::{Feature, Instance, Keyed, MetaFeature};
use super::math::{add_scaled, l2_norm, quadrance, vsum};
use super::model::{Label, LogLinearModel};
use super::weights::WeightMap;
use super::ModelError;
use argmin::core::{CostFunction, Executor, Gradient, State, TerminationReason, TerminationStatus};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use rayon::prelude::*;
use std::cell::RefCell;
use thiserror::Error;
use tracing::{debug, error, info};

/// Errors raised while building or training a model
#[derive(Error, Debug)]
pub enum TrainingError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("training set is empty")]
    EmptyTrainingSet,

    #[error("label {label} is not a candidate of instance {input}")]
    LabelNotInUniverse { input: String, label: String },

    #[error("observed value of feature {feature} is not finite ({value})")]
    NonFiniteObservation { feature: String, value: f64 },

    #[error(
        "feature {feature} of label {label} in instance {input} is {value} while the label \
         has nonzero probability; give that feature a nonzero initial weight or drop it"
    )]
    NonFiniteFeature {
        input: String,
        label: String,
        feature: String,
        value: f64,
    },

    #[error("l2 penalty must be finite and non-negative, got {0}")]
    InvalidPenalty(f64),

    #[error("optimizer failed: {0}")]
    Optimizer(String),

    #[error(
        "training did not converge ({reason}): objective {objective}, gradient norm \
         {gradient_norm}, {iterations} iterations, {cost_evaluations} cost and \
         {gradient_evaluations} gradient evaluations"
    )]
    NotConverged {
        reason: String,
        objective: f64,
        gradient_norm: f64,
        iterations: u64,
        cost_evaluations: u64,
        gradient_evaluations: u64,
    },
}

/// Optimizer settings
#[derive(Debug, Clone)]
pub struct TrainOptions {
    /// Iteration cap; reaching it counts as non-convergence
    pub max_iterations: u64,
    /// Number of correction pairs L-BFGS keeps
    pub history_size: usize,
    pub gradient_tolerance: f64,
    pub cost_tolerance: f64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            history_size: 7,
            gradient_tolerance: 1e-6,
            cost_tolerance: 1e-10,
        }
    }
}

/// What a successful training run reports
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    /// Final value of the regularized objective
    pub objective: f64,
    /// Unregularized log-likelihood at the trained weights
    pub log_likelihood: f64,
    pub gradient_norm: f64,
    pub iterations: u64,
    pub cost_evaluations: u64,
    pub gradient_evaluations: u64,
}

struct TrainingExample<X> {
    input: X,
    /// Index of the correct label in `input.labels()`
    label: usize,
}

/// A [`LogLinearModel`] plus labelled data to fit its weights on.
///
/// Features may be `-inf` to rule a label out, but only while their
/// weight is nonzero: at a zero weight the label keeps its probability
/// and the expected feature vector becomes infinite. Construction
/// rejects such labels at the initial weights. A weight that crosses
/// zero during optimization ends the run with
/// [`TrainingError::NotConverged`].
pub struct TrainableLogLinearModel<F: Feature> {
    model: LogLinearModel<F>,
    examples: Vec<TrainingExample<F::Input>>,
    observed: Vec<f64>,
}

impl<F: Feature> TrainableLogLinearModel<F> {
    /// Build a trainable model from `(x, y)` pairs, where each `y` must
    /// be one of `x`'s candidate labels.
    pub fn new(
        meta: MetaFeature<F>,
        training_data: Vec<(F::Input, Label<F>)>,
        initial_weights: &WeightMap,
    ) -> Result<Self, TrainingError>
    where
        F::Input: Sync,
    {
        if training_data.is_empty() {
            return Err(TrainingError::EmptyTrainingSet);
        }

        let mut model = LogLinearModel::new(meta, initial_weights)?;

        let examples = training_data
            .into_iter()
            .map(|(input, label)| {
                let index = input.label_index(label.key()).ok_or_else(|| {
                    TrainingError::LabelNotInUniverse {
                        input: input.key().to_string(),
                        label: label.key().to_string(),
                    }
                })?;
                Ok(TrainingExample {
                    input,
                    label: index,
                })
            })
            .collect::<Result<Vec<_>, TrainingError>>()?;

        let width = model.weights().len();
        let meta = model.meta_feature();
        let observed = examples
            .par_iter()
            .map(|ex| {
                meta.evaluate(&ex.input, &ex.input.labels()[ex.label])
                    .vector()
            })
            .reduce(|| vec![0.0; width], vsum);

        if let Some((index, &value)) = observed.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(TrainingError::NonFiniteObservation {
                feature: model.weights().names()[index].clone(),
                value,
            });
        }

        for ex in &examples {
            for y in ex.input.labels() {
                if LogLinearModel::<F>::log_zeroish(model.score(&ex.input, y)) {
                    continue;
                }
                let values = model.features(&ex.input, y).values();
                if let Some(bad) = values.iter().find(|v| !v.value.is_finite()) {
                    return Err(TrainingError::NonFiniteFeature {
                        input: ex.input.key().to_string(),
                        label: y.key().to_string(),
                        feature: bad.name.clone(),
                        value: bad.value,
                    });
                }
            }
        }

        debug!(examples = examples.len(), ?observed, "observed feature vector");

        Ok(Self {
            model,
            examples,
            observed,
        })
    }

    pub fn model(&self) -> &LogLinearModel<F> {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut LogLinearModel<F> {
        &mut self.model
    }

    pub fn into_model(self) -> LogLinearModel<F> {
        self.model
    }

    /// Sum of the feature vectors of the labelled pairs
    pub fn observed_features(&self) -> &[f64] {
        &self.observed
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn set_weights(&mut self, values: &[f64]) -> Result<bool, ModelError> {
        self.model.set_weights(values)
    }

    /// Conditional log-likelihood of the training set at the current weights
    pub fn log_likelihood(&mut self) -> f64 {
        let observed_score = self.model.weighted_sum(&self.observed);
        let log_z: f64 = self
            .examples
            .iter()
            .map(|ex| self.model.log_z(&ex.input))
            .sum();
        observed_score - log_z
    }

    /// Observed minus expected feature vector
    pub fn log_likelihood_gradient(&mut self) -> Vec<f64> {
        let mut gradient = self.observed.clone();
        for ex in &self.examples {
            let expected = self.model.expected_features(&ex.input);
            add_scaled(&mut gradient, -1.0, &expected);
        }
        gradient
    }

    /// Fit the weights with L-BFGS under an L2 penalty.
    ///
    /// On success the model holds the optimizer's best point. On failure
    /// the initial weights are restored and the error carries the
    /// optimizer's final state.
    pub fn train_weights(
        &mut self,
        l2_penalty: f64,
        options: &TrainOptions,
    ) -> Result<TrainingSummary, TrainingError> {
        if !l2_penalty.is_finite() || l2_penalty < 0.0 {
            return Err(TrainingError::InvalidPenalty(l2_penalty));
        }

        let initial = self.model.weights().values().to_vec();
        info!(
            examples = self.examples.len(),
            features = initial.len(),
            l2_penalty,
            "training log-linear weights"
        );

        let outcome = {
            let problem = Likelihood {
                trainee: RefCell::new(&mut *self),
                l2_penalty,
            };
            let linesearch = MoreThuenteLineSearch::new();
            let solver = LBFGS::new(linesearch, options.history_size)
                .with_tolerance_grad(options.gradient_tolerance)
                .and_then(|solver| solver.with_tolerance_cost(options.cost_tolerance))
                .map_err(|e| TrainingError::Optimizer(e.to_string()))?;

            let start = initial.clone();
            let result = Executor::new(problem, solver)
                .configure(|state| state.param(start).max_iters(options.max_iterations))
                .run()
                .map_err(|e| TrainingError::Optimizer(e.to_string()))?;

            let state = result.state();
            let counts = state.get_func_counts();
            Outcome {
                converged: matches!(
                    state.get_termination_status(),
                    TerminationStatus::Terminated(
                        TerminationReason::SolverConverged | TerminationReason::TargetCostReached
                    )
                ),
                status: format!("{:?}", state.get_termination_status()),
                best: state.get_best_param().cloned(),
                objective: state.get_best_cost(),
                gradient_norm: state.get_gradient().map(|g| l2_norm(g)).unwrap_or(f64::NAN),
                iterations: state.get_iter(),
                cost_evaluations: counts.get("cost_count").copied().unwrap_or(0),
                gradient_evaluations: counts.get("gradient_count").copied().unwrap_or(0),
            }
        };

        let best = match outcome.best {
            Some(best) if outcome.converged => best,
            _ => {
                self.model.set_weights(&initial)?;
                error!(
                    status = %outcome.status,
                    objective = outcome.objective,
                    gradient_norm = outcome.gradient_norm,
                    iterations = outcome.iterations,
                    "training did not converge"
                );
                return Err(TrainingError::NotConverged {
                    reason: outcome.status,
                    objective: outcome.objective,
                    gradient_norm: outcome.gradient_norm,
                    iterations: outcome.iterations,
                    cost_evaluations: outcome.cost_evaluations,
                    gradient_evaluations: outcome.gradient_evaluations,
                });
            }
        };

        // The last objective evaluation may have been a line-search probe,
        // not the best point.
        self.model.set_weights(&best)?;
        let log_likelihood = self.log_likelihood();

        info!(
            objective = outcome.objective,
            log_likelihood,
            iterations = outcome.iterations,
            "training converged"
        );

        Ok(TrainingSummary {
            objective: outcome.objective,
            log_likelihood,
            gradient_norm: outcome.gradient_norm,
            iterations: outcome.iterations,
            cost_evaluations: outcome.cost_evaluations,
            gradient_evaluations: outcome.gradient_evaluations,
        })
    }
}

impl<F: Feature> std::fmt::Debug for TrainableLogLinearModel<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainableLogLinearModel")
            .field("weights", self.model.weights())
            .field("examples", &self.examples.len())
            .field("observed", &self.observed)
            .finish()
    }
}

/// Fit weights for `meta` on `training_data` and return them by name
pub fn train<F>(
    meta: MetaFeature<F>,
    training_data: Vec<(F::Input, Label<F>)>,
    initial_weights: &WeightMap,
    l2_penalty: f64,
    options: &TrainOptions,
) -> Result<WeightMap, TrainingError>
where
    F: Feature,
    F::Input: Sync,
{
    let mut trainable = TrainableLogLinearModel::new(meta, training_data, initial_weights)?;
    trainable.train_weights(l2_penalty, options)?;
    Ok(trainable.model().weights().to_map())
}

struct Outcome {
    converged: bool,
    status: String,
    best: Option<Vec<f64>>,
    objective: f64,
    gradient_norm: f64,
    iterations: u64,
    cost_evaluations: u64,
    gradient_evaluations: u64,
}

/// The optimizer's view of a trainable model.
///
/// Cost and gradient take `&self`, so the model sits behind a `RefCell`;
/// evaluating either one moves the model's weights to the trial point.
/// The `RefCell` keeps the whole run on one thread.
struct Likelihood<'a, F: Feature> {
    trainee: RefCell<&'a mut TrainableLogLinearModel<F>>,
    l2_penalty: f64,
}

impl<F: Feature> CostFunction for Likelihood<'_, F> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, weights: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        let mut trainee = self.trainee.borrow_mut();
        trainee.set_weights(weights)?;
        Ok(-trainee.log_likelihood() + 0.5 * self.l2_penalty * quadrance(weights))
    }
}

impl<F: Feature> Gradient for Likelihood<'_, F> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, weights: &Self::Param) -> Result<Self::Gradient, argmin::core::Error> {
        let mut trainee = self.trainee.borrow_mut();
        trainee.set_weights(weights)?;
        let mut gradient = trainee.log_likelihood_gradient();
        for (g, w) in gradient.iter_mut().zip(weights) {
            *g = -*g + self.l2_penalty * w;
        }
        Ok(gradient)
    }
}
