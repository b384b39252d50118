//! Log-linear (maximum-entropy) model
//!
//! Scores a label `y` for an input `x` as `w · φ(x, y)`. Normalizing the
//! exponentiated scores over the instance's label universe gives
//! `Pr(y | x)`:
//!
//! ```text
//! score(x, y) = Σᵢ wᵢ φᵢ(x, y)
//! log Z(x)    = log Σ_{y ∈ Y(x)} exp(score(x, y))
//! Pr(y | x)   = exp(score(x, y) - log Z(x))
//! ```
//!
//! Feature vectors, scores and partition functions are memoized per
//! instance. The weight-dependent memos are keyed by a generation counter
//! that only moves when the weights actually change, so re-evaluating at
//! the same weights (as an optimizer does between cost and gradient
//! calls) is free.

use super::cache::ModelCache;
use super::feature::{ChangedFile, Feature, Instance, Keyed, MetaFeature, MetaFeatureValue, Reason};
use super::math::{l2_norm, logsumexp, quadrance, vsum};
use super::weights::{WeightMap, Weights};
use super::ModelError;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Default absolute threshold under which a weight counts as zero
pub const EPSILON: f64 = 0.00001;

/// Label type of a feature's input
pub type Label<F> = <<F as Feature>::Input as Instance>::Label;

/// Weighted sum of feature values, skipping zero weights.
///
/// A zero weight must contribute exactly zero even when the feature is
/// `-inf`, otherwise the product would be NaN.
fn weighted_sum(weights: &[f64], epsilon: f64, values: impl Iterator<Item = f64>) -> f64 {
    weights
        .iter()
        .zip(values)
        .filter(|(w, _)| w.abs() > epsilon)
        .map(|(w, v)| w * v)
        .sum()
}

/// A log-linear model over features `F`.
///
/// Every query mutates the memo tables, so concurrent analyses each need
/// their own model.
#[derive(Debug)]
pub struct LogLinearModel<F: Feature> {
    meta: MetaFeature<F>,
    weights: Weights,
    epsilon: f64,
    generation: u64,
    cache: ModelCache,
}

impl<F: Feature> LogLinearModel<F> {
    /// Build a model; `weights` must name exactly the features of `meta`.
    pub fn new(meta: MetaFeature<F>, weights: &WeightMap) -> Result<Self, ModelError> {
        let weights = Weights::from_map(&meta.names(), weights)?;
        Ok(Self {
            meta,
            weights,
            epsilon: EPSILON,
            generation: 0,
            cache: ModelCache::default(),
        })
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon.abs();
        self.cache.clear_weight_based();
        self
    }

    pub fn meta_feature(&self) -> &MetaFeature<F> {
        &self.meta
    }

    pub fn weights(&self) -> &Weights {
        &self.weights
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Counter bumped every time the weight values change
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Replace the weight vector.
    ///
    /// Rejects a vector of the wrong length or with non-finite entries
    /// before any memo is touched. Setting values equal to the current
    /// ones is a no-op and keeps the memos; returns whether anything
    /// changed.
    pub fn set_weights(&mut self, values: &[f64]) -> Result<bool, ModelError> {
        let changed = self.weights.replace(values)?;
        if changed {
            self.generation += 1;
            self.cache.retain_generation(self.generation);
            debug!(generation = self.generation, "weights updated");
        }
        Ok(changed)
    }

    pub fn is_nonzero_weight(&self, weight: f64) -> bool {
        weight.abs() > self.epsilon
    }

    /// Whether a log-domain value is (numerically) `log(0)`.
    ///
    /// A `-inf` score means the label has zero probability no matter what
    /// the partition function is. NaN is treated the same way so that a
    /// degenerate score can never rank.
    pub fn log_zeroish(score: f64) -> bool {
        score.is_nan() || (score < 0.0 && score.is_infinite())
    }

    /// Weighted value of the feature at `index`
    pub fn single_feature_score(&self, index: usize, value: f64) -> f64 {
        match self.weights.values().get(index) {
            Some(&w) if self.is_nonzero_weight(w) => w * value,
            _ => 0.0,
        }
    }

    /// `w · v` with the model's zero-weight convention
    pub fn weighted_sum(&self, vector: &[f64]) -> f64 {
        weighted_sum(self.weights.values(), self.epsilon, vector.iter().copied())
    }

    /// Feature vector of `y` given `x`, memoized
    pub fn features(&mut self, x: &F::Input, y: &Label<F>) -> &MetaFeatureValue {
        let meta = &self.meta;
        self.cache
            .features_or_insert_with(x.key(), y.key(), || meta.evaluate(x, y))
    }

    /// Unnormalized log-domain score of `y` given `x`, memoized
    pub fn score(&mut self, x: &F::Input, y: &Label<F>) -> f64 {
        if let Some(score) = self.cache.score(x.key(), y.key(), self.generation) {
            return score;
        }

        let meta = &self.meta;
        let values = self
            .cache
            .features_or_insert_with(x.key(), y.key(), || meta.evaluate(x, y));
        let score = weighted_sum(
            self.weights.values(),
            self.epsilon,
            values.values().iter().map(|v| v.value),
        );

        self.cache
            .insert_score(x.key(), y.key(), self.generation, score);
        score
    }

    /// Scores of every label in `Y(x)`, in label order
    pub fn scores(&mut self, x: &F::Input) -> Vec<f64> {
        x.labels().iter().map(|y| self.score(x, y)).collect()
    }

    /// Log of the partition function over `Y(x)`
    pub fn log_z(&mut self, x: &F::Input) -> f64 {
        if let Some(log_z) = self.cache.log_z(x.key(), self.generation) {
            return log_z;
        }

        let scores = self.scores(x);
        let log_z = logsumexp(&scores);
        self.cache.insert_log_z(x.key(), self.generation, log_z);
        log_z
    }

    pub fn log_probability(&mut self, x: &F::Input, y: &Label<F>) -> f64 {
        let log_z = self.log_z(x);
        self.score(x, y) - log_z
    }

    pub fn probability(&mut self, x: &F::Input, y: &Label<F>) -> f64 {
        let log_probability = self.log_probability(x, y);
        if Self::log_zeroish(log_probability) {
            0.0
        } else {
            log_probability.exp()
        }
    }

    /// `Σ_y Pr(y | x) f(y)` over `Y(x)`.
    ///
    /// Labels with zero probability are skipped, so `f` is never
    /// evaluated for them. Returns a zero vector of the model's width
    /// when every label has zero probability.
    pub fn expectation<G>(&mut self, x: &F::Input, mut f: G) -> Vec<f64>
    where
        G: FnMut(&mut Self, &Label<F>) -> Vec<f64>,
    {
        let log_z = self.log_z(x);
        let mut total: Option<Vec<f64>> = None;

        if !Self::log_zeroish(log_z) {
            for y in x.labels() {
                let score = self.score(x, y);
                if Self::log_zeroish(score) {
                    continue;
                }
                let probability = (score - log_z).exp();
                let scaled: Vec<f64> = f(self, y).iter().map(|v| probability * v).collect();
                total = Some(match total.take() {
                    Some(acc) => vsum(acc, scaled),
                    None => scaled,
                });
            }
        }

        total.unwrap_or_else(|| vec![0.0; self.weights.len()])
    }

    /// Expected feature vector under the current model
    pub fn expected_features(&mut self, x: &F::Input) -> Vec<f64> {
        self.expectation(x, |model, y| model.features(x, y).vector())
    }

    /// Reasons of the features that actually contribute to a score.
    ///
    /// Features with zero weight, without a reason, or whose weighted
    /// value is `log(0)` are left out. Sorted by feature name.
    pub fn format_reasons(&self, value: &MetaFeatureValue) -> Vec<Reason> {
        let mut reasons: Vec<Reason> = self
            .weights
            .values()
            .iter()
            .zip(value.values())
            .filter(|(&w, _)| self.is_nonzero_weight(w))
            .filter_map(|(&w, feature)| {
                let score = w * feature.value;
                if Self::log_zeroish(score) {
                    debug!(feature = %feature.name, "discarding reason with zero probability");
                    return None;
                }
                let message = feature.reason.as_deref().filter(|r| !r.is_empty())?;
                Some(Reason {
                    feature: feature.name.clone(),
                    score,
                    message: message.to_string(),
                })
            })
            .collect();

        reasons.sort_by(|a, b| a.feature.cmp(&b.feature));
        reasons
    }

    /// Merge the file attributions of every contributing feature by file
    /// name, sorted by name.
    pub fn aggregate_changed_files(&self, value: &MetaFeatureValue) -> Vec<ChangedFile> {
        let mut merged: BTreeMap<String, ChangedFile> = BTreeMap::new();

        for (index, feature) in value.values().iter().enumerate() {
            if Self::log_zeroish(self.single_feature_score(index, feature.value)) {
                debug!(feature = %feature.name, "discarding changed files with zero probability");
                continue;
            }

            for file in feature.changed_files.iter().flatten() {
                match merged.get_mut(&file.name) {
                    None => {
                        merged.insert(file.name.clone(), file.clone());
                    }
                    Some(existing) => {
                        if existing.blame_url != file.blame_url {
                            warn!(
                                file = %file.name,
                                "blame urls disagree, keeping {:?}",
                                existing.blame_url
                            );
                        }
                        existing.reasons.extend(file.reasons.iter().cloned());
                    }
                }
            }
        }

        merged.into_values().collect()
    }

    /// Squared l2 norm of the weights
    pub fn quadrance(&self) -> f64 {
        quadrance(self.weights.values())
    }

    pub fn l2(&self) -> f64 {
        l2_norm(self.weights.values())
    }

    /// Drop memos that depend on the weights
    pub fn clear_weight_memos(&mut self) {
        self.cache.clear_weight_based();
    }

    pub fn clear_all_memos(&mut self) {
        self.cache.clear();
    }

    /// Drop every memo computed for instance `x`
    pub fn forget(&mut self, x: &F::Input) {
        self.cache.forget(x.key());
    }

    #[cfg(test)]
    pub(crate) fn memo_len(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loglinear::feature::testing::*;

    fn weights(pairs: &[(&str, f64)]) -> WeightMap {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn model(w: &[(&str, f64)]) -> LogLinearModel<Column> {
        let names: Vec<&str> = w.iter().map(|(k, _)| *k).collect();
        LogLinearModel::new(columns(&names), &weights(w)).unwrap()
    }

    #[test]
    fn test_score_is_dot_product() {
        let mut m = model(&[("a", 2.0), ("b", -1.0)]);
        let x = toy("x", &[("y", &[3.0, 4.0])]);
        assert_eq!(m.score(&x, &x.labels()[0]), 2.0);
    }

    #[test]
    fn test_log_z_and_probabilities() {
        let mut m = model(&[("a", 1.0)]);
        let x = toy("x", &[("y0", &[0.0]), ("y1", &[1.0]), ("y2", &[2.0])]);

        let naive = (0f64.exp() + 1f64.exp() + 2f64.exp()).ln();
        assert!((m.log_z(&x) - naive).abs() < 1e-12);

        let total: f64 = x.labels().iter().map(|y| m.probability(&x, y)).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_weight_on_log_zero_feature() {
        let mut m = model(&[("a", 0.0), ("b", 1.0)]);
        let x = toy("x", &[("y", &[f64::NEG_INFINITY, 0.5])]);

        let score = m.score(&x, &x.labels()[0]);
        assert_eq!(score, 0.5);
        assert!(!LogLinearModel::<Column>::log_zeroish(score));
    }

    #[test]
    fn test_log_zeroish() {
        assert!(LogLinearModel::<Column>::log_zeroish(f64::NEG_INFINITY));
        assert!(LogLinearModel::<Column>::log_zeroish(f64::NAN));
        assert!(!LogLinearModel::<Column>::log_zeroish(-1e300));
        assert!(!LogLinearModel::<Column>::log_zeroish(f64::INFINITY));
    }

    #[test]
    fn test_expectation_skips_zero_probability_labels() {
        let mut m = model(&[("a", 1.0), ("b", 1.0)]);
        let x = toy(
            "x",
            &[("y0", &[0.0, 0.0]), ("y1", &[0.0, 0.0]), ("dead", &[f64::NEG_INFINITY, 5.0])],
        );

        let expected = m.expected_features(&x);
        assert_eq!(expected, vec![0.0, 0.0]);

        let mut evaluated = Vec::new();
        let counts = m.expectation(&x, |_, y| {
            evaluated.push(y.key.clone());
            vec![1.0]
        });
        assert!((counts[0] - 1.0).abs() < 1e-12);
        assert_eq!(evaluated, vec!["y0", "y1"]);
    }

    #[test]
    fn test_setting_equal_weights_keeps_memos() {
        let mut m = model(&[("a", 1.0)]);
        let x = toy("x", &[("y0", &[1.0]), ("y1", &[2.0])]);
        let before = m.score(&x, &x.labels()[1]);
        let log_z = m.log_z(&x);

        assert!(!m.set_weights(&[1.0]).unwrap());
        assert_eq!(m.generation(), 0);
        assert_eq!(m.score(&x, &x.labels()[1]), before);
        assert_eq!(m.log_z(&x), log_z);

        assert!(m.set_weights(&[2.0]).unwrap());
        assert_eq!(m.generation(), 1);
        assert_eq!(m.score(&x, &x.labels()[1]), 4.0);
    }

    #[test]
    fn test_malformed_weights_are_rejected_before_touching_memos() {
        let mut m = model(&[("a", 1.0)]);
        let x = toy("x", &[("y0", &[1.0])]);
        m.score(&x, &x.labels()[0]);
        let memos = m.memo_len();

        assert!(matches!(
            m.set_weights(&[1.0, 2.0]),
            Err(ModelError::WeightLengthMismatch { expected: 1, actual: 2 })
        ));
        assert!(m.set_weights(&[f64::INFINITY]).is_err());
        assert_eq!(m.memo_len(), memos);
        assert_eq!(m.generation(), 0);
    }

    #[test]
    fn test_format_reasons_keeps_contributing_features() {
        let m = model(&[("b", 0.5), ("a", 2.0), ("zero", 0.0)]);
        let x = toy("x", &[("y", &[1.0, 3.0, 7.0])]);
        let value = m.meta_feature().evaluate(&x, &x.labels()[0]);

        let reasons = m.format_reasons(&value);
        let names: Vec<&str> = reasons.iter().map(|r| r.feature.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(reasons[0].score, 6.0);
        assert_eq!(reasons[0].message, "a is 3");
    }

    #[test]
    fn test_forget_drops_instance_memos() {
        let mut m = model(&[("a", 1.0)]);
        let x = toy("x", &[("y0", &[1.0])]);
        m.log_z(&x);
        assert!(m.memo_len() > 0);

        m.forget(&x);
        assert_eq!(m.memo_len(), 0);
    }

    #[test]
    fn test_norms() {
        let m = model(&[("a", 3.0), ("b", 4.0)]);
        assert_eq!(m.quadrance(), 25.0);
        assert_eq!(m.l2(), 5.0);
    }
}
