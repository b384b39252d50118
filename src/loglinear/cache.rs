//! Memo tables owned by a [`LogLinearModel`]
//!
//! Feature values only depend on `(x, y)` and live until explicitly
//! cleared. Scores and partition functions also depend on the weights,
//! so their keys carry the weight generation they were computed under.
//!
//! [`LogLinearModel`]: super::LogLinearModel

use super::feature::MetaFeatureValue;
use rustc_hash::FxHashMap;

type PairKey = (String, String);

#[derive(Debug, Default)]
pub(crate) struct ModelCache {
    features: FxHashMap<PairKey, MetaFeatureValue>,
    scores: FxHashMap<(String, String, u64), f64>,
    log_z: FxHashMap<(String, u64), f64>,
}

impl ModelCache {
    #[cfg(test)]
    pub fn features(&self, x: &str, y: &str) -> Option<&MetaFeatureValue> {
        self.features.get(&(x.to_string(), y.to_string()))
    }

    pub fn features_or_insert_with(
        &mut self,
        x: &str,
        y: &str,
        compute: impl FnOnce() -> MetaFeatureValue,
    ) -> &MetaFeatureValue {
        self.features
            .entry((x.to_string(), y.to_string()))
            .or_insert_with(compute)
    }

    pub fn score(&self, x: &str, y: &str, generation: u64) -> Option<f64> {
        self.scores
            .get(&(x.to_string(), y.to_string(), generation))
            .copied()
    }

    pub fn insert_score(&mut self, x: &str, y: &str, generation: u64, score: f64) {
        self.scores
            .insert((x.to_string(), y.to_string(), generation), score);
    }

    pub fn log_z(&self, x: &str, generation: u64) -> Option<f64> {
        self.log_z.get(&(x.to_string(), generation)).copied()
    }

    pub fn insert_log_z(&mut self, x: &str, generation: u64, value: f64) {
        self.log_z.insert((x.to_string(), generation), value);
    }

    /// Drop weight-dependent entries computed under any other generation
    pub fn retain_generation(&mut self, generation: u64) {
        self.scores.retain(|(_, _, g), _| *g == generation);
        self.log_z.retain(|(_, g), _| *g == generation);
    }

    pub fn clear_weight_based(&mut self) {
        self.scores.clear();
        self.log_z.clear();
    }

    pub fn clear(&mut self) {
        self.clear_weight_based();
        self.features.clear();
    }

    /// Drop every entry that belongs to instance `x`
    pub fn forget(&mut self, x: &str) {
        self.features.retain(|(key, _), _| key != x);
        self.scores.retain(|(key, _, _), _| key != x);
        self.log_z.retain(|(key, _), _| key != x);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.features.len() + self.scores.len() + self.log_z.len()
    }
}
