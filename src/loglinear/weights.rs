//! Weight covector
//!
//! Weights are supplied by name so callers needn't know the feature
//! order; they are stored densely in the order of the [`MetaFeature`].
//!
//! [`MetaFeature`]: super::feature::MetaFeature

use super::ModelError;
use std::collections::BTreeMap;

/// Feature name -> weight
pub type WeightMap = BTreeMap<String, f64>;

/// Dense weights aligned with a fixed feature order
#[derive(Debug, Clone, PartialEq)]
pub struct Weights {
    names: Vec<String>,
    values: Vec<f64>,
}

impl Weights {
    /// Place `map` into the order given by `names`.
    ///
    /// Every feature needs a weight and every weight needs a feature.
    pub fn from_map(names: &[String], map: &WeightMap) -> Result<Self, ModelError> {
        if let Some(unknown) = map.keys().find(|k| !names.contains(k)) {
            return Err(ModelError::UnknownWeight(unknown.clone()));
        }

        let values = names
            .iter()
            .map(|name| {
                map.get(name)
                    .copied()
                    .ok_or_else(|| ModelError::MissingWeight(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let weights = Self {
            names: names.to_vec(),
            values,
        };
        weights.check(&weights.values)?;
        Ok(weights)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.values[i])
    }

    pub fn to_map(&self) -> WeightMap {
        self.names
            .iter()
            .cloned()
            .zip(self.values.iter().copied())
            .collect()
    }

    /// Validate a candidate replacement vector without touching `self`
    pub fn check(&self, values: &[f64]) -> Result<(), ModelError> {
        if values.len() != self.names.len() {
            return Err(ModelError::WeightLengthMismatch {
                expected: self.names.len(),
                actual: values.len(),
            });
        }
        if let Some((index, &value)) = values.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(ModelError::NonFiniteWeight {
                feature: self.names[index].clone(),
                value,
            });
        }
        Ok(())
    }

    /// Replace the values. Returns `false` when they were already equal.
    pub fn replace(&mut self, values: &[f64]) -> Result<bool, ModelError> {
        self.check(values)?;
        if self.values.as_slice() == values {
            return Ok(false);
        }
        self.values.copy_from_slice(values);
        Ok(true)
    }
}
