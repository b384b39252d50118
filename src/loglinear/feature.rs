//! Features and feature vectors
//!
//! A [`Feature`] turns an `(x, y)` pair into a [`FeatureValue`]: a number
//! plus, optionally, a human-readable reason and the files it blames. A
//! [`MetaFeature`] is an ordered list of features; its output order is
//! fixed at construction and is the order weights are consumed in.

use serde::{Deserialize, Serialize};

/// Stable identity used to key memo tables
pub trait Keyed {
    fn key(&self) -> &str;
}

/// The independent variable `x` of a log-linear model.
///
/// An instance knows its own label universe `Y(x)`: every `y` the
/// partition function sums over.
pub trait Instance: Keyed {
    type Label: Keyed;

    fn labels(&self) -> &[Self::Label];

    /// Position of the label with `key` in [`Instance::labels`]
    fn label_index(&self, key: &str) -> Option<usize> {
        self.labels().iter().position(|y| y.key() == key)
    }
}

/// A file blamed by a feature, with the reasons for blaming it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    pub name: String,
    #[serde(default)]
    pub blame_url: Option<String>,
    #[serde(default)]
    pub reasons: Vec<String>,
}

/// A weighted justification for a suspect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reason {
    /// Feature that produced the reason
    pub feature: String,
    /// Weighted (log-domain) contribution of the feature
    pub score: f64,
    pub message: String,
}

/// Output of a single feature for one `(x, y)`
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureValue {
    pub name: String,
    pub value: f64,
    pub reason: Option<String>,
    pub changed_files: Option<Vec<ChangedFile>>,
}

impl FeatureValue {
    pub fn new(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            value,
            reason: None,
            changed_files: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_changed_files(mut self, changed_files: Vec<ChangedFile>) -> Self {
        self.changed_files = Some(changed_files);
        self
    }
}

/// A named, pure function from `(x, y)` to a [`FeatureValue`]
pub trait Feature: Send + Sync {
    type Input: Instance;

    fn name(&self) -> &str;

    fn evaluate(
        &self,
        x: &Self::Input,
        y: &<Self::Input as Instance>::Label,
    ) -> FeatureValue;
}

/// Ordered feature values for one `(x, y)`
#[derive(Debug, Clone, PartialEq)]
pub struct MetaFeatureValue {
    values: Vec<FeatureValue>,
}

impl MetaFeatureValue {
    pub fn new(values: Vec<FeatureValue>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[FeatureValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The numeric feature vector
    pub fn vector(&self) -> Vec<f64> {
        self.values.iter().map(|v| v.value).collect()
    }

    /// Every non-empty reason, in feature order
    pub fn reasons(&self) -> Vec<(&str, &str)> {
        self.values
            .iter()
            .filter_map(|v| v.reason.as_deref().map(|r| (v.name.as_str(), r)))
            .filter(|(_, r)| !r.is_empty())
            .collect()
    }

    /// Every file attribution, in feature order
    pub fn changed_files(&self) -> Vec<&ChangedFile> {
        self.values
            .iter()
            .flat_map(|v| v.changed_files.iter().flatten())
            .collect()
    }
}

/// An ordered collection of features evaluated together
#[derive(Debug, Clone)]
pub struct MetaFeature<F> {
    features: Vec<F>,
}

impl<F: Feature> MetaFeature<F> {
    pub fn new(features: Vec<F>) -> Self {
        Self { features }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn features(&self) -> &[F] {
        &self.features
    }

    /// Feature names, in vector order
    pub fn names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.name().to_string()).collect()
    }

    pub fn evaluate(
        &self,
        x: &F::Input,
        y: &<F::Input as Instance>::Label,
    ) -> MetaFeatureValue {
        MetaFeatureValue::new(self.features.iter().map(|f| f.evaluate(x, y)).collect())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! A toy instance/feature pair shared by the model and trainer tests.

    use super::*;

    #[derive(Debug, Clone)]
    pub struct Toy {
        pub key: String,
        pub labels: Vec<ToyLabel>,
    }

    #[derive(Debug, Clone)]
    pub struct ToyLabel {
        pub key: String,
        pub values: Vec<f64>,
    }

    impl Keyed for Toy {
        fn key(&self) -> &str {
            &self.key
        }
    }

    impl Keyed for ToyLabel {
        fn key(&self) -> &str {
            &self.key
        }
    }

    impl Instance for Toy {
        type Label = ToyLabel;

        fn labels(&self) -> &[ToyLabel] {
            &self.labels
        }
    }

    /// Reads column `index` of the label's value vector
    #[derive(Debug, Clone)]
    pub struct Column {
        pub name: String,
        pub index: usize,
    }

    impl Feature for Column {
        type Input = Toy;

        fn name(&self) -> &str {
            &self.name
        }

        fn evaluate(&self, _x: &Toy, y: &ToyLabel) -> FeatureValue {
            FeatureValue::new(&self.name, y.values[self.index])
                .with_reason(format!("{} is {}", self.name, y.values[self.index]))
        }
    }

    pub fn toy(key: &str, rows: &[(&str, &[f64])]) -> Toy {
        Toy {
            key: key.to_string(),
            labels: rows
                .iter()
                .map(|(k, values)| ToyLabel {
                    key: k.to_string(),
                    values: values.to_vec(),
                })
                .collect(),
        }
    }

    pub fn columns(names: &[&str]) -> MetaFeature<Column> {
        MetaFeature::new(
            names
                .iter()
                .enumerate()
                .map(|(index, name)| Column {
                    name: name.to_string(),
                    index,
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_meta_feature_preserves_order() {
        let meta = columns(&["b", "a"]);
        let x = toy("x", &[("y", &[2.0, 3.0])]);

        let value = meta.evaluate(&x, &x.labels()[0]);
        assert_eq!(meta.names(), vec!["b", "a"]);
        assert_eq!(value.vector(), vec![2.0, 3.0]);
        assert_eq!(value.reasons(), vec![("b", "b is 2"), ("a", "a is 3")]);
    }

    #[test]
    fn test_label_index() {
        let x = toy("x", &[("y0", &[0.0]), ("y1", &[1.0])]);
        assert_eq!(x.label_index("y1"), Some(1));
        assert_eq!(x.label_index("nope"), None);
    }

    #[test]
    fn test_changed_files_are_collected() {
        let file = ChangedFile {
            name: "a.cc".into(),
            blame_url: None,
            reasons: vec!["frame #0".into()],
        };
        let value = MetaFeatureValue::new(vec![
            FeatureValue::new("f", 1.0).with_changed_files(vec![file.clone()]),
            FeatureValue::new("g", 0.0).with_reason(""),
        ]);

        assert_eq!(value.changed_files(), vec![&file]);
        assert!(value.reasons().is_empty());
    }
}
