//! Classifier configuration
//!
//! Loaded from TOML. Every section is optional:
//!
//! ```toml
//! top_n_suspects = 7
//!
//! [model]
//! epsilon = 0.00001
//! max_frame_index = 7
//! weights = { TouchCrashedFile = 1.0, TopFrameIndex = 1.0, TouchCrashedDirectory = 0.5, NumberOfTouchedFiles = 0.5 }
//!
//! [filters]
//! robot_authors = ["-autoroll@", "-roller@"]
//! probability_ratio = 0.5
//!
//! [filters.ignore_revisions]
//! "https://chromium.googlesource.com/chromium/src.git" = ["abc123"]
//! ```

use crate::classifier::{default_weights, DEFAULT_MAX_FRAME_INDEX};
use crate::loglinear::{WeightMap, EPSILON};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

fn default_top_n() -> usize {
    7
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ClassifierConfig {
    /// Longest suspect list a classification returns
    #[serde(default = "default_top_n")]
    pub top_n_suspects: usize,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub filters: FilterConfig,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            top_n_suspects: default_top_n(),
            model: ModelConfig::default(),
            filters: FilterConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Feature name -> weight; must name every feature
    pub weights: WeightMap,
    /// Weights with a smaller magnitude count as zero
    pub epsilon: f64,
    pub max_frame_index: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            weights: default_weights(),
            epsilon: EPSILON,
            max_frame_index: DEFAULT_MAX_FRAME_INDEX,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Repository url -> revisions never to blame
    pub ignore_revisions: BTreeMap<String, Vec<String>>,
    /// Regexes matched against author emails
    pub robot_authors: Vec<String>,
    /// Keep suspects at least this likely relative to the best one
    pub probability_ratio: Option<f64>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            ignore_revisions: BTreeMap::new(),
            robot_authors: vec!["-autoroll@".to_string(), "-roller@".to_string()],
            probability_ratio: None,
        }
    }
}

impl ClassifierConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ClassifierConfig =
            toml::from_str(content).context("Failed to parse classifier config")?;
        if let Some(ratio) = config.filters.probability_ratio {
            anyhow::ensure!(
                ratio > 0.0 && ratio <= 1.0,
                "probability_ratio must be in (0, 1], got {}",
                ratio
            );
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config: {}", path.display()))?;
        debug!(path = %path.display(), "loaded classifier config");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ClassifierConfig::from_toml_str("").unwrap();
        assert_eq!(config, ClassifierConfig::default());
        assert_eq!(config.top_n_suspects, 7);
        assert_eq!(config.model.weights, default_weights());
    }

    #[test]
    fn test_partial_sections() {
        let config = ClassifierConfig::from_toml_str(
            r#"
            top_n_suspects = 3

            [filters]
            probability_ratio = 0.5

            [filters.ignore_revisions]
            "https://src" = ["abc"]
            "#,
        )
        .unwrap();

        assert_eq!(config.top_n_suspects, 3);
        assert_eq!(config.filters.probability_ratio, Some(0.5));
        assert_eq!(config.filters.ignore_revisions["https://src"], vec!["abc"]);
        assert_eq!(config.filters.robot_authors.len(), 2);
        assert_eq!(config.model.max_frame_index, DEFAULT_MAX_FRAME_INDEX);
    }

    #[test]
    fn test_rejects_bad_ratio() {
        let err = ClassifierConfig::from_toml_str("[filters]\nprobability_ratio = 2.0").unwrap_err();
        assert!(err.to_string().contains("probability_ratio"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[model]\nmax_frame_index = 3").unwrap();

        let config = ClassifierConfig::load(file.path()).unwrap();
        assert_eq!(config.model.max_frame_index, 3);

        let missing = ClassifierConfig::load(Path::new("/nonexistent/culprit.toml"));
        assert!(missing.is_err());
    }
}
