use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Feature value reported alongside a score. Opaque to the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Text(String),
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        FeatureValue::Number(v)
    }
}

impl From<&str> for FeatureValue {
    fn from(v: &str) -> Self {
        FeatureValue::Text(v.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(v: String) -> Self {
        FeatureValue::Text(v)
    }
}

/// One analyzer's output for one run.
///
/// A failed analyzer still produces a record: `failed = true` plus a reason.
/// Its `score`/`confidence` are ignored by the aggregator, which substitutes
/// the configured failure defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerResult {
    pub analyzer_name: String,
    pub score: f64,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub features: BTreeMap<String, FeatureValue>,
    #[serde(default)]
    pub failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl AnalyzerResult {
    pub fn new(analyzer_name: impl Into<String>, score: f64, confidence: f64) -> Self {
        AnalyzerResult {
            analyzer_name: analyzer_name.into(),
            score,
            confidence,
            features: BTreeMap::new(),
            failed: false,
            failure_reason: None,
        }
    }

    /// Record for an analyzer that could not produce a measurement.
    pub fn failed(analyzer_name: impl Into<String>, reason: impl Into<String>) -> Self {
        AnalyzerResult {
            analyzer_name: analyzer_name.into(),
            score: 0.0,
            confidence: 0.0,
            features: BTreeMap::new(),
            failed: true,
            failure_reason: Some(reason.into()),
        }
    }

    pub fn with_feature(mut self, key: impl Into<String>, value: impl Into<FeatureValue>) -> Self {
        self.features.insert(key.into(), value.into());
        self
    }
}
