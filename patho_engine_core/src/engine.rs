use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::aggregate::{CompositeScore, FailurePolicy, ScoreAggregator};
use crate::bonus::{ClinicalBonusPolicy, RiskFactors};
use crate::classify::{ThresholdBand, ThresholdClassifier};
use crate::error::{ClassifyError, ConfigError, EngineError};
use crate::recommend::{AxisLabels, Recommendation, RecommendationEngine, RecommendationRule};
use crate::registry::{AnalyzerCategory, AnalyzerRegistry, RegistryConfig};
use crate::result::AnalyzerResult;

/// Which number an axis classifies.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "from", rename_all = "snake_case")]
pub enum ScoreSource {
    /// Composite value, clinical bonus included.
    #[default]
    Composite,
    /// Weighted analyzer sum before the clinical bonus.
    Raw,
    Category { category: AnalyzerCategory },
    Analyzer { analyzer: String },
}

impl ScoreSource {
    fn read(&self, composite: &CompositeScore) -> f64 {
        match self {
            ScoreSource::Composite => composite.value,
            ScoreSource::Raw => composite.raw_score,
            ScoreSource::Category { category } => composite.category_score(*category).unwrap_or(f64::NAN),
            ScoreSource::Analyzer { analyzer } => composite
                .contribution(analyzer)
                .map(|c| c.effective_score)
                .unwrap_or(f64::NAN),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxisConfig {
    pub name: String,
    #[serde(default)]
    pub source: ScoreSource,
    pub bands: Vec<ThresholdBand>,
}

impl AxisConfig {
    pub fn new(name: impl Into<String>, bands: Vec<ThresholdBand>) -> Self {
        Self {
            name: name.into(),
            source: ScoreSource::Composite,
            bands,
        }
    }

    pub fn from_source(mut self, source: ScoreSource) -> Self {
        self.source = source;
        self
    }
}

/// Complete configuration of one domain's engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    pub registry: RegistryConfig,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    #[serde(default)]
    pub clinical_bonus: ClinicalBonusPolicy,
    pub axes: Vec<AxisConfig>,
    #[serde(default)]
    pub rules: Vec<RecommendationRule>,
}

impl EngineConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(s).map_err(|e| ConfigError::Malformed(e.to_string()))
    }
}

/// One classification axis bound to its score source.
#[derive(Clone, Debug)]
pub struct Axis {
    source: ScoreSource,
    classifier: ThresholdClassifier,
}

impl Axis {
    pub fn name(&self) -> &str {
        self.classifier.name()
    }

    pub fn source(&self) -> &ScoreSource {
        &self.source
    }

    pub fn classifier(&self) -> &ThresholdClassifier {
        &self.classifier
    }
}

/// Structured output of one run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub composite: CompositeScore,
    pub labels: AxisLabels,
    pub recommendation: Recommendation,
}

/// Validated aggregator, axes and rule table for one domain.
///
/// Immutable once built; `evaluate` is a pure function of its inputs.
#[derive(Clone, Debug)]
pub struct DiagnosticEngine {
    aggregator: ScoreAggregator,
    axes: Vec<Axis>,
    recommendations: RecommendationEngine,
}

impl DiagnosticEngine {
    pub fn from_config(cfg: EngineConfig) -> Result<Self, ConfigError> {
        let registry = AnalyzerRegistry::from_config(&cfg.registry)?;
        let aggregator = ScoreAggregator::new(registry, cfg.failure_policy, cfg.clinical_bonus)?;

        let mut names = HashSet::new();
        let mut axes = Vec::with_capacity(cfg.axes.len());
        for axis in cfg.axes {
            if !names.insert(axis.name.clone()) {
                return Err(ConfigError::DuplicateAxis(axis.name));
            }
            match &axis.source {
                ScoreSource::Analyzer { analyzer } if !aggregator.registry().contains(analyzer) => {
                    return Err(ConfigError::UnknownAxisSource {
                        axis: axis.name,
                        analyzer: analyzer.clone(),
                    });
                }
                ScoreSource::Category { category } if aggregator.registry().shares().share(*category) <= 0.0 => {
                    return Err(ConfigError::EmptyAxisCategory {
                        axis: axis.name,
                        category: *category,
                    });
                }
                _ => {}
            }
            let classifier = ThresholdClassifier::new(axis.name, axis.bands)?;
            axes.push(Axis {
                source: axis.source,
                classifier,
            });
        }

        for rule in &cfg.rules {
            let mut referenced = Vec::new();
            rule.condition.referenced_axes(&mut referenced);
            if let Some(axis) = referenced.into_iter().find(|a| !names.contains(*a)) {
                return Err(ConfigError::UnknownRuleAxis {
                    rule: rule.name.clone(),
                    axis: axis.to_string(),
                });
            }
        }

        tracing::debug!(
            analyzers = aggregator.registry().len(),
            axes = axes.len(),
            rules = cfg.rules.len(),
            "diagnostic engine configured"
        );

        Ok(Self {
            aggregator,
            axes,
            recommendations: RecommendationEngine::new(cfg.rules),
        })
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Self::from_config(EngineConfig::from_json_str(s)?)
    }

    pub fn registry(&self) -> &AnalyzerRegistry {
        self.aggregator.registry()
    }

    pub fn aggregator(&self) -> &ScoreAggregator {
        &self.aggregator
    }

    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    pub fn recommendations(&self) -> &RecommendationEngine {
        &self.recommendations
    }

    /// Label every axis from an already computed composite.
    pub fn classify(&self, composite: &CompositeScore) -> Result<AxisLabels, ClassifyError> {
        let mut labels = AxisLabels::new();
        for axis in &self.axes {
            let label = axis.classifier.classify(axis.source.read(composite))?;
            labels.insert(axis.name().to_string(), label.to_string());
        }
        Ok(labels)
    }

    /// Aggregate, classify every axis, then apply the rule table.
    pub fn evaluate(
        &self,
        results: &[AnalyzerResult],
        risk_factors: &RiskFactors,
    ) -> Result<Evaluation, EngineError> {
        let composite = self.aggregator.aggregate(results, risk_factors)?;
        let labels = self.classify(&composite)?;
        let recommendation = self.recommendations.recommend(&labels);

        tracing::debug!(
            value = composite.value,
            degraded = composite.degraded,
            priority = ?recommendation.priority,
            "evaluation complete"
        );

        Ok(Evaluation {
            composite,
            labels,
            recommendation,
        })
    }
}
