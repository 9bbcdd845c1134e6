//! patho_engine_core
//!
//! Weighted multi-analyzer aggregation and threshold-cascade classification.
//!
//! Analyzer scores are combined with fixed registry weights, a capped
//! clinical bonus is added, the composite is labelled along independent
//! band tables (axes), and a rule table turns the labels into
//! recommendations. Every step is a pure function of its inputs.

pub mod error;
pub mod result;
pub mod registry;
pub mod bonus;
pub mod aggregate;
pub mod classify;
pub mod recommend;
pub mod engine;
pub mod presets;

pub use error::{AggregationError, ClassifyError, ConfigError, EngineError};
pub use result::{AnalyzerResult, FeatureValue};
pub use registry::{
    AnalyzerCategory, AnalyzerDescriptor, AnalyzerRegistry, CategoryShares, RegistryConfig,
    WEIGHT_TOLERANCE,
};
pub use bonus::{BonusCondition, BonusOutcome, BonusRule, ClinicalBonusPolicy, RiskFactorValue, RiskFactors};
pub use aggregate::{CompositeScore, Contribution, FailurePolicy, ScoreAggregator};
pub use classify::{ThresholdBand, ThresholdClassifier};
pub use recommend::{
    AxisLabels, LabelPredicate, Priority, Recommendation, RecommendationEngine, RecommendationRule,
    RuleCondition,
};
pub use engine::{Axis, AxisConfig, DiagnosticEngine, EngineConfig, Evaluation, ScoreSource};
