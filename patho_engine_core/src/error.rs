use thiserror::Error;

use crate::registry::AnalyzerCategory;

/// Malformed registry, bonus policy, band table or rule table.
///
/// Always raised while building an engine; an engine is never constructed
/// from a configuration that produced one of these.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("analyzer name must not be empty")]
    EmptyAnalyzerName,

    #[error("analyzer `{0}` is registered more than once")]
    DuplicateAnalyzer(String),

    #[error("analyzer `{name}` has weight {weight}, expected a value in (0, 1]")]
    InvalidWeight { name: String, weight: f64 },

    #[error("share for {category} category is {share}, expected a value in [0, 1]")]
    InvalidShare { category: AnalyzerCategory, share: f64 },

    #[error("{category} weights sum to {total}, exceeding the declared share {share}")]
    CategoryShareExceeded {
        category: AnalyzerCategory,
        total: f64,
        share: f64,
    },

    #[error("{category} weights sum to {total}, expected the declared share {share}")]
    CategoryWeightMismatch {
        category: AnalyzerCategory,
        total: f64,
        share: f64,
    },

    #[error("category shares sum to {0}, expected 1.0")]
    SharesNotNormalized(f64),

    #[error("registry has no analyzers")]
    EmptyRegistry,

    #[error("failure default `{field}` is {value}, expected a value in [0, 1]")]
    InvalidFailureDefault { field: &'static str, value: f64 },

    #[error("bonus rule `{rule}` has bonus {bonus}, expected a finite non-negative value")]
    InvalidBonus { rule: String, bonus: f64 },

    #[error("bonus ceiling is {0}, expected a value in [0, 1]")]
    InvalidBonusCeiling(f64),

    #[error("band table `{0}` has no bands")]
    EmptyBandTable(String),

    #[error("band table `{table}`: first band starts at {lower}, expected 0")]
    FirstBandNotAtZero { table: String, lower: f64 },

    #[error("band table `{table}`: band `{label}` is empty or inverted ({lower}..{upper})")]
    InvertedBand {
        table: String,
        label: String,
        lower: f64,
        upper: f64,
    },

    #[error("band table `{table}`: gap or overlap between `{left}` (ends {left_upper}) and `{right}` (starts {right_lower})")]
    BandDiscontinuity {
        table: String,
        left: String,
        left_upper: f64,
        right: String,
        right_lower: f64,
    },

    #[error("band table `{table}`: only the last band may be open-ended, `{label}` is not last")]
    OpenBandNotLast { table: String, label: String },

    #[error("band table `{table}`: last band ends at {upper}, expected 1.0 or unbounded")]
    LastBandNotAtOne { table: String, upper: f64 },

    #[error("band table `{table}`: band label must not be empty")]
    EmptyBandLabel { table: String },

    #[error("band table `{table}`: label `{label}` appears more than once")]
    DuplicateBandLabel { table: String, label: String },

    #[error("axis `{0}` is configured more than once")]
    DuplicateAxis(String),

    #[error("axis `{axis}` reads from unknown analyzer `{analyzer}`")]
    UnknownAxisSource { axis: String, analyzer: String },

    #[error("axis `{axis}` reads the {category} sub-score, but that category has no share")]
    EmptyAxisCategory {
        axis: String,
        category: AnalyzerCategory,
    },

    #[error("recommendation rule `{rule}` refers to unknown axis `{axis}`")]
    UnknownRuleAxis { rule: String, axis: String },

    #[error("invalid engine configuration document: {0}")]
    Malformed(String),
}

/// Mismatch between the configured analyzers and the results of one run.
///
/// Aborts that run only; no partial composite is produced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AggregationError {
    #[error("result for unknown analyzer `{0}`")]
    UnknownAnalyzer(String),

    #[error("analyzer `{0}` reported more than once")]
    DuplicateResult(String),

    #[error("no result for configured analyzer(s): {}", .0.join(", "))]
    MissingResults(Vec<String>),

    #[error("analyzer `{analyzer}` reported a non-numeric {field}")]
    NonNumericValue {
        analyzer: String,
        field: &'static str,
    },
}

/// Value handed to a classifier that cannot be interpreted as a number.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClassifyError {
    #[error("cannot classify non-numeric value on `{0}`")]
    NotANumber(String),
}

/// Any failure of the single `evaluate` entry point.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error(transparent)]
    Value(#[from] ClassifyError),
}
