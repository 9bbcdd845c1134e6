//! Analyzer adapter layer: the seam between feature extraction and the core.
//!
//! The supervisor does not know how a score is produced. Products implement
//! `Analyzer` for their feature extractors; this module only normalizes what
//! they return into `patho_engine_core::AnalyzerResult`.
//! - No IO
//! - No async
//! - No domain vocabulary

use std::collections::BTreeMap;
use std::sync::Arc;

use patho_engine_core::{AnalyzerResult, FeatureValue, RiskFactorValue, RiskFactors};

/// One case handed to every analyzer of a domain.
#[derive(Clone, Debug)]
pub struct CaseInput {
    pub case_id: String,
    /// Encoded image bytes. Never decoded here.
    pub image: Arc<[u8]>,
    /// Patient risk factors consumed by the clinical bonus rules.
    pub metadata: RiskFactors,
}

impl CaseInput {
    pub fn new(case_id: impl Into<String>, image: impl Into<Arc<[u8]>>) -> Self {
        Self {
            case_id: case_id.into(),
            image: image.into(),
            metadata: RiskFactors::new(),
        }
    }

    pub fn with_factor(mut self, key: impl Into<String>, value: impl Into<RiskFactorValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A successful analyzer measurement, possibly unnormalized.
#[derive(Clone, Debug, PartialEq)]
pub struct Measurement {
    pub score: f64,
    pub confidence: f64,
    pub features: BTreeMap<String, FeatureValue>,
}

impl Measurement {
    pub fn new(score: f64, confidence: f64) -> Self {
        Self {
            score,
            confidence,
            features: BTreeMap::new(),
        }
    }

    pub fn with_feature(mut self, key: impl Into<String>, value: impl Into<FeatureValue>) -> Self {
        self.features.insert(key.into(), value.into());
        self
    }
}

/// Expected, recoverable analyzer failure (e.g. too few nuclei to measure).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalyzerFailure {
    pub reason: String,
}

impl AnalyzerFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

pub type AnalyzerOutcome = Result<Measurement, AnalyzerFailure>;

/// Trait: score one case.
///
/// Implementations must be independent of each other; the supervisor runs
/// them concurrently and in no particular order.
pub trait Analyzer: Send + Sync {
    /// Must match a descriptor name in the domain's registry.
    fn name(&self) -> &str;

    fn analyze(&self, input: &CaseInput) -> AnalyzerOutcome;
}

/// Convert an outcome into the record the aggregator expects.
///
/// Finite values are clamped into [0,1]; a non-finite score or confidence
/// turns the measurement into a failure so it is disclosed, not averaged.
pub fn into_result(name: &str, outcome: AnalyzerOutcome) -> AnalyzerResult {
    match outcome {
        Ok(m) => {
            if !m.score.is_finite() || !m.confidence.is_finite() {
                return AnalyzerResult::failed(name, "analyzer produced a non-finite measurement");
            }
            let mut r = AnalyzerResult::new(name, m.score.clamp(0.0, 1.0), m.confidence.clamp(0.0, 1.0));
            r.features = m.features;
            r
        }
        Err(f) => AnalyzerResult::failed(name, f.reason),
    }
}

/// Analyzer returning the same outcome for every case. Useful as a fixture
/// and as a stand-in while a real extractor is being built.
#[derive(Clone, Debug)]
pub struct FixedAnalyzer {
    name: String,
    outcome: AnalyzerOutcome,
}

impl FixedAnalyzer {
    pub fn new(name: impl Into<String>, score: f64, confidence: f64) -> Self {
        Self {
            name: name.into(),
            outcome: Ok(Measurement::new(score, confidence)),
        }
    }

    pub fn failing(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome: Err(AnalyzerFailure::new(reason)),
        }
    }
}

impl Analyzer for FixedAnalyzer {
    fn name(&self) -> &str {
        &self.name
    }

    fn analyze(&self, _input: &CaseInput) -> AnalyzerOutcome {
        self.outcome.clone()
    }
}

/// Analyzer backed by a closure.
pub struct FnAnalyzer<F> {
    name: String,
    f: F,
}

impl<F> FnAnalyzer<F>
where
    F: Fn(&CaseInput) -> AnalyzerOutcome + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

impl<F> Analyzer for FnAnalyzer<F>
where
    F: Fn(&CaseInput) -> AnalyzerOutcome + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn analyze(&self, input: &CaseInput) -> AnalyzerOutcome {
        (self.f)(input)
    }
}
