use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::bonus::{BonusOutcome, ClinicalBonusPolicy, RiskFactors};
use crate::error::{AggregationError, ConfigError};
use crate::registry::{AnalyzerCategory, AnalyzerRegistry};
use crate::result::AnalyzerResult;

/// Values substituted for an analyzer that reported `failed = true`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FailurePolicy {
    pub default_score: f64,
    pub default_confidence: f64,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            default_score: 0.2,
            default_confidence: 0.1,
        }
    }
}

impl FailurePolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("default_score", self.default_score),
            ("default_confidence", self.default_confidence),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidFailureDefault { field, value });
            }
        }
        Ok(())
    }
}

/// How one analyzer fed into the composite.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub analyzer: String,
    pub category: AnalyzerCategory,
    pub weight: f64,
    /// Score actually used: the reported one, clamped, or the failure default.
    pub effective_score: f64,
    pub effective_confidence: f64,
    pub weighted_score: f64,
    pub failed: bool,
}

/// Aggregate of one run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompositeScore {
    /// `min(raw_score + clinical_bonus_applied, 1.0)`.
    pub value: f64,
    /// Weighted sum of analyzer scores before the clinical bonus.
    pub raw_score: f64,
    pub confidence: f64,
    pub clinical_bonus_applied: f64,
    pub bonus: BonusOutcome,
    /// At least one analyzer failed and was replaced by the failure defaults.
    pub degraded: bool,
    /// Weighted mean score inside each category with a non-zero share.
    pub category_scores: BTreeMap<AnalyzerCategory, f64>,
    /// Results in registry order.
    pub per_analyzer: Vec<AnalyzerResult>,
    pub trace: Vec<Contribution>,
}

impl CompositeScore {
    pub fn failed_analyzers(&self) -> impl Iterator<Item = &AnalyzerResult> {
        self.per_analyzer.iter().filter(|r| r.failed)
    }

    pub fn contribution(&self, analyzer: &str) -> Option<&Contribution> {
        self.trace.iter().find(|c| c.analyzer == analyzer)
    }

    pub fn category_score(&self, category: AnalyzerCategory) -> Option<f64> {
        self.category_scores.get(&category).copied()
    }
}

fn clamp_unit(analyzer: &str, field: &'static str, v: f64) -> Result<f64, AggregationError> {
    if v.is_nan() {
        return Err(AggregationError::NonNumericValue {
            analyzer: analyzer.to_string(),
            field,
        });
    }
    let c = v.clamp(0.0, 1.0);
    if c != v {
        tracing::warn!(analyzer, field, value = v, "analyzer value outside [0,1], clamped");
    }
    Ok(c)
}

/// Combines analyzer results into a `CompositeScore` using registry weights.
#[derive(Clone, Debug)]
pub struct ScoreAggregator {
    registry: AnalyzerRegistry,
    failure: FailurePolicy,
    bonus: ClinicalBonusPolicy,
}

impl ScoreAggregator {
    pub fn new(
        registry: AnalyzerRegistry,
        failure: FailurePolicy,
        bonus: ClinicalBonusPolicy,
    ) -> Result<Self, ConfigError> {
        registry.validate()?;
        failure.validate()?;
        bonus.validate()?;
        Ok(Self {
            registry,
            failure,
            bonus,
        })
    }

    pub fn registry(&self) -> &AnalyzerRegistry {
        &self.registry
    }

    pub fn failure_policy(&self) -> &FailurePolicy {
        &self.failure
    }

    pub fn bonus_policy(&self) -> &ClinicalBonusPolicy {
        &self.bonus
    }

    /// Match every result to exactly one descriptor and combine.
    ///
    /// Results may arrive in any order.
    pub fn aggregate(
        &self,
        results: &[AnalyzerResult],
        risk_factors: &RiskFactors,
    ) -> Result<CompositeScore, AggregationError> {
        let mut slots: Vec<Option<&AnalyzerResult>> = vec![None; self.registry.len()];
        for r in results {
            let idx = self
                .registry
                .position(&r.analyzer_name)
                .ok_or_else(|| AggregationError::UnknownAnalyzer(r.analyzer_name.clone()))?;
            if slots[idx].replace(r).is_some() {
                return Err(AggregationError::DuplicateResult(r.analyzer_name.clone()));
            }
        }

        let missing: Vec<String> = self
            .registry
            .descriptors()
            .iter()
            .zip(&slots)
            .filter(|(_, slot)| slot.is_none())
            .map(|(d, _)| d.name.clone())
            .collect();
        if !missing.is_empty() {
            return Err(AggregationError::MissingResults(missing));
        }

        let mut trace = Vec::with_capacity(slots.len());
        let mut per_analyzer = Vec::with_capacity(slots.len());
        let mut raw = 0.0_f64;
        let mut confidence = 0.0_f64;
        let mut healthy_weight = 0.0_f64;
        let mut healthy_confidence = 0.0_f64;
        let mut by_category: BTreeMap<AnalyzerCategory, f64> = BTreeMap::new();
        let mut degraded = false;

        for (d, slot) in self.registry.descriptors().iter().zip(slots) {
            let Some(r) = slot else { continue };

            let (score, conf) = if r.failed {
                degraded = true;
                tracing::warn!(
                    analyzer = %d.name,
                    reason = r.failure_reason.as_deref().unwrap_or("unspecified"),
                    "analyzer failed, using failure defaults"
                );
                (self.failure.default_score, self.failure.default_confidence)
            } else {
                let conf = clamp_unit(&d.name, "confidence", r.confidence)?;
                healthy_weight += d.weight;
                healthy_confidence += d.weight * conf;
                (clamp_unit(&d.name, "score", r.score)?, conf)
            };

            let weighted = d.weight * score;
            raw += weighted;
            confidence += d.weight * conf;
            *by_category.entry(d.category).or_insert(0.0) += weighted;

            trace.push(Contribution {
                analyzer: d.name.clone(),
                category: d.category,
                weight: d.weight,
                effective_score: score,
                effective_confidence: conf,
                weighted_score: weighted,
                failed: r.failed,
            });
            per_analyzer.push(r.clone());
        }

        let shares = self.registry.shares();
        let category_scores = by_category
            .into_iter()
            .filter(|(c, _)| shares.share(*c) > 0.0)
            .map(|(c, sum)| (c, (sum / shares.share(c)).clamp(0.0, 1.0)))
            .collect();

        // a failure never lifts confidence above what the healthy analyzers report
        if degraded && healthy_weight > 0.0 {
            confidence = confidence.min(healthy_confidence / healthy_weight);
        }

        let raw = raw.clamp(0.0, 1.0);
        let bonus = self.bonus.evaluate(risk_factors);
        let value = (raw + bonus.applied).min(1.0).max(0.0);

        tracing::debug!(
            raw,
            bonus = bonus.applied,
            value,
            confidence,
            degraded,
            "composite score computed"
        );

        Ok(CompositeScore {
            value,
            raw_score: raw,
            confidence: confidence.clamp(0.0, 1.0),
            clinical_bonus_applied: bonus.applied,
            bonus,
            degraded,
            category_scores,
            per_analyzer,
            trace,
        })
    }
}
