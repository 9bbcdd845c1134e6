use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Patient-side fact supplied by the metadata source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RiskFactorValue {
    Flag(bool),
    Number(f64),
}

impl From<bool> for RiskFactorValue {
    fn from(v: bool) -> Self {
        RiskFactorValue::Flag(v)
    }
}

impl From<f64> for RiskFactorValue {
    fn from(v: f64) -> Self {
        RiskFactorValue::Number(v)
    }
}

impl From<u32> for RiskFactorValue {
    fn from(v: u32) -> Self {
        RiskFactorValue::Number(f64::from(v))
    }
}

/// Named risk factors for one case.
pub type RiskFactors = BTreeMap<String, RiskFactorValue>;

/// When a bonus rule applies to its factor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "threshold", rename_all = "snake_case")]
pub enum BonusCondition {
    /// `true` flag, or a non-zero number.
    IsSet,
    /// Numeric factor `>= threshold`.
    AtLeast(f64),
    /// Numeric factor `> threshold`.
    Above(f64),
}

impl BonusCondition {
    pub fn matches(&self, value: &RiskFactorValue) -> bool {
        match (self, value) {
            (BonusCondition::IsSet, RiskFactorValue::Flag(b)) => *b,
            (BonusCondition::IsSet, RiskFactorValue::Number(n)) => n.is_finite() && *n != 0.0,
            (BonusCondition::AtLeast(t), RiskFactorValue::Number(n)) => n.is_finite() && *n >= *t,
            (BonusCondition::Above(t), RiskFactorValue::Number(n)) => n.is_finite() && *n > *t,
            (_, RiskFactorValue::Flag(_)) => false,
        }
    }
}

/// One fixed additive bonus keyed by a named risk factor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BonusRule {
    pub name: String,
    pub factor: String,
    pub condition: BonusCondition,
    pub bonus: f64,
}

impl BonusRule {
    pub fn new(name: impl Into<String>, factor: impl Into<String>, condition: BonusCondition, bonus: f64) -> Self {
        Self {
            name: name.into(),
            factor: factor.into(),
            condition,
            bonus,
        }
    }

    /// Bonus when a boolean factor is set.
    pub fn flag(factor: impl Into<String>, bonus: f64) -> Self {
        let factor = factor.into();
        Self::new(factor.clone(), factor, BonusCondition::IsSet, bonus)
    }

    pub fn applies(&self, factors: &RiskFactors) -> bool {
        factors
            .get(&self.factor)
            .map(|v| self.condition.matches(v))
            .unwrap_or(false)
    }
}

/// Clinical adjustments and the ceiling on their sum.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClinicalBonusPolicy {
    #[serde(default)]
    pub rules: Vec<BonusRule>,
    pub ceiling: f64,
}

impl Default for ClinicalBonusPolicy {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            ceiling: 0.10,
        }
    }
}

/// What the bonus policy did for one case.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BonusOutcome {
    /// Names of the rules that applied, in declaration order.
    pub fired: Vec<String>,
    /// Sum before the ceiling.
    pub uncapped: f64,
    /// Sum after the ceiling; the amount added to the raw score.
    pub applied: f64,
}

impl BonusOutcome {
    pub fn capped(&self) -> bool {
        self.applied < self.uncapped
    }
}

impl ClinicalBonusPolicy {
    pub fn new(ceiling: f64) -> Self {
        Self {
            rules: Vec::new(),
            ceiling,
        }
    }

    pub fn with_rule(mut self, rule: BonusRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.ceiling.is_finite() || !(0.0..=1.0).contains(&self.ceiling) {
            return Err(ConfigError::InvalidBonusCeiling(self.ceiling));
        }
        for rule in &self.rules {
            if !rule.bonus.is_finite() || rule.bonus < 0.0 {
                return Err(ConfigError::InvalidBonus {
                    rule: rule.name.clone(),
                    bonus: rule.bonus,
                });
            }
        }
        Ok(())
    }

    pub fn evaluate(&self, factors: &RiskFactors) -> BonusOutcome {
        let mut out = BonusOutcome::default();
        for rule in &self.rules {
            if rule.applies(factors) {
                out.fired.push(rule.name.clone());
                out.uncapped += rule.bonus;
            }
        }
        out.applied = out.uncapped.min(self.ceiling);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ClinicalBonusPolicy {
        ClinicalBonusPolicy::new(0.08)
            .with_rule(BonusRule::new("age_over_65", "age", BonusCondition::Above(65.0), 0.05))
            .with_rule(BonusRule::flag("family_history", 0.05))
            .with_rule(BonusRule::flag("smoker", 0.03))
    }

    fn factors(pairs: &[(&str, RiskFactorValue)]) -> RiskFactors {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn no_factors_no_bonus() {
        let out = policy().evaluate(&RiskFactors::new());
        assert!(out.fired.is_empty());
        assert_eq!(out.applied, 0.0);
    }

    #[test]
    fn sum_is_capped() {
        let f = factors(&[
            ("age", 70.0.into()),
            ("family_history", true.into()),
            ("smoker", true.into()),
        ]);
        let out = policy().evaluate(&f);
        assert_eq!(out.fired, ["age_over_65", "family_history", "smoker"]);
        assert!((out.uncapped - 0.13).abs() < 1e-12);
        assert!((out.applied - 0.08).abs() < 1e-12);
        assert!(out.capped());
    }

    #[test]
    fn thresholds_are_strict_or_inclusive_as_declared() {
        let above = BonusCondition::Above(65.0);
        let at_least = BonusCondition::AtLeast(65.0);
        assert!(!above.matches(&65.0.into()));
        assert!(at_least.matches(&65.0.into()));
        assert!(!at_least.matches(&true.into()));
        assert!(!at_least.matches(&f64::NAN.into()));
    }

    #[test]
    fn false_flag_does_not_fire() {
        let f = factors(&[("family_history", false.into())]);
        assert!(policy().evaluate(&f).fired.is_empty());
    }

    #[test]
    fn negative_bonus_rejected() {
        let p = ClinicalBonusPolicy::new(0.1).with_rule(BonusRule::flag("x", -0.01));
        assert!(matches!(p.validate(), Err(ConfigError::InvalidBonus { .. })));
        assert!(matches!(
            ClinicalBonusPolicy::new(1.5).validate(),
            Err(ConfigError::InvalidBonusCeiling(_))
        ));
    }
}
