//! Ready-made domain profiles.
//!
//! These are plain data: the same engine runs every profile. Callers may
//! start from one of these and override weights, bands or rules.

use crate::aggregate::FailurePolicy;
use crate::bonus::{BonusCondition, BonusRule, ClinicalBonusPolicy};
use crate::classify::ThresholdBand;
use crate::engine::{AxisConfig, EngineConfig, ScoreSource};
use crate::recommend::{Priority, RecommendationRule, RuleCondition};
use crate::registry::{AnalyzerCategory, AnalyzerDescriptor, CategoryShares, RegistryConfig};

fn grade_axis() -> AxisConfig {
    AxisConfig::new(
        "grade",
        vec![
            ThresholdBand::new("G1", 0.0, 0.4),
            ThresholdBand::new("G2", 0.4, 0.7),
            ThresholdBand::new("G3", 0.7, 1.0),
        ],
    )
}

fn stage_axis() -> AxisConfig {
    AxisConfig::new(
        "stage",
        vec![
            ThresholdBand::new("I", 0.0, 0.3),
            ThresholdBand::new("II", 0.3, 0.55),
            ThresholdBand::new("III", 0.55, 0.8),
            ThresholdBand::new("IV", 0.8, 1.0),
        ],
    )
}

fn shared_rules(subtype_high: &str, subtype_followup: &str) -> Vec<RecommendationRule> {
    vec![
        RecommendationRule::new(
            "baseline",
            RuleCondition::Always,
            ["Correlate with clinical and radiological findings"],
            Priority::Low,
        ),
        RecommendationRule::new(
            "low_grade_early",
            RuleCondition::AllOf {
                conditions: vec![
                    RuleCondition::axis_is("grade", "G1"),
                    RuleCondition::axis_in("stage", ["I", "II"]),
                ],
            },
            ["Routine surveillance per guideline interval"],
            Priority::Low,
        ),
        RecommendationRule::new(
            "intermediate_grade",
            RuleCondition::axis_is("grade", "G2"),
            [
                "Multidisciplinary tumor board review",
                "Consider immunohistochemistry panel",
            ],
            Priority::Medium,
        ),
        RecommendationRule::new(
            "high_grade",
            RuleCondition::axis_is("grade", "G3"),
            [
                "Urgent oncology referral",
                "Multidisciplinary tumor board review",
            ],
            Priority::High,
        ),
        RecommendationRule::new(
            "advanced_stage",
            RuleCondition::axis_in("stage", ["III", "IV"]),
            ["Staging imaging (CT chest/abdomen/pelvis)", "Urgent oncology referral"],
            Priority::High,
        ),
        RecommendationRule::new(
            "subtype_high_risk",
            RuleCondition::axis_is("subtype_risk", "high"),
            [subtype_high, subtype_followup],
            Priority::Medium,
        ),
    ]
}

/// Lung profile: four quantitative analyzers, two learned ones split 60/40.
pub fn lung() -> EngineConfig {
    EngineConfig {
        registry: RegistryConfig {
            shares: CategoryShares::new(0.80, 0.20),
            analyzers: vec![
                AnalyzerDescriptor::quantitative("nuclear_morphology", 0.25),
                AnalyzerDescriptor::quantitative("mitotic_activity", 0.20),
                AnalyzerDescriptor::quantitative("tissue_architecture", 0.20),
                AnalyzerDescriptor::quantitative("cellular_density", 0.15),
                AnalyzerDescriptor::learned("cnn_classifier", 0.12),
                AnalyzerDescriptor::learned("attention_model", 0.08),
            ],
        },
        failure_policy: FailurePolicy::default(),
        clinical_bonus: ClinicalBonusPolicy::new(0.08)
            .with_rule(BonusRule::new("age_65_plus", "age", BonusCondition::AtLeast(65.0), 0.05))
            .with_rule(BonusRule::flag("smoking_history", 0.05))
            .with_rule(BonusRule::flag("family_history", 0.03)),
        axes: vec![
            grade_axis(),
            stage_axis(),
            AxisConfig::new(
                "subtype_risk",
                vec![
                    ThresholdBand::new("standard", 0.0, 0.6),
                    ThresholdBand::new("high", 0.6, 1.0),
                ],
            )
            .from_source(ScoreSource::Category {
                category: AnalyzerCategory::Learned,
            }),
        ],
        rules: shared_rules(
            "Molecular testing for actionable driver mutations",
            "PD-L1 expression assessment",
        ),
    }
}

/// Breast profile: five quantitative analyzers, two learned ones split 60/40.
pub fn breast() -> EngineConfig {
    EngineConfig {
        registry: RegistryConfig {
            shares: CategoryShares::new(0.80, 0.20),
            analyzers: vec![
                AnalyzerDescriptor::quantitative("tubule_formation", 0.20),
                AnalyzerDescriptor::quantitative("nuclear_pleomorphism", 0.18),
                AnalyzerDescriptor::quantitative("mitotic_count", 0.16),
                AnalyzerDescriptor::quantitative("stromal_invasion", 0.14),
                AnalyzerDescriptor::quantitative("lymphovascular_pattern", 0.12),
                AnalyzerDescriptor::learned("cnn_classifier", 0.12),
                AnalyzerDescriptor::learned("ensemble_model", 0.08),
            ],
        },
        failure_policy: FailurePolicy::default(),
        clinical_bonus: ClinicalBonusPolicy::new(0.10)
            .with_rule(BonusRule::new("age_50_plus", "age", BonusCondition::AtLeast(50.0), 0.03))
            .with_rule(BonusRule::flag("family_history", 0.05))
            .with_rule(BonusRule::flag("known_brca_carrier", 0.05)),
        axes: vec![
            grade_axis(),
            stage_axis(),
            AxisConfig::new(
                "subtype_risk",
                vec![
                    ThresholdBand::new("standard", 0.0, 0.55),
                    ThresholdBand::new("high", 0.55, 1.0),
                ],
            )
            .from_source(ScoreSource::Analyzer {
                analyzer: "ensemble_model".to_string(),
            }),
        ],
        rules: shared_rules(
            "Receptor status panel (ER/PR/HER2)",
            "Genetic counseling referral",
        ),
    }
}

/// Every built-in profile with its domain name.
pub fn all() -> Vec<(&'static str, EngineConfig)> {
    vec![("lung", lung()), ("breast", breast())]
}
