use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Label per axis, e.g. `{"grade": "G2", "stage": "II"}`.
pub type AxisLabels = BTreeMap<String, String>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Low,
    Medium,
    High,
}

/// Caller-supplied predicate over the label map.
#[derive(Clone)]
pub struct LabelPredicate(Arc<dyn Fn(&AxisLabels) -> bool + Send + Sync>);

impl LabelPredicate {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&AxisLabels) -> bool + Send + Sync + 'static,
    {
        LabelPredicate(Arc::new(f))
    }
}

impl fmt::Debug for LabelPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LabelPredicate(..)")
    }
}

/// When a rule fires. Reads nothing but the label map.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "when", rename_all = "snake_case")]
pub enum RuleCondition {
    Always,
    AxisIs { axis: String, label: String },
    AxisIn { axis: String, labels: Vec<String> },
    AllOf { conditions: Vec<RuleCondition> },
    AnyOf { conditions: Vec<RuleCondition> },
    Not { condition: Box<RuleCondition> },
    /// Code-only; not representable in configuration documents.
    #[serde(skip)]
    Custom(LabelPredicate),
}

impl RuleCondition {
    pub fn axis_is(axis: impl Into<String>, label: impl Into<String>) -> Self {
        RuleCondition::AxisIs {
            axis: axis.into(),
            label: label.into(),
        }
    }

    pub fn axis_in<S: Into<String>>(axis: impl Into<String>, labels: impl IntoIterator<Item = S>) -> Self {
        RuleCondition::AxisIn {
            axis: axis.into(),
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&AxisLabels) -> bool + Send + Sync + 'static,
    {
        RuleCondition::Custom(LabelPredicate::new(f))
    }

    pub fn matches(&self, labels: &AxisLabels) -> bool {
        match self {
            RuleCondition::Always => true,
            RuleCondition::AxisIs { axis, label } => labels.get(axis) == Some(label),
            RuleCondition::AxisIn { axis, labels: any } => {
                labels.get(axis).is_some_and(|l| any.contains(l))
            }
            RuleCondition::AllOf { conditions } => conditions.iter().all(|c| c.matches(labels)),
            RuleCondition::AnyOf { conditions } => conditions.iter().any(|c| c.matches(labels)),
            RuleCondition::Not { condition } => !condition.matches(labels),
            RuleCondition::Custom(p) => (p.0)(labels),
        }
    }

    /// Axis names mentioned by declarative conditions.
    pub fn referenced_axes<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            RuleCondition::AxisIs { axis, .. } | RuleCondition::AxisIn { axis, .. } => out.push(axis),
            RuleCondition::AllOf { conditions } | RuleCondition::AnyOf { conditions } => {
                for c in conditions {
                    c.referenced_axes(out);
                }
            }
            RuleCondition::Not { condition } => condition.referenced_axes(out),
            RuleCondition::Always | RuleCondition::Custom(_) => {}
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecommendationRule {
    pub name: String,
    pub condition: RuleCondition,
    pub emits: Vec<String>,
    #[serde(default)]
    pub priority: Priority,
}

impl RecommendationRule {
    pub fn new<S: Into<String>>(
        name: impl Into<String>,
        condition: RuleCondition,
        emits: impl IntoIterator<Item = S>,
        priority: Priority,
    ) -> Self {
        Self {
            name: name.into(),
            condition,
            emits: emits.into_iter().map(Into::into).collect(),
            priority,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub items: Vec<String>,
    pub priority: Priority,
    /// Rules whose condition held, in declaration order.
    pub fired_rules: Vec<String>,
}

/// Ordered rule table. Output is append-only: earlier emissions keep their
/// positions, later duplicates are dropped.
#[derive(Clone, Debug, Default)]
pub struct RecommendationEngine {
    rules: Vec<RecommendationRule>,
}

impl RecommendationEngine {
    pub fn new(rules: Vec<RecommendationRule>) -> Self {
        Self { rules }
    }

    pub fn push(&mut self, rule: RecommendationRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[RecommendationRule] {
        &self.rules
    }

    pub fn recommend(&self, labels: &AxisLabels) -> Recommendation {
        let mut out = Recommendation::default();
        let mut seen: HashSet<&str> = HashSet::new();

        for rule in &self.rules {
            if !rule.condition.matches(labels) {
                continue;
            }
            out.fired_rules.push(rule.name.clone());
            out.priority = out.priority.max(rule.priority);
            for item in &rule.emits {
                if seen.insert(item.as_str()) {
                    out.items.push(item.clone());
                }
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> AxisLabels {
        pairs.iter().map(|(a, l)| (a.to_string(), l.to_string())).collect()
    }

    #[test]
    fn stable_dedup_across_rules() {
        let engine = RecommendationEngine::new(vec![
            RecommendationRule::new("r1", RuleCondition::Always, ["A", "B"], Priority::Low),
            RecommendationRule::new("r2", RuleCondition::Always, ["B", "C"], Priority::Medium),
        ]);
        let rec = engine.recommend(&AxisLabels::new());
        assert_eq!(rec.items, ["A", "B", "C"]);
        assert_eq!(rec.priority, Priority::Medium);
        assert_eq!(rec.fired_rules, ["r1", "r2"]);
    }

    #[test]
    fn nothing_fired_is_low_and_empty() {
        let engine = RecommendationEngine::new(vec![RecommendationRule::new(
            "never",
            RuleCondition::axis_is("grade", "G3"),
            ["urgent referral"],
            Priority::High,
        )]);
        let rec = engine.recommend(&labels(&[("grade", "G1")]));
        assert!(rec.items.is_empty());
        assert_eq!(rec.priority, Priority::Low);
    }

    #[test]
    fn priority_is_maximum_of_fired() {
        let engine = RecommendationEngine::new(vec![
            RecommendationRule::new("hi", RuleCondition::axis_is("grade", "G3"), ["x"], Priority::High),
            RecommendationRule::new("lo", RuleCondition::Always, ["y"], Priority::Low),
        ]);
        assert_eq!(engine.recommend(&labels(&[("grade", "G3")])).priority, Priority::High);
    }

    #[test]
    fn adding_a_rule_only_appends() {
        let mut engine = RecommendationEngine::new(vec![
            RecommendationRule::new("a", RuleCondition::Always, ["one", "two"], Priority::Low),
            RecommendationRule::new("b", RuleCondition::axis_is("stage", "IV"), ["three"], Priority::High),
        ]);
        let l = labels(&[("stage", "IV")]);
        let before = engine.recommend(&l).items;
        engine.push(RecommendationRule::new(
            "c",
            RuleCondition::Always,
            ["two", "four", "one"],
            Priority::Low,
        ));
        let after = engine.recommend(&l).items;
        assert_eq!(&after[..before.len()], &before[..]);
        assert_eq!(after, ["one", "two", "three", "four"]);
    }

    #[test]
    fn composite_conditions() {
        let cond = RuleCondition::AllOf {
            conditions: vec![
                RuleCondition::axis_in("grade", ["G2", "G3"]),
                RuleCondition::Not {
                    condition: Box::new(RuleCondition::axis_is("stage", "I")),
                },
            ],
        };
        assert!(cond.matches(&labels(&[("grade", "G3"), ("stage", "II")])));
        assert!(!cond.matches(&labels(&[("grade", "G3"), ("stage", "I")])));
        assert!(!cond.matches(&labels(&[("stage", "II")])));

        let mut axes = Vec::new();
        cond.referenced_axes(&mut axes);
        assert_eq!(axes, ["grade", "stage"]);
    }

    #[test]
    fn custom_predicate_sees_labels() {
        let cond = RuleCondition::custom(|l| l.len() == 2);
        assert!(cond.matches(&labels(&[("a", "x"), ("b", "y")])));
        assert!(!cond.matches(&labels(&[("a", "x")])));
    }

    #[test]
    fn conditions_deserialize_from_json() {
        let json = r#"{"when":"any_of","conditions":[
            {"when":"axis_is","axis":"grade","label":"G3"},
            {"when":"axis_in","axis":"stage","labels":["III","IV"]}
        ]}"#;
        let cond: RuleCondition = serde_json::from_str(json).unwrap();
        assert!(cond.matches(&labels(&[("stage", "IV")])));
        assert!(!cond.matches(&labels(&[("stage", "II")])));
    }
}
