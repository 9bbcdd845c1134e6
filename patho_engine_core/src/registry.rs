use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tolerance used for every weight/share sum check.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Analyzer family. Each family owns a declared share of the total weight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerCategory {
    /// Hand-built morphological measurements.
    Quantitative,
    /// Model-derived scores.
    Learned,
}

impl AnalyzerCategory {
    pub const ALL: [AnalyzerCategory; 2] = [AnalyzerCategory::Quantitative, AnalyzerCategory::Learned];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyzerCategory::Quantitative => "quantitative",
            AnalyzerCategory::Learned => "learned",
        }
    }
}

impl fmt::Display for AnalyzerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared share of the total weight per category.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CategoryShares {
    pub quantitative: f64,
    pub learned: f64,
}

impl Default for CategoryShares {
    fn default() -> Self {
        Self {
            quantitative: 0.80,
            learned: 0.20,
        }
    }
}

impl CategoryShares {
    pub fn new(quantitative: f64, learned: f64) -> Self {
        Self { quantitative, learned }
    }

    /// Everything in one category.
    pub fn only(category: AnalyzerCategory) -> Self {
        match category {
            AnalyzerCategory::Quantitative => Self::new(1.0, 0.0),
            AnalyzerCategory::Learned => Self::new(0.0, 1.0),
        }
    }

    pub fn share(&self, category: AnalyzerCategory) -> f64 {
        match category {
            AnalyzerCategory::Quantitative => self.quantitative,
            AnalyzerCategory::Learned => self.learned,
        }
    }
}

/// Static description of one analyzer. `weight` is its fraction of the
/// whole registry, not of its category.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerDescriptor {
    pub name: String,
    pub category: AnalyzerCategory,
    pub weight: f64,
}

impl AnalyzerDescriptor {
    pub fn new(name: impl Into<String>, category: AnalyzerCategory, weight: f64) -> Self {
        Self {
            name: name.into(),
            category,
            weight,
        }
    }

    pub fn quantitative(name: impl Into<String>, weight: f64) -> Self {
        Self::new(name, AnalyzerCategory::Quantitative, weight)
    }

    pub fn learned(name: impl Into<String>, weight: f64) -> Self {
        Self::new(name, AnalyzerCategory::Learned, weight)
    }
}

/// Plain configuration form of a registry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub shares: CategoryShares,
    pub analyzers: Vec<AnalyzerDescriptor>,
}

/// Ordered set of analyzer descriptors.
///
/// Registration order is preserved and becomes the order of every
/// per-analyzer sequence the engine reports.
#[derive(Clone, Debug, Default)]
pub struct AnalyzerRegistry {
    shares: CategoryShares,
    descriptors: Vec<AnalyzerDescriptor>,
    index: HashMap<String, usize>,
}

impl AnalyzerRegistry {
    pub fn new(shares: CategoryShares) -> Self {
        Self {
            shares,
            descriptors: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Build and validate a registry from configuration.
    pub fn from_config(cfg: &RegistryConfig) -> Result<Self, ConfigError> {
        let mut registry = Self::new(cfg.shares);
        for d in &cfg.analyzers {
            registry.register(d.clone())?;
        }
        registry.validate()?;
        Ok(registry)
    }

    /// Add a descriptor. Category totals are only checked by `validate`.
    pub fn register(&mut self, descriptor: AnalyzerDescriptor) -> Result<(), ConfigError> {
        if descriptor.name.trim().is_empty() {
            return Err(ConfigError::EmptyAnalyzerName);
        }
        if !descriptor.weight.is_finite() || descriptor.weight <= 0.0 || descriptor.weight > 1.0 {
            return Err(ConfigError::InvalidWeight {
                name: descriptor.name,
                weight: descriptor.weight,
            });
        }
        if self.index.contains_key(&descriptor.name) {
            return Err(ConfigError::DuplicateAnalyzer(descriptor.name));
        }
        self.index.insert(descriptor.name.clone(), self.descriptors.len());
        self.descriptors.push(descriptor);
        Ok(())
    }

    /// Check shares and per-category totals once every descriptor is known.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.descriptors.is_empty() {
            return Err(ConfigError::EmptyRegistry);
        }

        let mut share_sum = 0.0;
        for category in AnalyzerCategory::ALL {
            let share = self.shares.share(category);
            if !share.is_finite() || !(0.0..=1.0).contains(&share) {
                return Err(ConfigError::InvalidShare { category, share });
            }
            share_sum += share;
        }
        if (share_sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ConfigError::SharesNotNormalized(share_sum));
        }

        for category in AnalyzerCategory::ALL {
            let share = self.shares.share(category);
            let total = self.category_weight(category);
            if total > share + WEIGHT_TOLERANCE {
                return Err(ConfigError::CategoryShareExceeded { category, total, share });
            }
            if (total - share).abs() > WEIGHT_TOLERANCE {
                return Err(ConfigError::CategoryWeightMismatch { category, total, share });
            }
        }

        Ok(())
    }

    pub fn shares(&self) -> CategoryShares {
        self.shares
    }

    pub fn descriptors(&self) -> &[AnalyzerDescriptor] {
        &self.descriptors
    }

    pub fn get(&self, name: &str) -> Option<&AnalyzerDescriptor> {
        self.index.get(name).map(|&i| &self.descriptors[i])
    }

    /// Declaration position of an analyzer.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.descriptors.iter().map(|d| d.name.as_str())
    }

    pub fn category_weight(&self, category: AnalyzerCategory) -> f64 {
        self.descriptors
            .iter()
            .filter(|d| d.category == category)
            .map(|d| d.weight)
            .sum()
    }

    pub fn total_weight(&self) -> f64 {
        self.descriptors.iter().map(|d| d.weight).sum()
    }

    pub fn to_config(&self) -> RegistryConfig {
        RegistryConfig {
            shares: self.shares,
            analyzers: self.descriptors.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split_registry() -> AnalyzerRegistry {
        let mut r = AnalyzerRegistry::new(CategoryShares::default());
        r.register(AnalyzerDescriptor::quantitative("nuclear", 0.30)).unwrap();
        r.register(AnalyzerDescriptor::quantitative("mitotic", 0.25)).unwrap();
        r.register(AnalyzerDescriptor::quantitative("architecture", 0.25)).unwrap();
        r.register(AnalyzerDescriptor::learned("cnn", 0.12)).unwrap();
        r.register(AnalyzerDescriptor::learned("transformer", 0.08)).unwrap();
        r
    }

    #[test]
    fn valid_split_passes() {
        let r = split_registry();
        assert!(r.validate().is_ok());
        assert!((r.total_weight() - 1.0).abs() < WEIGHT_TOLERANCE);
        assert_eq!(r.position("cnn"), Some(3));
    }

    #[test]
    fn duplicate_name_rejected_at_register() {
        let mut r = split_registry();
        let err = r.register(AnalyzerDescriptor::learned("cnn", 0.01)).unwrap_err();
        assert_eq!(err, ConfigError::DuplicateAnalyzer("cnn".to_string()));
    }

    #[test]
    fn weight_out_of_range_rejected() {
        let mut r = AnalyzerRegistry::new(CategoryShares::default());
        assert!(matches!(
            r.register(AnalyzerDescriptor::quantitative("zero", 0.0)),
            Err(ConfigError::InvalidWeight { .. })
        ));
        assert!(matches!(
            r.register(AnalyzerDescriptor::quantitative("big", 1.5)),
            Err(ConfigError::InvalidWeight { .. })
        ));
        assert!(matches!(
            r.register(AnalyzerDescriptor::quantitative("nan", f64::NAN)),
            Err(ConfigError::InvalidWeight { .. })
        ));
    }

    #[test]
    fn category_overflow_detected_on_validate_only() {
        let mut r = split_registry();
        // registration itself succeeds; the overflow is a whole-registry property
        r.register(AnalyzerDescriptor::learned("extra", 0.05)).unwrap();
        match r.validate() {
            Err(ConfigError::CategoryShareExceeded { category, .. }) => {
                assert_eq!(category, AnalyzerCategory::Learned)
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn category_shortfall_detected() {
        let mut r = AnalyzerRegistry::new(CategoryShares::default());
        r.register(AnalyzerDescriptor::quantitative("a", 0.80)).unwrap();
        r.register(AnalyzerDescriptor::learned("b", 0.10)).unwrap();
        assert!(matches!(
            r.validate(),
            Err(ConfigError::CategoryWeightMismatch {
                category: AnalyzerCategory::Learned,
                ..
            })
        ));
    }

    #[test]
    fn shares_must_sum_to_one() {
        let mut r = AnalyzerRegistry::new(CategoryShares::new(0.7, 0.2));
        r.register(AnalyzerDescriptor::quantitative("a", 0.7)).unwrap();
        r.register(AnalyzerDescriptor::learned("b", 0.2)).unwrap();
        assert!(matches!(r.validate(), Err(ConfigError::SharesNotNormalized(_))));
    }

    #[test]
    fn single_category_registry() {
        let mut r = AnalyzerRegistry::new(CategoryShares::only(AnalyzerCategory::Quantitative));
        r.register(AnalyzerDescriptor::quantitative("a", 0.5)).unwrap();
        r.register(AnalyzerDescriptor::quantitative("b", 0.3)).unwrap();
        r.register(AnalyzerDescriptor::quantitative("c", 0.2)).unwrap();
        assert!(r.validate().is_ok());
    }

    #[test]
    fn empty_registry_is_invalid() {
        let r = AnalyzerRegistry::new(CategoryShares::default());
        assert_eq!(r.validate(), Err(ConfigError::EmptyRegistry));
    }

    #[test]
    fn from_config_round_trips_order() {
        let cfg = split_registry().to_config();
        let r = AnalyzerRegistry::from_config(&cfg).unwrap();
        let names: Vec<&str> = r.names().collect();
        assert_eq!(names, ["nuclear", "mitotic", "architecture", "cnn", "transformer"]);
    }
}
