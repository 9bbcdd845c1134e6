use serde::{Deserialize, Serialize};

use crate::error::{ClassifyError, ConfigError};

const BOUND_TOLERANCE: f64 = 1e-9;

/// Half-open interval `[lower_bound, upper_bound)` carrying a label.
/// `upper_bound: None` means unbounded and is only allowed on the last band.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThresholdBand {
    pub label: String,
    pub lower_bound: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_bound: Option<f64>,
}

impl ThresholdBand {
    pub fn new(label: impl Into<String>, lower_bound: f64, upper_bound: f64) -> Self {
        Self {
            label: label.into(),
            lower_bound,
            upper_bound: Some(upper_bound),
        }
    }

    pub fn open(label: impl Into<String>, lower_bound: f64) -> Self {
        Self {
            label: label.into(),
            lower_bound,
            upper_bound: None,
        }
    }

    fn upper(&self) -> f64 {
        self.upper_bound.unwrap_or(f64::INFINITY)
    }
}

/// Maps a value in [0,1] to exactly one of an ordered, gap-free set of bands.
#[derive(Clone, Debug, PartialEq)]
pub struct ThresholdClassifier {
    name: String,
    bands: Vec<ThresholdBand>,
}

impl ThresholdClassifier {
    /// Validate contiguity and build.
    ///
    /// Bands must already be sorted: the first starts at 0, each ends where
    /// the next starts, the last ends at 1 or is open.
    pub fn new(name: impl Into<String>, bands: Vec<ThresholdBand>) -> Result<Self, ConfigError> {
        let name = name.into();
        let table = || name.clone();

        let (first, last) = match (bands.first(), bands.last()) {
            (Some(f), Some(l)) => (f, l),
            _ => return Err(ConfigError::EmptyBandTable(table())),
        };

        if first.lower_bound.abs() > BOUND_TOLERANCE {
            return Err(ConfigError::FirstBandNotAtZero {
                table: table(),
                lower: first.lower_bound,
            });
        }

        let mut seen = std::collections::HashSet::new();
        for (i, band) in bands.iter().enumerate() {
            if band.label.trim().is_empty() {
                return Err(ConfigError::EmptyBandLabel { table: table() });
            }
            if !seen.insert(band.label.as_str()) {
                return Err(ConfigError::DuplicateBandLabel {
                    table: table(),
                    label: band.label.clone(),
                });
            }
            if band.upper_bound.is_none() && i + 1 != bands.len() {
                return Err(ConfigError::OpenBandNotLast {
                    table: table(),
                    label: band.label.clone(),
                });
            }
            // NaN bounds fail this comparison as well
            if !(band.lower_bound < band.upper()) || !band.lower_bound.is_finite() {
                return Err(ConfigError::InvertedBand {
                    table: table(),
                    label: band.label.clone(),
                    lower: band.lower_bound,
                    upper: band.upper(),
                });
            }
        }

        for pair in bands.windows(2) {
            let (left, right) = (&pair[0], &pair[1]);
            if (left.upper() - right.lower_bound).abs() > BOUND_TOLERANCE {
                return Err(ConfigError::BandDiscontinuity {
                    table: table(),
                    left: left.label.clone(),
                    left_upper: left.upper(),
                    right: right.label.clone(),
                    right_lower: right.lower_bound,
                });
            }
        }

        if let Some(upper) = last.upper_bound {
            if (upper - 1.0).abs() > BOUND_TOLERANCE {
                return Err(ConfigError::LastBandNotAtOne { table: table(), upper });
            }
        } else if last.lower_bound > 1.0 {
            return Err(ConfigError::LastBandNotAtOne {
                table: table(),
                upper: last.upper(),
            });
        }

        Ok(Self { name, bands })
    }

    /// Evenly spaced bands over [0,1], one per label.
    pub fn uniform<S: AsRef<str>>(name: impl Into<String>, labels: &[S]) -> Result<Self, ConfigError> {
        let n = labels.len();
        let bands = labels
            .iter()
            .enumerate()
            .map(|(i, l)| {
                let lower = i as f64 / n as f64;
                let upper = (i + 1) as f64 / n as f64;
                ThresholdBand::new(l.as_ref(), lower, upper)
            })
            .collect();
        Self::new(name, bands)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bands(&self) -> &[ThresholdBand] {
        &self.bands
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.bands.iter().map(|b| b.label.as_str())
    }

    /// Label of the band containing `value`, after clamping into [0,1].
    /// `1.0` falls in the last band.
    pub fn classify(&self, value: f64) -> Result<&str, ClassifyError> {
        if value.is_nan() {
            return Err(ClassifyError::NotANumber(self.name.clone()));
        }
        let v = value.clamp(0.0, 1.0);
        // first band starts at 0, so at least one lower bound is <= v
        let idx = self.bands.partition_point(|b| b.lower_bound <= v).saturating_sub(1);
        Ok(self.bands[idx].label.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grade() -> ThresholdClassifier {
        ThresholdClassifier::new(
            "grade",
            vec![
                ThresholdBand::new("Low", 0.0, 0.4),
                ThresholdBand::new("Moderate", 0.4, 0.7),
                ThresholdBand::new("High", 0.7, 1.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn lower_bound_inclusive_top_closed() {
        let c = grade();
        assert_eq!(c.classify(0.0).unwrap(), "Low");
        assert_eq!(c.classify(0.399_999).unwrap(), "Low");
        assert_eq!(c.classify(0.4).unwrap(), "Moderate");
        assert_eq!(c.classify(0.7).unwrap(), "High");
        assert_eq!(c.classify(1.0).unwrap(), "High");
    }

    #[test]
    fn out_of_range_values_clamped() {
        let c = grade();
        assert_eq!(c.classify(-3.0).unwrap(), "Low");
        assert_eq!(c.classify(7.5).unwrap(), "High");
        assert_eq!(c.classify(f64::INFINITY).unwrap(), "High");
    }

    #[test]
    fn nan_is_value_error() {
        assert_eq!(
            grade().classify(f64::NAN).unwrap_err(),
            ClassifyError::NotANumber("grade".into())
        );
    }

    #[test]
    fn open_top_band() {
        let c = ThresholdClassifier::new(
            "risk",
            vec![ThresholdBand::new("standard", 0.0, 0.6), ThresholdBand::open("elevated", 0.6)],
        )
        .unwrap();
        assert_eq!(c.classify(1.0).unwrap(), "elevated");
        assert_eq!(c.classify(0.59).unwrap(), "standard");
    }

    #[test]
    fn gap_and_overlap_rejected() {
        let gap = ThresholdClassifier::new(
            "g",
            vec![ThresholdBand::new("a", 0.0, 0.4), ThresholdBand::new("b", 0.5, 1.0)],
        );
        assert!(matches!(gap, Err(ConfigError::BandDiscontinuity { .. })));

        let overlap = ThresholdClassifier::new(
            "o",
            vec![ThresholdBand::new("a", 0.0, 0.6), ThresholdBand::new("b", 0.5, 1.0)],
        );
        assert!(matches!(overlap, Err(ConfigError::BandDiscontinuity { .. })));
    }

    #[test]
    fn boundary_conditions_rejected() {
        assert!(matches!(
            ThresholdClassifier::new("e", vec![]),
            Err(ConfigError::EmptyBandTable(_))
        ));
        assert!(matches!(
            ThresholdClassifier::new("z", vec![ThresholdBand::new("a", 0.1, 1.0)]),
            Err(ConfigError::FirstBandNotAtZero { .. })
        ));
        assert!(matches!(
            ThresholdClassifier::new("t", vec![ThresholdBand::new("a", 0.0, 0.9)]),
            Err(ConfigError::LastBandNotAtOne { .. })
        ));
        assert!(matches!(
            ThresholdClassifier::new(
                "i",
                vec![ThresholdBand::new("a", 0.0, 0.5), ThresholdBand::new("b", 0.5, 0.5)]
            ),
            Err(ConfigError::InvertedBand { .. })
        ));
        assert!(matches!(
            ThresholdClassifier::new(
                "m",
                vec![ThresholdBand::open("a", 0.0), ThresholdBand::new("b", 0.5, 1.0)]
            ),
            Err(ConfigError::OpenBandNotLast { .. })
        ));
        assert!(matches!(
            ThresholdClassifier::new(
                "d",
                vec![ThresholdBand::new("a", 0.0, 0.5), ThresholdBand::new("a", 0.5, 1.0)]
            ),
            Err(ConfigError::DuplicateBandLabel { .. })
        ));
    }

    #[test]
    fn every_value_maps_to_one_band() {
        let c = ThresholdClassifier::uniform("stage", &["I", "II", "III", "IV"]).unwrap();
        for i in 0..=1000 {
            let v = i as f64 / 1000.0;
            let label = c.classify(v).unwrap();
            let hits = c
                .bands()
                .iter()
                .filter(|b| {
                    let upper = b.upper_bound.unwrap_or(f64::INFINITY);
                    (b.lower_bound <= v && v < upper) || (v == 1.0 && upper == 1.0)
                })
                .count();
            assert_eq!(hits, 1, "value {v}");
            assert!(c.labels().any(|l| l == label));
        }
        assert_eq!(c.classify(0.25).unwrap(), "II");
        assert_eq!(c.classify(1.0).unwrap(), "IV");
    }
}
