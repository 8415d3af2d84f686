use crate::prelude::{AnalysisConfig, ClassificationBasis, ScreenError, ScreenResult};
use crate::processing::dipole::field_from_moment;
use serde::Serialize;
use std::fmt;

/// Standoff at which the stray field is quoted, in metres.
pub const STRAY_FIELD_DISTANCE_M: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Classification {
    Pass,
    Caution,
    Fail,
}

impl Classification {
    pub fn label(self) -> &'static str {
        match self {
            Classification::Pass => "PASS",
            Classification::Caution => "CAUTION",
            Classification::Fail => "FAIL",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Stray field at 1 m and the verdict for one fitted moment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StrayFieldVerdict {
    pub stray_field_t: f64,
    pub stray_field_err_t: f64,
    pub classification: Classification,
}

pub struct StrayFieldClassifier {
    limit: f64,
    pass_fraction: f64,
    basis: ClassificationBasis,
}

impl StrayFieldClassifier {
    pub fn new(config: &AnalysisConfig) -> ScreenResult<Self> {
        if !(config.limit.is_finite() && config.limit > 0.0) {
            return Err(ScreenError::DataConsistency(format!(
                "classification limit must be positive, got {}",
                config.limit
            )));
        }
        if !(config.pass_fraction > 0.0 && config.pass_fraction <= 1.0) {
            return Err(ScreenError::DataConsistency(format!(
                "pass fraction must lie in (0, 1], got {}",
                config.pass_fraction
            )));
        }
        Ok(Self {
            limit: config.limit,
            pass_fraction: config.pass_fraction,
            basis: config.basis,
        })
    }

    pub fn limit(&self) -> f64 {
        self.limit
    }

    pub fn basis(&self) -> ClassificationBasis {
        self.basis
    }

    /// Reaching the limit fails; PASS requires staying strictly below the margin.
    pub fn classify(&self, value: f64, error: f64) -> Classification {
        let upper = value + error;
        if upper >= self.limit {
            Classification::Fail
        } else if upper < self.pass_fraction * self.limit {
            Classification::Pass
        } else {
            Classification::Caution
        }
    }

    pub fn evaluate(&self, moment: f64, moment_err: f64) -> StrayFieldVerdict {
        let stray_field_t = field_from_moment(STRAY_FIELD_DISTANCE_M, moment);
        let stray_field_err_t = field_from_moment(STRAY_FIELD_DISTANCE_M, moment_err);
        let classification = match self.basis {
            ClassificationBasis::Moment => self.classify(moment, moment_err),
            ClassificationBasis::StrayField => self.classify(stray_field_t, stray_field_err_t),
        };
        StrayFieldVerdict {
            stray_field_t,
            stray_field_err_t,
            classification,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn classifier() -> StrayFieldClassifier {
        StrayFieldClassifier::new(&AnalysisConfig::default()).unwrap()
    }

    #[test]
    fn limit_itself_fails() {
        assert_eq!(classifier().classify(0.05, 0.0), Classification::Fail);
        assert_eq!(classifier().classify(0.03, 0.02), Classification::Fail);
    }

    #[test]
    fn pass_margin_is_caution() {
        assert_eq!(classifier().classify(0.95 * 0.05, 0.0), Classification::Caution);
        assert_eq!(classifier().classify(0.0475, 0.0), Classification::Caution);
    }

    #[test]
    fn below_margin_passes() {
        assert_eq!(classifier().classify(0.047, 0.0), Classification::Pass);
        assert_eq!(classifier().classify(0.01, 0.001), Classification::Pass);
    }

    #[test]
    fn stray_field_projects_to_one_metre() {
        let verdict = classifier().evaluate(0.02, 0.001);
        assert_relative_eq!(verdict.stray_field_t, 2e-7 * 0.02, max_relative = 1e-9);
        assert_relative_eq!(verdict.stray_field_err_t, 2e-7 * 0.001, max_relative = 1e-9);
        assert_eq!(verdict.classification, Classification::Pass);
    }

    #[test]
    fn stray_field_basis_thresholds_the_field() {
        let config = AnalysisConfig {
            basis: ClassificationBasis::StrayField,
            limit: 1e-8,
            ..AnalysisConfig::default()
        };
        let verdict = StrayFieldClassifier::new(&config).unwrap().evaluate(0.06, 0.0);
        assert_eq!(verdict.classification, Classification::Fail);
    }

    #[test]
    fn labels() {
        assert_eq!(Classification::Caution.to_string(), "CAUTION");
        assert_eq!(Classification::Pass.label(), "PASS");
    }

    #[test]
    fn rejects_bad_limits() {
        let config = AnalysisConfig {
            limit: 0.0,
            ..AnalysisConfig::default()
        };
        assert!(StrayFieldClassifier::new(&config).is_err());
    }
}
