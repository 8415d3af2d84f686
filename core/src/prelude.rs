use serde::{Deserialize, Serialize};

/// Sensor-fixed axis the per-distance moment angle is measured against.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReferenceAxis {
    X,
    Y,
    #[default]
    Z,
}

impl ReferenceAxis {
    pub fn unit_vector(self) -> [f64; 3] {
        match self {
            ReferenceAxis::X => [1.0, 0.0, 0.0],
            ReferenceAxis::Y => [0.0, 1.0, 0.0],
            ReferenceAxis::Z => [0.0, 0.0, 1.0],
        }
    }
}

/// Physical quantity the PASS/CAUTION/FAIL rule is applied to.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClassificationBasis {
    /// Fitted dipole moment plus its standard error, in N m T^-1.
    #[default]
    Moment,
    /// Projected 1 m stray field plus its error, in tesla.
    StrayField,
}

/// Shared configuration for every analysis stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    pub limit: f64,
    pub pass_fraction: f64,
    pub segment_cap: usize,
    pub spacing_tolerance: f64,
    pub reference_axis: ReferenceAxis,
    pub min_distances: usize,
    pub max_iterations: usize,
    pub basis: ClassificationBasis,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            limit: 0.05,
            pass_fraction: 0.95,
            segment_cap: 256,
            spacing_tolerance: 0.25,
            reference_axis: ReferenceAxis::Z,
            min_distances: 2,
            max_iterations: 200,
            basis: ClassificationBasis::Moment,
        }
    }
}

/// Common error type for parsing, analysis and ledger output.
#[derive(thiserror::Error, Debug)]
pub enum ScreenError {
    #[error("{file}, line {line}: {message}")]
    Format {
        file: String,
        line: u64,
        message: String,
    },
    #[error("data consistency: {0}")]
    DataConsistency(String),
    #[error("insufficient data: {found} usable distance(s), at least {required} required")]
    InsufficientData { required: usize, found: usize },
    #[error("fit failure: {0}")]
    Fit(String),
    #[error("acquisition boundary: {0}")]
    AcquisitionBoundary(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl ScreenError {
    pub fn format(file: &str, line: u64, message: impl Into<String>) -> Self {
        ScreenError::Format {
            file: file.to_string(),
            line,
            message: message.into(),
        }
    }
}

pub type ScreenResult<T> = Result<T, ScreenError>;

/// Trait describing the batch analysis stages of the screening pipeline.
pub trait AnalysisStage {
    type Input;
    type Output;

    fn initialize(&mut self, config: &AnalysisConfig) -> ScreenResult<()>;
    fn execute(&mut self, input: Self::Input) -> ScreenResult<Self::Output>;
    fn cleanup(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_error_names_file_and_line() {
        let err = ScreenError::format("run.csv", 12, "Bad column spec 'AAAA'");
        assert_eq!(err.to_string(), "run.csv, line 12: Bad column spec 'AAAA'");
    }

    #[test]
    fn default_config_uses_screening_limit() {
        let config = AnalysisConfig::default();
        assert_eq!(config.limit, 0.05);
        assert_eq!(config.segment_cap, 256);
        assert_eq!(config.reference_axis.unit_vector(), [0.0, 0.0, 1.0]);
    }
}
