use crate::prelude::{ScreenError, ScreenResult};

/// Inverse-cube projection of a reading taken `offset` behind the reference point.
pub fn inverse_cube_adjust(reading: f64, reference: f64, offset: f64) -> f64 {
    reading * ((reference + offset) / reference).powi(3)
}

/// Projects per-axis peak amplitudes to a sensor's external reference distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometricCalibrator {
    reference: f64,
}

impl GeometricCalibrator {
    pub fn new(reference: f64) -> ScreenResult<Self> {
        if !(reference.is_finite() && reference > 0.0) {
            return Err(ScreenError::DataConsistency(format!(
                "reference distance must be positive, got {}",
                reference
            )));
        }
        Ok(Self { reference })
    }

    pub fn reference(&self) -> f64 {
        self.reference
    }

    pub fn adjust(&self, reading: f64, offset: f64) -> f64 {
        inverse_cube_adjust(reading, self.reference, offset)
    }

    pub fn adjust_axes(&self, readings: [f64; 3], offsets: [f64; 3]) -> [f64; 3] {
        [
            self.adjust(readings[0], offsets[0]),
            self.adjust(readings[1], offsets[1]),
            self.adjust(readings[2], offsets[2]),
        ]
    }
}
