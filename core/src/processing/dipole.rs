//! Dipole moment estimation from calibrated per-distance peak vectors.

use crate::math::lsq::{CurveFit, FitModel};
use crate::math::stats::StatsHelper;
use crate::prelude::{AnalysisConfig, AnalysisStage, ReferenceAxis, ScreenError, ScreenResult};
use crate::processing::calibrate::GeometricCalibrator;
use crate::telemetry::log::LogManager;
use serde::Serialize;
use std::f64::consts::PI;

/// Vacuum permeability in T m A^-1.
pub const MU_0: f64 = 1.256_637_062_12e-6;

/// On-axis field magnitude (T) of moment `moment` at `distance_m`.
pub fn field_from_moment(distance_m: f64, moment: f64) -> f64 {
    MU_0 * moment / (2.0 * PI * distance_m.powi(3))
}

/// Off-axis inversion for a field of magnitude `field_t` seen at `angle` rad.
pub fn moment_from_field(distance_m: f64, field_t: f64, angle: f64) -> f64 {
    let (sin, cos) = angle.sin_cos();
    4.0 * PI * distance_m.powi(3) * field_t / (MU_0 * (2.0 * cos * cos - sin * sin))
}

/// Number of separate measurement distances; repeats at one distance count once.
pub fn distinct_distances(distances: impl IntoIterator<Item = f64>) -> usize {
    let mut sorted: Vec<f64> = distances.into_iter().collect();
    sorted.sort_by(f64::total_cmp);
    sorted.dedup_by(|a, b| (*a - *b).abs() <= 1e-9 * b.abs().max(1.0));
    sorted.len()
}

/// Angle between `vector` and a sensor-fixed axis; `None` for a zero vector.
pub fn angle_to_axis(vector: [f64; 3], axis: ReferenceAxis) -> Option<f64> {
    let magnitude = StatsHelper::norm(&vector);
    if magnitude == 0.0 || !magnitude.is_finite() {
        return None;
    }
    let cosine = StatsHelper::dot(&vector, &axis.unit_vector()) / magnitude;
    Some(cosine.clamp(-1.0, 1.0).acos())
}

/// `B(r; m)` with `r` as abscissa and the moment as the only parameter.
pub struct DipoleModel;

impl FitModel for DipoleModel {
    fn parameter_count(&self) -> usize {
        1
    }

    fn evaluate(&self, x: f64, params: &[f64]) -> f64 {
        field_from_moment(x, params[0])
    }

    fn gradient(&self, x: f64, _params: &[f64]) -> Vec<f64> {
        vec![field_from_moment(x, 1.0)]
    }
}

/// Everything derived from one dataset on the way to its moment estimate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistanceEstimate {
    pub dataset_id: String,
    pub distance_m: f64,
    /// Per-axis spectral peaks in T.
    pub peaks_t: [f64; 3],
    /// Peaks projected through the per-axis offsets.
    pub calibrated_t: [f64; 3],
    pub magnitude_t: f64,
    pub angle_rad: f64,
    pub moment: f64,
}

impl DistanceEstimate {
    pub fn from_peaks(
        dataset_id: &str,
        distance_cm: f64,
        offsets_cm: [f64; 3],
        peaks_t: [f64; 3],
        axis: ReferenceAxis,
    ) -> ScreenResult<Self> {
        let calibrated_t = GeometricCalibrator::new(distance_cm)?.adjust_axes(peaks_t, offsets_cm);
        let magnitude_t = StatsHelper::norm(&calibrated_t);
        let angle_rad = angle_to_axis(calibrated_t, axis).ok_or_else(|| {
            ScreenError::DataConsistency(format!(
                "dataset '{}': calibrated peak vector has no magnitude",
                dataset_id
            ))
        })?;
        let distance_m = distance_cm / 100.0;
        let moment = moment_from_field(distance_m, magnitude_t, angle_rad);
        if !moment.is_finite() {
            return Err(ScreenError::Fit(format!(
                "dataset '{}': moment inversion is undefined at {:.4} rad",
                dataset_id, angle_rad
            )));
        }
        Ok(Self {
            dataset_id: dataset_id.to_string(),
            distance_m,
            peaks_t,
            calibrated_t,
            magnitude_t,
            angle_rad,
            moment,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FitPoint {
    pub distance_m: f64,
    pub observed_t: f64,
    pub fitted_t: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DipoleFit {
    pub moment: f64,
    pub moment_err: f64,
    /// Pearson statistic over the per-distance fields; absent if any fitted field is not positive.
    pub chi_square: Option<f64>,
    pub points: Vec<FitPoint>,
    pub iterations: usize,
}

/// Aggregates per-distance estimates into one least-squares moment.
pub struct DipoleFitStage {
    config: Option<AnalysisConfig>,
    logger: LogManager,
}

impl DipoleFitStage {
    pub fn new() -> Self {
        Self {
            config: None,
            logger: LogManager::new("dipole"),
        }
    }
}

impl Default for DipoleFitStage {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisStage for DipoleFitStage {
    type Input = Vec<DistanceEstimate>;
    type Output = DipoleFit;

    fn initialize(&mut self, config: &AnalysisConfig) -> ScreenResult<()> {
        if config.min_distances < 2 {
            return Err(ScreenError::DataConsistency(format!(
                "at least two distances are needed to fit, configured {}",
                config.min_distances
            )));
        }
        self.config = Some(config.clone());
        Ok(())
    }

    fn execute(&mut self, estimates: Vec<DistanceEstimate>) -> ScreenResult<DipoleFit> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| ScreenError::Fit("dipole stage not initialized".into()))?;

        let found = distinct_distances(estimates.iter().map(|e| e.distance_m));
        if found < config.min_distances {
            return Err(ScreenError::InsufficientData {
                required: config.min_distances,
                found,
            });
        }

        let distances: Vec<f64> = estimates.iter().map(|e| e.distance_m).collect();
        let observed: Vec<f64> = estimates
            .iter()
            .map(|e| field_from_moment(e.distance_m, e.moment.abs()))
            .collect();

        let solution = CurveFit::new(config.max_iterations).solve(
            &DipoleModel,
            &distances,
            &observed,
            &[1.0],
        )?;
        let moment = solution.params[0];
        let moment_err = solution.standard_errors()[0];
        if !(moment.is_finite() && moment_err.is_finite()) {
            return Err(ScreenError::Fit(format!(
                "fit produced a non-finite moment ({} ± {})",
                moment, moment_err
            )));
        }

        let points: Vec<FitPoint> = distances
            .iter()
            .zip(&observed)
            .map(|(&distance_m, &observed_t)| FitPoint {
                distance_m,
                observed_t,
                fitted_t: field_from_moment(distance_m, moment),
            })
            .collect();
        let fitted: Vec<f64> = points.iter().map(|p| p.fitted_t).collect();
        let chi_square = StatsHelper::chi_square(&observed, &fitted);

        self.logger.record(&format!(
            "moment {:.4e} ± {:.2e} N m/T from {} distances in {} iterations",
            moment,
            moment_err,
            points.len(),
            solution.iterations
        ));

        Ok(DipoleFit {
            moment,
            moment_err,
            chi_square,
            points,
            iterations: solution.iterations,
        })
    }

    fn cleanup(&mut self) {
        self.config = None;
    }
}
