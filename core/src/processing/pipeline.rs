//! Batch measurement-to-verdict pipeline over a finished [`Table`].

use crate::prelude::{AnalysisConfig, AnalysisStage, ClassificationBasis, ScreenError, ScreenResult};
use crate::processing::classify::{Classification, StrayFieldClassifier};
use crate::processing::dipole::{distinct_distances, DipoleFitStage, DistanceEstimate, FitPoint};
use crate::processing::record::{SensorRecord, FIELD_AXES};
use crate::processing::spectral::{AxisSpectrum, SpectralInput, SpectralStage};
use crate::table::Table;
use crate::telemetry::log::LogManager;
use serde::Serialize;

/// Outcome of one analysis run; created once and only ever appended to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FitResult {
    pub moment: f64,
    pub moment_err: f64,
    pub stray_field_t: f64,
    pub stray_field_err_t: f64,
    pub classification: Classification,
    pub basis: ClassificationBasis,
    pub limit: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetSpectra {
    pub dataset_id: String,
    pub axes: Vec<AxisSpectrum>,
}

/// FitResult plus the intermediate products the plotting layer renders.
#[derive(Debug, Clone, Serialize)]
pub struct ScreeningReport {
    pub fit: FitResult,
    pub estimates: Vec<DistanceEstimate>,
    pub points: Vec<FitPoint>,
    pub spectra: Vec<DatasetSpectra>,
    pub chi_square: Option<f64>,
    pub iterations: usize,
}

pub struct ScreeningPipeline {
    config: AnalysisConfig,
    logger: LogManager,
}

impl ScreeningPipeline {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            logger: LogManager::new("pipeline"),
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn run(&self, table: &Table) -> ScreenResult<ScreeningReport> {
        let records = table
            .datasets()
            .iter()
            .map(|dataset| SensorRecord::from_dataset(dataset, &self.config))
            .collect::<ScreenResult<Vec<_>>>()?;
        let found = distinct_distances(records.iter().map(|r| r.distance_cm));
        if found < self.config.min_distances {
            return Err(ScreenError::InsufficientData {
                required: self.config.min_distances,
                found,
            });
        }
        let classifier = StrayFieldClassifier::new(&self.config)?;

        self.logger.record(&format!(
            "analysing '{}' with {} dataset(s)",
            table.title().unwrap_or("untitled"),
            records.len()
        ));

        let mut spectral = SpectralStage::new();
        spectral.initialize(&self.config)?;
        let mut estimates = Vec::with_capacity(records.len());
        let mut spectra = Vec::with_capacity(records.len());
        for record in &records {
            let (estimate, axes) = self.estimate(&mut spectral, record)?;
            estimates.push(estimate);
            spectra.push(DatasetSpectra {
                dataset_id: record.dataset_id.clone(),
                axes,
            });
        }
        spectral.cleanup();

        let mut fitter = DipoleFitStage::new();
        fitter.initialize(&self.config)?;
        let fit = fitter.execute(estimates.clone())?;
        fitter.cleanup();

        let verdict = classifier.evaluate(fit.moment, fit.moment_err);
        self.logger.record(&format!(
            "{} on {:?} (limit {}); stray field {:.3e} ± {:.1e} T at 1 m",
            verdict.classification,
            classifier.basis(),
            classifier.limit(),
            verdict.stray_field_t,
            verdict.stray_field_err_t
        ));

        Ok(ScreeningReport {
            fit: FitResult {
                moment: fit.moment,
                moment_err: fit.moment_err,
                stray_field_t: verdict.stray_field_t,
                stray_field_err_t: verdict.stray_field_err_t,
                classification: verdict.classification,
                basis: classifier.basis(),
                limit: classifier.limit(),
            },
            estimates,
            points: fit.points,
            spectra,
            chi_square: fit.chi_square,
            iterations: fit.iterations,
        })
    }

    fn estimate(
        &self,
        spectral: &mut SpectralStage,
        record: &SensorRecord,
    ) -> ScreenResult<(DistanceEstimate, Vec<AxisSpectrum>)> {
        let mut peaks = [0.0; 3];
        let mut axes = Vec::with_capacity(FIELD_AXES.len());
        for (index, name) in FIELD_AXES.iter().enumerate() {
            let axis = spectral.execute(SpectralInput {
                label: format!("{}/{}", record.dataset_id, name),
                samples: record.axes[index].clone(),
                sample_rate_hz: record.sample_rate_hz,
            })?;
            peaks[index] = axis.peak.amplitude;
            axes.push(axis);
        }
        let estimate = DistanceEstimate::from_peaks(
            &record.dataset_id,
            record.distance_cm,
            record.offsets_cm,
            peaks,
            self.config.reference_axis,
        )?;
        self.logger.detail(&format!(
            "dataset '{}' at {} cm: |B| {:.4e} T, angle {:.4} rad, moment {:.4e}",
            record.dataset_id,
            record.distance_cm,
            estimate.magnitude_t,
            estimate.angle_rad,
            estimate.moment
        ));
        Ok((estimate, axes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Dataset, Property, Variable};

    fn dataset(id: &str, distance: &str, bz: Vec<f64>) -> Dataset {
        let times: Vec<f64> = (0..bz.len()).map(|i| i as f64 * 0.1).collect();
        let flat = vec![100.0; bz.len()];
        Dataset::new(id)
            .with_property(Property::new("Distance", [distance, "[cm]"]))
            .with_property(Property::new("Offset_cm", ["0", "0", "0"]))
            .with_variable(Variable::numeric("Offset", "s", &times))
            .and_then(|d| d.with_variable(Variable::numeric("Bx", "nT", &flat)))
            .and_then(|d| d.with_variable(Variable::numeric("By", "nT", &flat)))
            .and_then(|d| d.with_variable(Variable::numeric("Bz", "nT", &bz)))
            .unwrap()
    }

    fn wave(amplitude: f64) -> Vec<f64> {
        (0..100)
            .map(|i| amplitude * (2.0 * std::f64::consts::PI * i as f64 / 10.0).sin())
            .collect()
    }

    #[test]
    fn single_dataset_is_insufficient() {
        let table = Table::builder().dataset(dataset("0", "9", wave(50.0))).build().unwrap();
        let err = ScreeningPipeline::new(AnalysisConfig::default())
            .run(&table)
            .unwrap_err();
        assert!(matches!(err, ScreenError::InsufficientData { required: 2, found: 1 }));
    }

    #[test]
    fn repeated_distance_is_insufficient() {
        let table = Table::builder()
            .dataset(dataset("0", "9", wave(500.0)))
            .dataset(dataset("1", "9", wave(480.0)))
            .build()
            .unwrap();
        let err = ScreeningPipeline::new(AnalysisConfig::default())
            .run(&table)
            .unwrap_err();
        assert!(matches!(err, ScreenError::InsufficientData { required: 2, found: 1 }));
    }

    #[test]
    fn consistency_checked_before_counting() {
        let broken = Dataset::new("x").with_property(Property::new("Distance", ["9", "[cm]"]));
        let table = Table::builder().dataset(broken).build().unwrap();
        let err = ScreeningPipeline::new(AnalysisConfig::default())
            .run(&table)
            .unwrap_err();
        assert!(matches!(err, ScreenError::DataConsistency(_)));
    }

    #[test]
    fn produces_report_for_each_dataset() {
        let table = Table::builder()
            .dataset(dataset("0", "9", wave(500.0)))
            .dataset(dataset("1", "12", wave(210.0)))
            .build()
            .unwrap();
        let report = ScreeningPipeline::new(AnalysisConfig::default())
            .run(&table)
            .unwrap();
        assert_eq!(report.estimates.len(), 2);
        assert_eq!(report.spectra[1].axes.len(), 3);
        assert_eq!(report.points.len(), 2);
        assert!(report.fit.moment > 0.0);
        assert_eq!(report.fit.basis, ClassificationBasis::Moment);
    }
}
