//! Typed view of one dataset as the analysis stages need it.
//!
//! Every required property and variable is resolved here, before any
//! spectral work, so a table either validates completely or not at all.

use crate::prelude::{AnalysisConfig, ScreenError, ScreenResult};
use crate::processing::spectral::derive_sample_rate;
use crate::table::{Dataset, Property};
use crate::telemetry::log::LogManager;

pub const DISTANCE_KEY: &str = "Distance";
pub const OFFSET_KEY: &str = "Offset_cm";
pub const RATE_KEY: &str = "Rate";
pub const FIELD_AXES: [&str; 3] = ["Bx", "By", "Bz"];

#[derive(Debug, Clone, PartialEq)]
pub struct SensorRecord {
    pub dataset_id: String,
    pub distance_cm: f64,
    pub offsets_cm: [f64; 3],
    pub sample_rate_hz: f64,
    /// Per-axis field samples in tesla, ordered as [`FIELD_AXES`].
    pub axes: [Vec<f64>; 3],
}

impl SensorRecord {
    pub fn from_dataset(dataset: &Dataset, config: &AnalysisConfig) -> ScreenResult<Self> {
        let id = dataset.id();
        let distance_cm = distance(dataset)?;
        let offsets_cm = offsets(dataset)?;
        let sample_rate_hz = sample_rate(dataset, config)?;

        let mut axes: [Vec<f64>; 3] = Default::default();
        for (slot, name) in axes.iter_mut().zip(FIELD_AXES) {
            let variable = dataset.variable(name).ok_or_else(|| {
                ScreenError::DataConsistency(format!(
                    "dataset '{}': missing field variable '{}'",
                    id, name
                ))
            })?;
            let scale = tesla_per_unit(variable.unit()).ok_or_else(|| {
                ScreenError::DataConsistency(format!(
                    "dataset '{}': variable '{}' has unsupported field unit '{}'",
                    id,
                    name,
                    variable.unit()
                ))
            })?;
            let samples = variable.dense().map_err(|err| scoped(id, err))?;
            *slot = samples.into_iter().map(|v| v * scale).collect();
        }
        if axes[0].is_empty() {
            return Err(ScreenError::DataConsistency(format!(
                "dataset '{}' has no samples",
                id
            )));
        }

        LogManager::new("record").detail(&format!(
            "dataset '{}': {} cm, {:.3} Hz, {} samples",
            id,
            distance_cm,
            sample_rate_hz,
            axes[0].len()
        ));

        Ok(Self {
            dataset_id: id.to_string(),
            distance_cm,
            offsets_cm,
            sample_rate_hz,
            axes,
        })
    }

    pub fn distance_m(&self) -> f64 {
        self.distance_cm / 100.0
    }

    pub fn sample_count(&self) -> usize {
        self.axes[0].len()
    }
}

fn tesla_per_unit(unit: &str) -> Option<f64> {
    match unit {
        "nT" => Some(1e-9),
        "uT" | "µT" => Some(1e-6),
        "T" => Some(1.0),
        _ => None,
    }
}

fn scoped(id: &str, err: ScreenError) -> ScreenError {
    match err {
        ScreenError::DataConsistency(message) => {
            ScreenError::DataConsistency(format!("dataset '{}': {}", id, message))
        }
        other => other,
    }
}

fn required<'a>(dataset: &'a Dataset, name: &str) -> ScreenResult<&'a Property> {
    dataset.property(name).ok_or_else(|| {
        ScreenError::DataConsistency(format!(
            "dataset '{}': missing property '{}'",
            dataset.id(),
            name
        ))
    })
}

fn distance(dataset: &Dataset) -> ScreenResult<f64> {
    let property = required(dataset, DISTANCE_KEY)?;
    if property.unit() != Some("cm") {
        return Err(ScreenError::DataConsistency(format!(
            "dataset '{}': property '{}' must be given in [cm], found {:?}",
            dataset.id(),
            DISTANCE_KEY,
            property.values()
        )));
    }
    match property.numbers().as_deref() {
        Some([value]) if value.is_finite() && *value > 0.0 => Ok(*value),
        _ => Err(ScreenError::DataConsistency(format!(
            "dataset '{}': property '{}' must be one positive number, found {:?}",
            dataset.id(),
            DISTANCE_KEY,
            property.values()
        ))),
    }
}

fn offsets(dataset: &Dataset) -> ScreenResult<[f64; 3]> {
    let property = required(dataset, OFFSET_KEY)?;
    match property.numbers().as_deref() {
        Some(&[x, y, z]) if [x, y, z].iter().all(|v| v.is_finite()) => Ok([x, y, z]),
        _ => Err(ScreenError::DataConsistency(format!(
            "dataset '{}': property '{}' needs three per-axis offsets, found {:?}",
            dataset.id(),
            OFFSET_KEY,
            property.values()
        ))),
    }
}

fn sample_rate(dataset: &Dataset, config: &AnalysisConfig) -> ScreenResult<f64> {
    if let Some(times) = dataset.variables().iter().find(|v| v.unit() == "s") {
        let values = times.dense().map_err(|err| scoped(dataset.id(), err))?;
        return derive_sample_rate(&values, config.spacing_tolerance)
            .map_err(|err| scoped(dataset.id(), err));
    }

    let property = dataset.property(RATE_KEY).ok_or_else(|| {
        ScreenError::DataConsistency(format!(
            "dataset '{}': no '{}' property and no time variable in [s]",
            dataset.id(),
            RATE_KEY
        ))
    })?;
    let unit_ok = matches!(property.unit(), None | Some("Hz"));
    match property.numbers().as_deref() {
        Some([rate]) if unit_ok && rate.is_finite() && *rate > 0.0 => Ok(*rate),
        _ => Err(ScreenError::DataConsistency(format!(
            "dataset '{}': property '{}' must be one positive rate in [Hz], found {:?}",
            dataset.id(),
            RATE_KEY,
            property.values()
        ))),
    }
}
