//! Boundary with the acquisition layer: a stopped, finalized snapshot of
//! per-sensor captures becomes a [`Table`].

use super::model::{Dataset, Property, Table, Variable};
use crate::prelude::{ScreenError, ScreenResult};
use chrono::{DateTime, FixedOffset};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const RAW_DATA_TITLE: &str = "Magnetic Screening Test, Raw Data";
pub const TIME_VARIABLE: &str = "Offset";
pub const AXIS_VARIABLES: [&str; 3] = ["Bx", "By", "Bz"];

/// Caller-owned stop flag shared with acquisition workers.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything one stopped sensor worker collected.
#[derive(Debug, Clone)]
pub struct SensorCapture {
    pub sensor_id: String,
    pub description: String,
    pub uart: Vec<String>,
    pub port: String,
    pub distance_cm: f64,
    pub offsets_cm: [f64; 3],
    pub nominal_rate_hz: f64,
    pub start_epoch: DateTime<FixedOffset>,
    pub times: Vec<f64>,
    pub bx: Vec<f64>,
    pub by: Vec<f64>,
    pub bz: Vec<f64>,
}

impl SensorCapture {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    fn to_dataset(&self, index: usize) -> ScreenResult<Dataset> {
        let offsets = self.offsets_cm.iter().map(|v| v.to_string());
        let mut dataset = Dataset::new(index.to_string())
            .with_property(Property::new("Sensor", [self.description.as_str()]))
            .with_property(Property::new("UART", self.uart.iter().map(String::as_str)))
            .with_property(Property::new("Port", [self.port.as_str()]))
            .with_property(Property::new(
                "Distance",
                [self.distance_cm.to_string(), "[cm]".to_string()],
            ))
            .with_property(Property::new("Offset_cm", offsets))
            .with_property(Property::new(
                "Rate",
                [self.nominal_rate_hz.to_string(), "[Hz]".to_string()],
            ))
            .with_property(Property::new(
                "Epoch",
                [self.start_epoch.format("%Y-%m-%d %H:%M:%S%.3f%:z").to_string()],
            ));
        if !self.sensor_id.is_empty() {
            dataset.set_property(Property::new("SensorId", [self.sensor_id.as_str()]));
        }

        dataset.add_variable(Variable::numeric(TIME_VARIABLE, "s", &self.times))?;
        for (name, values) in AXIS_VARIABLES.iter().zip([&self.bx, &self.by, &self.bz]) {
            dataset.add_variable(Variable::numeric(*name, "nT", values))?;
        }
        Ok(dataset)
    }
}

/// A finished acquisition run handed to the analysis core.
#[derive(Debug, Clone)]
pub struct AcquisitionSession {
    pub part: String,
    pub operator: String,
    pub host: String,
    pub software_version: String,
    pub note: Option<String>,
    pub started: DateTime<FixedOffset>,
    pub sensors: Vec<SensorCapture>,
    pub cancel: CancelToken,
}

impl Table {
    /// Builds the raw-data table for a stopped session.
    pub fn from_session(session: &AcquisitionSession) -> ScreenResult<Table> {
        if session.cancel.is_cancelled() {
            return Err(ScreenError::AcquisitionBoundary(
                "acquisition interrupted, no output written".into(),
            ));
        }
        if session.sensors.is_empty() {
            return Err(ScreenError::AcquisitionBoundary(
                "no sensors delivered data".into(),
            ));
        }

        let mut builder = Table::builder()
            .title(RAW_DATA_TITLE)
            .global(Property::new("Part", [session.part.as_str()]))
            .global(Property::new(
                "Timestamp",
                [session.started.format("%Y-%m-%dT%H:%M:%S%:z").to_string()],
            ))
            .global(Property::new("User", [session.operator.as_str()]))
            .global(Property::new("Host", [session.host.to_lowercase()]))
            .global(Property::new("Version", [session.software_version.as_str()]));
        if let Some(note) = &session.note {
            builder = builder.global(Property::new("Note", [note.replace('"', "'")]));
        }

        for (index, capture) in session.sensors.iter().enumerate() {
            builder = builder.dataset(capture.to_dataset(index)?);
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn capture(distance_cm: f64, samples: usize) -> SensorCapture {
        let epoch = FixedOffset::west_opt(6 * 3600)
            .unwrap()
            .with_ymd_and_hms(2021, 12, 21, 18, 50, 39)
            .unwrap();
        SensorCapture {
            sensor_id: "0".into(),
            description: "VMR N179".into(),
            uart: vec!["0x0403".into(), "0x6015".into(), "6NYA".into()],
            port: "COM3".into(),
            distance_cm,
            offsets_cm: [1.025, 0.0, 0.475],
            nominal_rate_hz: 10.0,
            start_epoch: epoch,
            times: (0..samples).map(|i| i as f64 * 0.1).collect(),
            bx: vec![1.0; samples],
            by: vec![2.0; samples],
            bz: vec![3.0; samples],
        }
    }

    fn session(sensors: Vec<SensorCapture>) -> AcquisitionSession {
        let started = sensors
            .first()
            .map(|s| s.start_epoch)
            .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap().timestamp_opt(0, 0).unwrap());
        AcquisitionSession {
            part: "doggy".into(),
            operator: "chris".into(),
            host: "Puter".into(),
            software_version: "screener-0.3.0".into(),
            note: Some("say \"hi\"".into()),
            started,
            sensors,
            cancel: CancelToken::new(),
        }
    }

    #[test]
    fn session_becomes_table_with_domain_properties() {
        let table = Table::from_session(&session(vec![capture(9.0, 5), capture(11.0, 4)])).unwrap();
        assert_eq!(table.title(), Some(RAW_DATA_TITLE));
        assert_eq!(table.global_value("Part"), Some("doggy"));
        assert_eq!(table.global_value("Host"), Some("puter"));
        assert_eq!(table.global_value("Note"), Some("say 'hi'"));
        assert_eq!(table.global_value("Timestamp"), Some("2021-12-21T18:50:39-06:00"));

        let second = &table.datasets()[1];
        assert_eq!(second.id(), "1");
        assert_eq!(second.row_count(), 4);
        assert_eq!(second.property("Distance").unwrap().unit(), Some("cm"));
        assert_eq!(
            second.property("Offset_cm").unwrap().numbers(),
            Some(vec![1.025, 0.0, 0.475])
        );
        assert_eq!(second.variable("Offset").unwrap().unit(), "s");
    }

    #[test]
    fn cancelled_session_is_acquisition_boundary_error() {
        let session = session(vec![capture(9.0, 3)]);
        session.cancel.cancel();
        let err = Table::from_session(&session).unwrap_err();
        assert!(matches!(err, ScreenError::AcquisitionBoundary(_)));
    }

    #[test]
    fn unequal_axis_lengths_are_rejected() {
        let mut broken = capture(9.0, 3);
        broken.bz.pop();
        let err = Table::from_session(&session(vec![broken])).unwrap_err();
        assert!(matches!(err, ScreenError::DataConsistency(_)));
    }
}
