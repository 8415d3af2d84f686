use screencore::processing::ScreeningReport;
use screencore::table::Table;
use screencore::telemetry::MetricsSnapshot;
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DatasetSummary {
    pub id: String,
    pub distance: Vec<String>,
    pub rows: usize,
    pub variables: Vec<String>,
}

/// What the plotting layer reads: the table outline and the last report.
#[derive(Debug, Clone, Serialize, Default)]
pub struct ReportModel {
    pub title: Option<String>,
    pub part: Option<String>,
    pub datasets: Vec<DatasetSummary>,
    pub report: Option<ScreeningReport>,
    pub status: String,
    pub metrics: MetricsSnapshot,
}

impl ReportModel {
    pub fn from_run(table: &Table, report: &ScreeningReport, metrics: MetricsSnapshot) -> Self {
        let datasets = table
            .datasets()
            .iter()
            .map(|dataset| DatasetSummary {
                id: dataset.id().to_string(),
                distance: dataset
                    .property("Distance")
                    .map(|p| p.values().to_vec())
                    .unwrap_or_default(),
                rows: dataset.row_count(),
                variables: dataset.variables().iter().map(|v| v.header_label()).collect(),
            })
            .collect();
        Self {
            title: table.title().map(str::to_string),
            part: table.global_value("Part").map(str::to_string),
            datasets,
            report: Some(report.clone()),
            status: report.fit.classification.label().to_string(),
            metrics,
        }
    }
}
