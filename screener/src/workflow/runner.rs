use crate::workflow::config::WorkflowConfig;
use anyhow::Context;
use log::info;
use screencore::ledger::{LedgerEntry, ResultsLedger};
use screencore::processing::{ScreeningPipeline, ScreeningReport};
use screencore::table::{self, Table};
use std::path::Path;

pub struct RunOutcome {
    pub table: Table,
    pub report: ScreeningReport,
    pub ledgered: bool,
}

#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn execute<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<RunOutcome> {
        let path = path.as_ref();
        let table = table::read_table(path)
            .with_context(|| format!("reading recording {}", path.display()))?;
        self.analyze(table, &path.display().to_string())
    }

    pub fn analyze_text(&self, text: &str, label: &str) -> anyhow::Result<RunOutcome> {
        let table =
            table::parse_str(text, label).with_context(|| format!("parsing recording {}", label))?;
        self.analyze(table, label)
    }

    /// The ledger is only touched once the fit and verdict exist.
    fn analyze(&self, table: Table, label: &str) -> anyhow::Result<RunOutcome> {
        let report = ScreeningPipeline::new(self.config.analysis.clone())
            .run(&table)
            .with_context(|| format!("analysing {}", label))?;

        let ledgered = match &self.config.ledger {
            Some(path) => {
                let entry = LedgerEntry::from_run(&table, &report.fit)
                    .with_context(|| format!("building ledger row for {}", label))?;
                ResultsLedger::new(path)
                    .append(&entry)
                    .with_context(|| format!("appending to ledger {}", path.display()))?;
                true
            }
            None => false,
        };
        info!(
            "{}: moment {:.3e} N m/T -> {}",
            label, report.fit.moment, report.fit.classification
        );

        Ok(RunOutcome {
            table,
            report,
            ledgered,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::profile::{build_session, SynthConfig};
    use screencore::processing::Classification;

    fn recording(moment: f64) -> String {
        let config = SynthConfig {
            moment,
            ..SynthConfig::default()
        };
        let session = build_session(&config, "screener-test", None).unwrap();
        let table = Table::from_session(&session).unwrap();
        table::to_string(&table).unwrap()
    }

    #[test]
    fn runner_analyses_synthetic_recording() {
        let runner = Runner::new(WorkflowConfig::default());
        let outcome = runner.analyze_text(&recording(0.02), "synthetic").unwrap();
        assert_eq!(outcome.report.fit.classification, Classification::Pass);
        assert_eq!(outcome.table.datasets().len(), 3);
        assert!(!outcome.ledgered);
    }

    #[test]
    fn runner_appends_ledger_only_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = dir.path().join("ledger.csv");
        let runner = Runner::new(WorkflowConfig::from_args(Some(ledger.clone()), None, None));

        assert!(runner.analyze_text("G,Title,Empty\n", "empty").is_err());
        assert!(!ledger.exists());

        let outcome = runner.analyze_text(&recording(0.09), "magnetic").unwrap();
        assert!(outcome.ledgered);
        let text = std::fs::read_to_string(&ledger).unwrap();
        assert!(text.trim_end().ends_with("\"FAIL\""));
    }

    #[test]
    fn runner_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.csv");
        std::fs::write(&path, recording(0.03)).unwrap();
        let outcome = Runner::new(WorkflowConfig::default()).execute(&path).unwrap();
        assert_eq!(outcome.table.global_value("Part"), Some("SYNTH-001"));
    }
}
