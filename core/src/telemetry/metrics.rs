use serde::Serialize;
use std::sync::Mutex;

/// Counters for analysis runs shared across request handlers.
pub struct MetricsRecorder {
    inner: Mutex<MetricsSnapshot>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub runs_analyzed: usize,
    pub runs_failed: usize,
    pub ledger_rows: usize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsSnapshot::default()),
        }
    }

    pub fn record_run(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.runs_analyzed += 1;
        }
    }

    pub fn record_failure(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.runs_failed += 1;
        }
    }

    pub fn record_ledger_row(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.ledger_rows += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().map(|m| *m).unwrap_or_default()
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = MetricsRecorder::new();
        metrics.record_run();
        metrics.record_run();
        metrics.record_failure();
        metrics.record_ledger_row();
        assert_eq!(
            metrics.snapshot(),
            MetricsSnapshot {
                runs_analyzed: 2,
                runs_failed: 1,
                ledger_rows: 1
            }
        );
    }
}
