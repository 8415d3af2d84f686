use anyhow::Context;
use screencore::AnalysisConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9000))
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkflowConfig {
    pub analysis: AnalysisConfig,
    /// Ledger appended after every successful run; no ledger when unset.
    pub ledger: Option<PathBuf>,
    pub software_version: String,
    pub bind_address: SocketAddr,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            analysis: AnalysisConfig::default(),
            ledger: None,
            software_version: format!("screener-{}", env!("CARGO_PKG_VERSION")),
            bind_address: default_bind_address(),
        }
    }
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(
        ledger: Option<PathBuf>,
        limit: Option<f64>,
        bind_address: Option<SocketAddr>,
    ) -> Self {
        Self::default().with_overrides(ledger, limit, bind_address)
    }

    /// Command-line values win over whatever the YAML file set.
    pub fn with_overrides(
        mut self,
        ledger: Option<PathBuf>,
        limit: Option<f64>,
        bind_address: Option<SocketAddr>,
    ) -> Self {
        if ledger.is_some() {
            self.ledger = ledger;
        }
        if let Some(limit) = limit {
            self.analysis.limit = limit;
        }
        if let Some(address) = bind_address {
            self.bind_address = address;
        }
        self
    }
}
