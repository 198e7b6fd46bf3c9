//! Benchmark bodies. Each scenario declares the cluster it needs, checks its
//! preconditions before anything is provisioned, and times exactly one bulk
//! statement once the cluster is ready.

pub mod backup_fixed;
pub mod restore_fixed;
pub mod restore_synthetic;

pub use backup_fixed::BackupFixed;
pub use restore_fixed::RestoreFixed;
pub use restore_synthetic::RestoreSynthetic;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;

use crate::config::HarnessConfig;
use crate::config::credentials::AzureCredentials;
use crate::error::{HarnessError, Result};
use crate::lifecycle::ReadyCluster;
use crate::sql::SqlEndpoint;
use crate::types::{BenchmarkConfig, BenchmarkMetric};

/// Disk size shared by every shipped scenario.
pub const DISK_SIZE_GB: u32 = 250;

#[async_trait]
pub trait Scenario: Send + Sync {
    /// Benchmark name, also the first path segment of archive URIs.
    fn name(&self) -> &'static str;

    fn kind(&self) -> ScenarioKind;

    /// Cluster shape this scenario runs against.
    fn benchmark_config(&self) -> BenchmarkConfig;

    /// Checked before any provisioning happens.
    fn check_preconditions(&self, iterations: u64) -> Result<()>;

    /// Run the body against a ready cluster through `db` (a connection to node 0).
    async fn run(
        &self,
        cluster: &ReadyCluster,
        db: &dyn SqlEndpoint,
        iterations: u64,
    ) -> Result<BenchmarkMetric>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioKind {
    RestoreSynthetic,
    RestoreFixed,
    BackupFixed,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 3] = [
        ScenarioKind::RestoreSynthetic,
        ScenarioKind::RestoreFixed,
        ScenarioKind::BackupFixed,
    ];

    pub fn description(self) -> &'static str {
        match self {
            ScenarioKind::RestoreSynthetic => {
                "load N synthetic rows, back them up, time restoring them into a new database"
            }
            ScenarioKind::RestoreFixed => "time restoring a fixed large backup (iterations must be 1)",
            ScenarioKind::BackupFixed => {
                "seed nodes from archived stores, time a full backup (iterations must be 1)"
            }
        }
    }

    /// Instantiate the scenario from the harness configuration.
    pub fn build(
        self,
        config: &HarnessConfig,
        azure: Option<AzureCredentials>,
    ) -> Result<Box<dyn Scenario>> {
        Ok(match self {
            ScenarioKind::RestoreSynthetic => {
                Box::new(RestoreSynthetic::from_config(config, azure))
            }
            ScenarioKind::RestoreFixed => Box::new(RestoreFixed::from_config(config)),
            ScenarioKind::BackupFixed => Box::new(BackupFixed::from_config(config)?),
        })
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioKind::RestoreSynthetic => write!(f, "restore-synthetic"),
            ScenarioKind::RestoreFixed => write!(f, "restore-fixed"),
            ScenarioKind::BackupFixed => write!(f, "backup-fixed"),
        }
    }
}

impl FromStr for ScenarioKind {
    type Err = HarnessError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "restore-synthetic" => Ok(ScenarioKind::RestoreSynthetic),
            "restore-fixed" => Ok(ScenarioKind::RestoreFixed),
            "backup-fixed" => Ok(ScenarioKind::BackupFixed),
            _ => Err(HarnessError::InvalidScenario(s.to_string())),
        }
    }
}

/// Fixed-dataset scenarios measure a single pass over the whole dataset.
pub(crate) fn require_single_iteration(name: &str, iterations: u64) -> Result<()> {
    if iterations != 1 {
        return Err(HarnessError::Precondition(format!(
            "{name} must be run with exactly 1 iteration, got {iterations}"
        )));
    }
    Ok(())
}
