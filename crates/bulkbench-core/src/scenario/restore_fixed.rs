use std::time::Instant;

use async_trait::async_trait;
use tracing::info;

use super::{DISK_SIZE_GB, Scenario, ScenarioKind, require_single_iteration};
use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};
use crate::lifecycle::ReadyCluster;
use crate::sql::{SqlEndpoint, SqlValue, reported_data_size};
use crate::types::{BenchmarkConfig, BenchmarkMetric, format_bytes};

pub const NAME: &str = "BenchmarkRestore2TB";
pub const NODES: usize = 15;
pub const PREFIX: &str = "restore2tb";

/// Restores a fixed, pre-built backup of the `datablocks` database.
pub struct RestoreFixed {
    backup_uri: String,
}

impl RestoreFixed {
    pub fn new(backup_uri: &str) -> Self {
        Self {
            backup_uri: backup_uri.to_string(),
        }
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(&config.archives.restore_fixed_uri)
    }
}

#[async_trait]
impl Scenario for RestoreFixed {
    fn name(&self) -> &'static str {
        NAME
    }

    fn kind(&self) -> ScenarioKind {
        ScenarioKind::RestoreFixed
    }

    fn benchmark_config(&self) -> BenchmarkConfig {
        BenchmarkConfig::new(NODES, PREFIX).with_disk_size_gb(DISK_SIZE_GB)
    }

    fn check_preconditions(&self, iterations: u64) -> Result<()> {
        require_single_iteration(NAME, iterations)?;
        if self.backup_uri.is_empty() {
            return Err(HarnessError::Precondition(
                "archives.restore_fixed_uri is not set".to_string(),
            ));
        }
        Ok(())
    }

    async fn run(
        &self,
        cluster: &ReadyCluster,
        db: &dyn SqlEndpoint,
        iterations: u64,
    ) -> Result<BenchmarkMetric> {
        let create = "CREATE DATABASE datablocks";
        db.execute(create, &[])
            .await
            .map_err(|e| HarnessError::sql(create, e))?;

        info!("restoring {} on {} node(s)", self.backup_uri, cluster.nodes());
        let restore = "RESTORE datablocks.* FROM $1";
        let params = [SqlValue::from(self.backup_uri.as_str())];
        let started = Instant::now();
        let row = db.query_row(restore, &params).await;
        let elapsed = started.elapsed();
        let row = row.map_err(|e| HarnessError::sql(restore, e))?;

        let bytes = reported_data_size(&row).map_err(|e| HarnessError::sql(restore, e))?;
        let metric = BenchmarkMetric {
            bytes,
            iterations,
            elapsed,
        };
        info!("restored {}: {metric}", format_bytes(bytes));
        Ok(metric)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_shape() {
        let config = RestoreFixed::new("gs://cockroach-test/2t-backup").benchmark_config();
        assert_eq!(config.nodes, 15);
        assert_eq!(config.prefix, "restore2tb");
        assert_eq!(config.disk_size_gb, 250);
        assert_eq!(config.seed_source(), None);
    }

    #[test]
    fn only_one_iteration() {
        let scenario = RestoreFixed::new("gs://cockroach-test/2t-backup");
        assert!(scenario.check_preconditions(1).is_ok());
        assert!(matches!(
            scenario.check_preconditions(5),
            Err(HarnessError::Precondition(_))
        ));
    }

    #[test]
    fn empty_uri_rejected() {
        assert!(RestoreFixed::new("").check_preconditions(1).is_err());
    }
}
