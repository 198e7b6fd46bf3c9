use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;
use url::Url;

use super::{DISK_SIZE_GB, Scenario, ScenarioKind, require_single_iteration};
use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};
use crate::lifecycle::ReadyCluster;
use crate::sql::{SqlEndpoint, SqlValue, reported_data_size};
use crate::types::{BenchmarkConfig, BenchmarkMetric, format_bytes};
use crate::uri::{parse_base, run_uri};

pub const NAME: &str = "BenchmarkBackup2TB";
pub const NODES: usize = 10;
pub const PREFIX: &str = "backup2tb";

/// Backs up the `datablocks` database of a cluster seeded from archived stores.
pub struct BackupFixed {
    store_url: String,
    backup_base: Url,
}

impl BackupFixed {
    pub fn new(store_url: &str, backup_base: &str) -> Result<Self> {
        Ok(Self {
            store_url: store_url.to_string(),
            backup_base: parse_base(backup_base)?,
        })
    }

    pub fn from_config(config: &HarnessConfig) -> Result<Self> {
        Self::new(
            &config.archives.bulk_store_url,
            &config.archives.backup_base_uri,
        )
    }
}

#[async_trait]
impl Scenario for BackupFixed {
    fn name(&self) -> &'static str {
        NAME
    }

    fn kind(&self) -> ScenarioKind {
        ScenarioKind::BackupFixed
    }

    fn benchmark_config(&self) -> BenchmarkConfig {
        BenchmarkConfig::new(NODES, PREFIX)
            .with_disk_size_gb(DISK_SIZE_GB)
            .with_store_url(&self.store_url)
            .with_join_all(true)
    }

    fn check_preconditions(&self, iterations: u64) -> Result<()> {
        require_single_iteration(NAME, iterations)?;
        if self.store_url.is_empty() {
            return Err(HarnessError::Precondition(
                "archives.bulk_store_url is not set".to_string(),
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
        let dest = run_uri(&self.backup_base, NAME, Utc::now(), iterations);
        info!("backing up to {dest} from {} node(s)", cluster.nodes());

        let backup = "BACKUP DATABASE datablocks TO $1";
        let params = [SqlValue::from(dest.as_str())];
        let started = Instant::now();
        let row = db.query_row(backup, &params).await;
        let elapsed = started.elapsed();
        let row = row.map_err(|e| HarnessError::sql(backup, e))?;

        let bytes = reported_data_size(&row).map_err(|e| HarnessError::sql(backup, e))?;
        let metric = BenchmarkMetric {
            bytes,
            iterations,
            elapsed,
        };
        info!("backed up {}: {metric}", format_bytes(bytes));
        Ok(metric)
    }
}
