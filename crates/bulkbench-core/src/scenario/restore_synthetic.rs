use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use super::{DISK_SIZE_GB, Scenario, ScenarioKind};
use crate::config::HarnessConfig;
use crate::config::credentials::AzureCredentials;
use crate::error::{HarnessError, Result};
use crate::lifecycle::ReadyCluster;
use crate::sql::{ImportScript, SqlEndpoint, SqlValue, quote_ident, reported_data_size};
use crate::types::{BenchmarkConfig, BenchmarkMetric, format_bytes};
use crate::uri::run_uri;

pub const NAME: &str = "BenchmarkRestoreBig";
pub const NODES: usize = 3;
pub const PREFIX: &str = "restore";

const SOURCE_DB: &str = "bench";
const BANK_TABLE: &str = "bench.bank";

/// Restores N synthetic bank rows from an Azure backup into a fresh database.
pub struct RestoreSynthetic {
    azure: Option<AzureCredentials>,
    payload_size: usize,
    batch_rows: usize,
    rng_seed: Option<u64>,
}

impl RestoreSynthetic {
    pub fn new(azure: Option<AzureCredentials>) -> Self {
        Self {
            azure,
            payload_size: 100,
            batch_rows: 500,
            rng_seed: None,
        }
    }

    pub fn from_config(config: &HarnessConfig, azure: Option<AzureCredentials>) -> Self {
        Self {
            azure,
            payload_size: config.harness.payload_size,
            batch_rows: config.harness.insert_batch_rows,
            rng_seed: config.harness.rng_seed,
        }
    }

    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn with_batch_rows(mut self, rows: usize) -> Self {
        self.batch_rows = rows.max(1);
        self
    }

    fn credentials(&self) -> Result<&AzureCredentials> {
        self.azure.as_ref().ok_or_else(missing_credentials)
    }

    /// `CREATE TABLE` plus `rows` bank rows of `(id, 0, <random payload>)`.
    pub fn bank_script(&self, rows: u64) -> Result<ImportScript> {
        let mut rng = match self.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut script = ImportScript::new();
        script.push(
            format!(
                "CREATE TABLE {BANK_TABLE} (id INT PRIMARY KEY, balance INT, payload STRING, FAMILY (id, balance, payload))"
            ),
            vec![],
        );

        let mut batch = Vec::with_capacity(self.batch_rows);
        for id in 0..rows {
            let payload: String = (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(self.payload_size)
                .map(char::from)
                .collect();
            let id = i64::try_from(id)
                .map_err(|_| HarnessError::Precondition(format!("too many rows: {rows}")))?;
            batch.push(vec![SqlValue::Int(id), SqlValue::Int(0), SqlValue::Text(payload)]);
            if batch.len() == self.batch_rows {
                script.push_insert(BANK_TABLE, std::mem::take(&mut batch))?;
            }
        }
        script.push_insert(BANK_TABLE, batch)?;
        Ok(script)
    }
}

fn missing_credentials() -> HarnessError {
    HarnessError::MissingCredentials(vec![
        crate::config::credentials::AZURE_CONTAINER_VAR.to_string(),
        crate::config::credentials::AZURE_ACCOUNT_NAME_VAR.to_string(),
        crate::config::credentials::AZURE_ACCOUNT_KEY_VAR.to_string(),
    ])
}

#[async_trait]
impl Scenario for RestoreSynthetic {
    fn name(&self) -> &'static str {
        NAME
    }

    fn kind(&self) -> ScenarioKind {
        ScenarioKind::RestoreSynthetic
    }

    fn benchmark_config(&self) -> BenchmarkConfig {
        BenchmarkConfig::new(NODES, PREFIX).with_disk_size_gb(DISK_SIZE_GB)
    }

    fn check_preconditions(&self, iterations: u64) -> Result<()> {
        self.credentials()?;
        if iterations == 0 {
            return Err(HarnessError::Precondition(format!(
                "{NAME} needs at least 1 iteration"
            )));
        }
        Ok(())
    }

    async fn run(
        &self,
        cluster: &ReadyCluster,
        db: &dyn SqlEndpoint,
        iterations: u64,
    ) -> Result<BenchmarkMetric> {
        let base = self.credentials()?.base_uri()?;

        let create_source = format!("CREATE DATABASE {SOURCE_DB}");
        db.execute(&create_source, &[])
            .await
            .map_err(|e| HarnessError::sql(&create_source, e))?;

        info!("loading {iterations} row(s) into {BANK_TABLE}");
        self.bank_script(iterations)?.apply(db).await?;

        let backup_uri = run_uri(&base, NAME, Utc::now(), iterations);
        let backup = "BACKUP DATABASE bench TO $1";
        let row = db
            .query_row(backup, &[SqlValue::from(backup_uri.as_str())])
            .await
            .map_err(|e| HarnessError::sql(backup, e))?;
        let data_size = reported_data_size(&row).map_err(|e| HarnessError::sql(backup, e))?;

        let target = format!("bank{iterations}");
        let create_target = format!("CREATE DATABASE {}", quote_ident(&target));
        db.execute(&create_target, &[])
            .await
            .map_err(|e| HarnessError::sql(&create_target, e))?;

        let restore = "RESTORE TABLE bench.* FROM $1 WITH into_db = $2";
        let params = [SqlValue::from(backup_uri.as_str()), SqlValue::from(target)];
        let started = Instant::now();
        let result = db.execute(restore, &params).await;
        let elapsed = started.elapsed();
        result.map_err(|e| HarnessError::sql(restore, e))?;

        let metric = BenchmarkMetric {
            bytes: data_size,
            iterations,
            elapsed,
        };
        info!(
            "restored {} on {} node(s): {metric}",
            format_bytes(data_size),
            cluster.nodes()
        );
        Ok(metric)
    }
}
