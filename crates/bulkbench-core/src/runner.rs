use std::sync::Arc;

use tracing::{error, info};

use crate::cluster::ClusterProvisioner;
use crate::error::Result;
use crate::lifecycle::{ClusterLifecycle, LifecycleSettings, run_with_cluster};
use crate::results::ResultsDb;
use crate::scenario::Scenario;
use crate::sql::SqlConnector;
use crate::types::{BenchmarkMetric, NodeRef};

/// Outcome of a passed run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub metric: BenchmarkMetric,
}

/// Drives one scenario through a full cluster lifecycle and records the run.
pub struct Runner {
    settings: LifecycleSettings,
    provisioner: Arc<dyn ClusterProvisioner>,
    connector: Arc<dyn SqlConnector>,
    results: Option<ResultsDb>,
}

impl Runner {
    pub fn new(
        settings: LifecycleSettings,
        provisioner: Arc<dyn ClusterProvisioner>,
        connector: Arc<dyn SqlConnector>,
    ) -> Self {
        Self {
            settings,
            provisioner,
            connector,
            results: None,
        }
    }

    pub fn with_results(mut self, results: ResultsDb) -> Self {
        self.results = Some(results);
        self
    }

    pub fn results(&self) -> Option<&ResultsDb> {
        self.results.as_ref()
    }

    pub async fn run(&self, scenario: &dyn Scenario, iterations: u64) -> Result<RunOutcome> {
        scenario.check_preconditions(iterations)?;

        let config = scenario.benchmark_config();
        let run_id = uuid::Uuid::now_v7().to_string();
        if let Some(db) = &self.results {
            db.create_run(&run_id, &scenario.kind().to_string(), iterations, config.nodes)?;
        }
        info!(
            "run {run_id}: {} x{iterations} on {} node(s)",
            scenario.name(),
            config.nodes
        );

        let mut lifecycle = ClusterLifecycle::new(
            config,
            self.settings.clone(),
            self.provisioner.clone(),
            self.connector.clone(),
        );
        let result = run_with_cluster(&mut lifecycle, |ready| async move {
            let db = ready.connect(NodeRef::BOOTSTRAP).await?;
            let metric = scenario.run(&ready, db.as_ref(), iterations).await;
            db.close().await;
            metric
        })
        .await;

        match result {
            Ok(metric) => {
                if let Some(db) = &self.results {
                    db.complete_run(&run_id, &metric)?;
                }
                info!("run {run_id} passed: {metric}");
                Ok(RunOutcome { run_id, metric })
            }
            Err(e) => {
                error!("run {run_id} failed: {e}");
                if let Some(db) = &self.results {
                    if let Err(record_err) = db.fail_run(&run_id, &e.to_string()) {
                        error!("cannot record failure of run {run_id}: {record_err}");
                    }
                }
                Err(e)
            }
        }
    }
}
