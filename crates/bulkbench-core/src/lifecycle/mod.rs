//! Cluster lifecycle: provisioning, optional store seeding, convergence and
//! guaranteed teardown.
//!
//! `start` walks the stages strictly in order and fails on the first error:
//!
//! 1. acquire a cluster handle for the config's prefix
//! 2. configure flags and per-node variables
//! 3. resize to the requested node count
//! 4. when a store archive is set: stop every node, download every node's
//!    store in parallel, restart every node one by one
//! 5. wait, bounded, for every node to see every peer through gossip
//! 6. assert cluster health
//! 7. run the setup statements against node 0
//!
//! `close` is always run by [`run_with_cluster`], including when `start` or
//! the benchmark body failed or panicked.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{error, info};

use crate::cluster::{Cluster, ClusterProvisioner, ClusterSettings};
use crate::error::{HarnessError, ProvisionStage, Result, SeedStage};
use crate::fanout::fan_out;
use crate::sql::{SqlConnector, SqlEndpoint};
use crate::types::{BenchmarkConfig, NodeRef};

pub type PanicPayload = Box<dyn Any + Send + 'static>;

/// Knobs of the lifecycle that are not part of a benchmark's cluster shape.
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub flags: Vec<String>,
    pub convergence_timeout: Duration,
    pub poll_interval: Duration,
    pub data_dir: String,
    pub copy_command: String,
    pub setup_statements: Vec<String>,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            flags: vec!["--max-offset=1s".to_string()],
            convergence_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(1),
            data_dir: "/mnt/data0".to_string(),
            copy_command: r#"gsutil -m cp -r "{store_url}/node{node}/*" "{data_dir}""#.to_string(),
            setup_statements: vec!["SET CLUSTER SETTING enterprise.enabled = true".to_string()],
        }
    }
}

/// Render the per-node store download command.
pub fn render_copy_command(template: &str, store_url: &str, node: NodeRef, data_dir: &str) -> String {
    template
        .replace("{store_url}", store_url.trim_end_matches('/'))
        .replace("{node}", &node.index().to_string())
        .replace("{data_dir}", data_dir)
}

/// A cluster that made it through every start stage.
#[derive(Clone)]
pub struct ReadyCluster {
    cluster: Arc<dyn Cluster>,
    connector: Arc<dyn SqlConnector>,
    nodes: usize,
}

impl fmt::Debug for ReadyCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadyCluster")
            .field("cluster", &self.cluster.name())
            .field("nodes", &self.nodes)
            .finish()
    }
}

impl ReadyCluster {
    pub fn cluster(&self) -> &Arc<dyn Cluster> {
        &self.cluster
    }

    pub fn nodes(&self) -> usize {
        self.nodes
    }

    pub fn pg_url(&self, node: NodeRef) -> String {
        self.cluster.pg_url(node)
    }

    /// Open an SQL connection to `node`.
    pub async fn connect(&self, node: NodeRef) -> Result<Box<dyn SqlEndpoint>> {
        let url = self.cluster.pg_url(node);
        self.connector
            .connect(&url)
            .await
            .map_err(|source| HarnessError::Connect { url, source })
    }
}

/// What `close` did.
#[derive(Debug)]
pub struct CloseReport {
    /// Message of a panic recovered from the benchmark body.
    pub recovered_panic: Option<String>,
    /// Whether a destroy was issued.
    pub destroyed: bool,
    pub teardown: Result<()>,
}

pub struct ClusterLifecycle {
    config: BenchmarkConfig,
    settings: LifecycleSettings,
    provisioner: Arc<dyn ClusterProvisioner>,
    connector: Arc<dyn SqlConnector>,
    cluster: Option<Arc<dyn Cluster>>,
    ready: bool,
}

impl ClusterLifecycle {
    pub fn new(
        config: BenchmarkConfig,
        settings: LifecycleSettings,
        provisioner: Arc<dyn ClusterProvisioner>,
        connector: Arc<dyn SqlConnector>,
    ) -> Self {
        Self {
            config,
            settings,
            provisioner,
            connector,
            cluster: None,
            ready: false,
        }
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    /// The cluster handle, once acquired and until closed.
    pub fn cluster(&self) -> Option<&Arc<dyn Cluster>> {
        self.cluster.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Cluster flags and provisioner variables derived from the config.
    pub fn cluster_settings(&self) -> ClusterSettings {
        let mut settings = ClusterSettings {
            flags: self.settings.flags.clone(),
            ..Default::default()
        };
        settings
            .vars
            .insert("join_all".to_string(), self.config.join_all.to_string());
        if self.config.disk_size_gb != 0 {
            settings.vars.insert(
                "cockroach_disk_size".to_string(),
                self.config.disk_size_gb.to_string(),
            );
        }
        settings
    }

    /// Bring the cluster up. On error the handle (if any) stays populated so
    /// `close` can destroy what was created.
    pub async fn start(&mut self) -> Result<ReadyCluster> {
        self.config.validate()?;
        if self.cluster.is_some() {
            return Err(HarnessError::Config(format!(
                "cluster {} already started",
                self.config.prefix
            )));
        }

        let cluster = self
            .provisioner
            .acquire(&self.config.prefix)
            .await
            .map_err(|e| HarnessError::provisioning(ProvisionStage::Acquire, e))?;
        self.cluster = Some(cluster.clone());

        cluster
            .configure(&self.cluster_settings())
            .await
            .map_err(|e| HarnessError::provisioning(ProvisionStage::Configure, e))?;

        info!("creating cluster with {} node(s)", self.config.nodes);
        cluster
            .resize(self.config.nodes)
            .await
            .map_err(|e| HarnessError::provisioning(ProvisionStage::Resize, e))?;

        if let Some(store_url) = self.config.seed_source() {
            self.seed(&cluster, store_url).await?;
        }

        self.wait_for_convergence(cluster.as_ref()).await?;

        cluster
            .assert_healthy()
            .await
            .map_err(|e| HarnessError::provisioning(ProvisionStage::Assert, e))?;

        let ready = ReadyCluster {
            cluster,
            connector: self.connector.clone(),
            nodes: self.config.nodes,
        };
        self.run_setup(&ready).await?;

        self.ready = true;
        info!("initial cluster is up");
        Ok(ready)
    }

    async fn seed(&self, cluster: &Arc<dyn Cluster>, store_url: &str) -> Result<()> {
        let nodes = cluster.num_nodes();

        // Downloads write into the data directory, so no process may hold it open.
        info!("stopping cluster");
        for node in NodeRef::all(nodes) {
            cluster.kill(node).await.map_err(|source| HarnessError::Seeding {
                stage: SeedStage::Stop,
                node,
                source,
            })?;
        }

        info!("downloading archived stores in parallel");
        let report = fan_out(nodes, |node| {
            let cluster = cluster.clone();
            let data_dir = cluster
                .data_dir(node)
                .unwrap_or_else(|| self.settings.data_dir.clone());
            let cmd = render_copy_command(&self.settings.copy_command, store_url, node, &data_dir);
            async move {
                info!("exec on {node}: {cmd}");
                cluster.exec(node, &cmd).await
            }
        })
        .await;
        report
            .into_result()
            .map_err(|(node, source)| HarnessError::Seeding {
                stage: SeedStage::Download,
                node,
                source,
            })?;

        info!("restarting cluster with archived store(s)");
        for node in NodeRef::all(nodes) {
            cluster
                .restart(node)
                .await
                .map_err(|source| HarnessError::Seeding {
                    stage: SeedStage::Restart,
                    node,
                    source,
                })?;
        }
        Ok(())
    }

    async fn wait_for_convergence(&self, cluster: &dyn Cluster) -> Result<()> {
        let expected = self.config.nodes;
        let timeout = self.settings.convergence_timeout;
        info!("waiting up to {timeout:?} for {expected} gossip peer(s)");
        match tokio::time::timeout(
            timeout,
            cluster.wait_for_peers(expected, self.settings.poll_interval),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(HarnessError::provisioning(ProvisionStage::Convergence, e)),
            Err(_) => Err(HarnessError::ConvergenceTimeout { expected, timeout }),
        }
    }

    async fn run_setup(&self, ready: &ReadyCluster) -> Result<()> {
        if self.settings.setup_statements.is_empty() {
            return Ok(());
        }
        let db = ready.connect(NodeRef::BOOTSTRAP).await?;
        let mut result = Ok(());
        for stmt in &self.settings.setup_statements {
            if let Err(e) = db.execute(stmt, &[]).await {
                result = Err(HarnessError::sql(stmt, e));
                break;
            }
        }
        db.close().await;
        result
    }

    /// Tear the cluster down. Never skipped because of a panic, and a second
    /// call does nothing.
    pub async fn close(&mut self, panic: Option<PanicPayload>) -> CloseReport {
        let recovered_panic = panic.map(|payload| {
            let msg = panic_message(payload.as_ref());
            error!("recovered from panic to destroy cluster: {msg}");
            msg
        });

        let mut report = CloseReport {
            recovered_panic,
            destroyed: false,
            teardown: Ok(()),
        };

        self.ready = false;
        if let Some(cluster) = self.cluster.take() {
            info!("shutting down cluster {}", cluster.name());
            report.destroyed = true;
            if let Err(e) = cluster.destroy().await {
                error!("destroying cluster {} failed: {e:#}", cluster.name());
                report.teardown = Err(HarnessError::Teardown(e));
            }
        }
        report
    }
}

impl Drop for ClusterLifecycle {
    fn drop(&mut self) {
        if let Some(cluster) = &self.cluster {
            error!(
                "cluster {} dropped without being closed, its resources may leak",
                cluster.name()
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Start the cluster, run `body` against it, and close it on every exit path.
///
/// A panic in `start` or `body` is caught, reported as
/// [`HarnessError::Panicked`] and never resumed. An error from `start` or
/// `body` wins over a teardown error, which is then only logged.
pub async fn run_with_cluster<T, F, Fut>(lifecycle: &mut ClusterLifecycle, body: F) -> Result<T>
where
    F: FnOnce(ReadyCluster) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let outcome = AssertUnwindSafe(async {
        match lifecycle.start().await {
            Ok(ready) => body(ready).await,
            Err(e) => Err(e),
        }
    })
    .catch_unwind()
    .await;

    let (result, panic) = match outcome {
        Ok(result) => (Some(result), None),
        Err(payload) => (None, Some(payload)),
    };

    let report = lifecycle.close(panic).await;

    match (result, report.recovered_panic) {
        (Some(Ok(value)), _) => report.teardown.map(|()| value),
        (Some(Err(e)), _) => {
            if let Err(teardown) = report.teardown {
                error!("teardown also failed after earlier error: {teardown}");
            }
            Err(e)
        }
        (None, msg) => {
            if let Err(teardown) = report.teardown {
                error!("teardown also failed after panic: {teardown}");
            }
            Err(HarnessError::Panicked(
                msg.unwrap_or_else(|| "unknown panic".to_string()),
            ))
        }
    }
}
