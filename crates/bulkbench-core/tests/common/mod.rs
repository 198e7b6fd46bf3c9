//! Recording in-memory collaborators shared by the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bulkbench_core::cluster::{Cluster, ClusterProvisioner, ClusterSettings};
use bulkbench_core::lifecycle::LifecycleSettings;
use bulkbench_core::sql::{SqlConnector, SqlEndpoint, SqlValue};
use bulkbench_core::types::NodeRef;

/// Ordered record of every collaborator call.
#[derive(Default)]
pub struct CallLog {
    calls: Mutex<Vec<String>>,
    statements: Mutex<Vec<(String, Vec<SqlValue>)>>,
    settings: Mutex<Option<ClusterSettings>>,
    execs_finished: AtomicUsize,
}

impl CallLog {
    pub fn push(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn position(&self, call: &str) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }

    pub fn statements(&self) -> Vec<(String, Vec<SqlValue>)> {
        self.statements.lock().unwrap().clone()
    }

    pub fn statement(&self, prefix: &str) -> Option<(String, Vec<SqlValue>)> {
        self.statements().into_iter().find(|(sql, _)| sql.starts_with(prefix))
    }

    pub fn settings(&self) -> Option<ClusterSettings> {
        self.settings.lock().unwrap().clone()
    }

    pub fn execs_finished(&self) -> usize {
        self.execs_finished.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Behavior {
    pub fail_acquire: bool,
    pub fail_resize: bool,
    pub fail_exec_on: Option<usize>,
    pub fail_kill_on: Option<usize>,
    pub fail_restart_on: Option<usize>,
    /// Report `/stores/node<i>` as the data directory of node i.
    pub per_node_data_dir: bool,
    pub never_converge: bool,
    pub fail_destroy: bool,
}

pub struct MockCluster {
    log: Arc<CallLog>,
    behavior: Behavior,
    nodes: AtomicUsize,
}

#[async_trait]
impl Cluster for MockCluster {
    async fn configure(&self, settings: &ClusterSettings) -> anyhow::Result<()> {
        self.log.push("configure");
        *self.log.settings.lock().unwrap() = Some(settings.clone());
        Ok(())
    }

    async fn resize(&self, nodes: usize) -> anyhow::Result<()> {
        self.log.push(format!("resize {nodes}"));
        if self.behavior.fail_resize {
            anyhow::bail!("quota exceeded");
        }
        self.nodes.store(nodes, Ordering::SeqCst);
        Ok(())
    }

    fn num_nodes(&self) -> usize {
        self.nodes.load(Ordering::SeqCst)
    }

    async fn kill(&self, node: NodeRef) -> anyhow::Result<()> {
        self.log.push(format!("kill {node}"));
        if self.behavior.fail_kill_on == Some(node.index()) {
            anyhow::bail!("process did not exit");
        }
        Ok(())
    }

    async fn restart(&self, node: NodeRef) -> anyhow::Result<()> {
        self.log.push(format!("restart {node}"));
        if self.behavior.fail_restart_on == Some(node.index()) {
            anyhow::bail!("process exited during startup");
        }
        Ok(())
    }

    async fn exec(&self, node: NodeRef, cmd: &str) -> anyhow::Result<()> {
        self.log.push(format!("exec {node} {cmd}"));
        let result = if self.behavior.fail_exec_on == Some(node.index()) {
            Err(anyhow::anyhow!("copy failed"))
        } else {
            // Healthy nodes finish after the failing one.
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(())
        };
        self.log.execs_finished.fetch_add(1, Ordering::SeqCst);
        result
    }

    fn data_dir(&self, node: NodeRef) -> Option<String> {
        self.behavior
            .per_node_data_dir
            .then(|| format!("/stores/{node}"))
    }

    fn pg_url(&self, node: NodeRef) -> String {
        format!("postgresql://root@{node}:26257?sslmode=disable")
    }

    async fn peer_counts(&self) -> anyhow::Result<Vec<usize>> {
        let n = self.num_nodes();
        if self.behavior.never_converge {
            return Ok(vec![1; n]);
        }
        Ok(vec![n; n])
    }

    async fn wait_for_peers(&self, expected: usize, poll: Duration) -> anyhow::Result<()> {
        self.log.push(format!("wait_for_peers {expected}"));
        loop {
            let counts = self.peer_counts().await?;
            if counts.len() == expected && counts.iter().all(|&c| c == expected) {
                return Ok(());
            }
            tokio::time::sleep(poll).await;
        }
    }

    async fn assert_healthy(&self) -> anyhow::Result<()> {
        self.log.push("assert_healthy");
        Ok(())
    }

    async fn destroy(&self) -> anyhow::Result<()> {
        self.log.push("destroy");
        if self.behavior.fail_destroy {
            anyhow::bail!("terraform destroy exited with 1");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

pub struct MockProvisioner {
    log: Arc<CallLog>,
    behavior: Behavior,
}

impl MockProvisioner {
    pub fn new(log: Arc<CallLog>, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self { log, behavior })
    }
}

#[async_trait]
impl ClusterProvisioner for MockProvisioner {
    async fn acquire(&self, prefix: &str) -> anyhow::Result<Arc<dyn Cluster>> {
        self.log.push(format!("acquire {prefix}"));
        if self.behavior.fail_acquire {
            anyhow::bail!("no credentials for provisioning tool");
        }
        Ok(Arc::new(MockCluster {
            log: self.log.clone(),
            behavior: self.behavior.clone(),
            nodes: AtomicUsize::new(0),
        }))
    }
}

/// How the mock SQL endpoint answers.
#[derive(Debug, Clone, Default)]
pub struct SqlBehavior {
    /// Row returned by every `query_row`.
    pub row: Vec<SqlValue>,
    /// Statements starting with the prefix sleep for the duration.
    pub delays: Vec<(String, Duration)>,
    /// Statements starting with this prefix fail.
    pub fail_on: Option<String>,
}

pub struct MockEndpoint {
    log: Arc<CallLog>,
    behavior: SqlBehavior,
}

impl MockEndpoint {
    async fn run(&self, sql: &str, params: &[SqlValue]) -> anyhow::Result<()> {
        self.log.push(format!("sql {sql}"));
        self.log
            .statements
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
        for (prefix, delay) in &self.behavior.delays {
            if sql.starts_with(prefix.as_str()) {
                tokio::time::sleep(*delay).await;
            }
        }
        if let Some(prefix) = &self.behavior.fail_on {
            if sql.starts_with(prefix.as_str()) {
                anyhow::bail!("statement rejected");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SqlEndpoint for MockEndpoint {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> anyhow::Result<u64> {
        self.run(sql, params).await?;
        Ok(1)
    }

    async fn query_row(&self, sql: &str, params: &[SqlValue]) -> anyhow::Result<Vec<SqlValue>> {
        self.run(sql, params).await?;
        Ok(self.behavior.row.clone())
    }

    async fn close(&self) {
        self.log.push("close");
    }
}

pub struct MockConnector {
    log: Arc<CallLog>,
    behavior: SqlBehavior,
}

impl MockConnector {
    pub fn new(log: Arc<CallLog>, behavior: SqlBehavior) -> Arc<Self> {
        Arc::new(Self { log, behavior })
    }
}

#[async_trait]
impl SqlConnector for MockConnector {
    async fn connect(&self, url: &str) -> anyhow::Result<Box<dyn SqlEndpoint>> {
        self.log.push(format!("connect {url}"));
        Ok(Box::new(MockEndpoint {
            log: self.log.clone(),
            behavior: self.behavior.clone(),
        }))
    }
}

/// Lifecycle settings with short waits.
pub fn fast_settings() -> LifecycleSettings {
    LifecycleSettings {
        convergence_timeout: Duration::from_millis(200),
        poll_interval: Duration::from_millis(5),
        ..LifecycleSettings::default()
    }
}
