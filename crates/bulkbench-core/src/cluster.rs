use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::types::NodeRef;

/// Flags and per-node variables applied to a cluster before it is sized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterSettings {
    /// Command-line flags passed to every database process.
    pub flags: Vec<String>,
    /// Provisioner variables (`join_all`, `cockroach_disk_size`, ...).
    pub vars: BTreeMap<String, String>,
}

/// A provisioned set of nodes running the database under test.
///
/// All methods take `&self` so one handle can be shared by the per-node
/// tasks of a fan-out.
#[async_trait]
pub trait Cluster: Send + Sync {
    /// Record flags and variables used by the next resize or restart.
    async fn configure(&self, settings: &ClusterSettings) -> anyhow::Result<()>;

    /// Grow or shrink the cluster to exactly `nodes` nodes.
    async fn resize(&self, nodes: usize) -> anyhow::Result<()>;

    /// Number of nodes currently provisioned.
    fn num_nodes(&self) -> usize;

    /// Stop the database process on a node.
    async fn kill(&self, node: NodeRef) -> anyhow::Result<()>;

    /// Start the database process on a node again.
    async fn restart(&self, node: NodeRef) -> anyhow::Result<()>;

    /// Run a shell command on a node.
    async fn exec(&self, node: NodeRef, cmd: &str) -> anyhow::Result<()>;

    /// Data directory of a node when it differs per node. `None` means the
    /// harness-wide data directory applies.
    fn data_dir(&self, _node: NodeRef) -> Option<String> {
        None
    }

    /// Postgres connection URL of a node.
    fn pg_url(&self, node: NodeRef) -> String;

    /// Number of peers each node currently sees through gossip, indexed by node.
    async fn peer_counts(&self) -> anyhow::Result<Vec<usize>>;

    /// Block until every node sees at least `expected` peers.
    ///
    /// Probe errors are treated as "not yet converged"; the caller bounds the
    /// total wait.
    async fn wait_for_peers(&self, expected: usize, poll: Duration) -> anyhow::Result<()> {
        loop {
            match self.peer_counts().await {
                Ok(counts) if counts.len() >= expected && counts.iter().all(|&c| c >= expected) => {
                    return Ok(());
                }
                Ok(counts) => {
                    tracing::debug!(?counts, expected, "waiting for gossip convergence");
                }
                Err(e) => {
                    tracing::debug!("gossip probe failed: {e:#}");
                }
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Whole-cluster health assertion (every node process running).
    async fn assert_healthy(&self) -> anyhow::Result<()>;

    /// Tear down every resource created for this cluster.
    async fn destroy(&self) -> anyhow::Result<()>;

    /// Name for logs (usually the resource prefix).
    fn name(&self) -> &str;
}

/// Hands out cluster handles scoped to a resource prefix.
#[async_trait]
pub trait ClusterProvisioner: Send + Sync {
    async fn acquire(&self, prefix: &str) -> anyhow::Result<Arc<dyn Cluster>>;
}
