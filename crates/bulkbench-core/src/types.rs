use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{HarnessError, Result};

/// Index of a node inside a provisioned cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeRef(pub usize);

impl NodeRef {
    /// Node that bootstraps the cluster and serves SQL connections.
    pub const BOOTSTRAP: NodeRef = NodeRef(0);

    pub fn index(self) -> usize {
        self.0
    }

    /// All node refs of a cluster with `count` nodes, in index order.
    pub fn all(count: usize) -> impl Iterator<Item = NodeRef> {
        (0..count).map(NodeRef)
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node{}", self.0)
    }
}

/// Declarative description of the cluster a benchmark needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Number of nodes in the cluster.
    pub nodes: usize,
    /// Prefix prepended to every resource the provisioner creates.
    pub prefix: String,
    /// Disk size per node in GB. 0 keeps the provisioner default.
    #[serde(default)]
    pub disk_size_gb: u32,
    /// Archive the node stores are downloaded from. Nothing is downloaded when unset.
    #[serde(default)]
    pub store_url: Option<String>,
    /// When false, node 0 initializes the cluster and node i joins node i-1.
    /// When true, every node lists every other node in its join flags.
    #[serde(default)]
    pub join_all: bool,
}

impl BenchmarkConfig {
    pub fn new(nodes: usize, prefix: &str) -> Self {
        Self {
            nodes,
            prefix: prefix.to_string(),
            disk_size_gb: 0,
            store_url: None,
            join_all: false,
        }
    }

    pub fn with_disk_size_gb(mut self, gb: u32) -> Self {
        self.disk_size_gb = gb;
        self
    }

    pub fn with_store_url(mut self, url: &str) -> Self {
        self.store_url = Some(url.to_string());
        self
    }

    pub fn with_join_all(mut self, join_all: bool) -> Self {
        self.join_all = join_all;
        self
    }

    /// Store archive to seed from, if seeding was requested.
    pub fn seed_source(&self) -> Option<&str> {
        self.store_url.as_deref().filter(|url| !url.is_empty())
    }

    pub fn validate(&self) -> Result<()> {
        if self.nodes == 0 {
            return Err(HarnessError::Config(
                "a benchmark cluster needs at least one node".to_string(),
            ));
        }
        if self.prefix.trim().is_empty() {
            return Err(HarnessError::Config(
                "resource prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Bytes moved and wall time spent inside the timed window of a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkMetric {
    pub bytes: u64,
    pub iterations: u64,
    pub elapsed: Duration,
}

impl BenchmarkMetric {
    pub fn bytes_per_op(&self) -> u64 {
        if self.iterations == 0 {
            return 0;
        }
        self.bytes / self.iterations
    }

    pub fn throughput_mb_s(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        (self.bytes as f64 / 1_048_576.0) / secs
    }
}

impl fmt::Display for BenchmarkMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} x{} in {:?} ({:.1} MB/s, {} B/op)",
            format_bytes(self.bytes),
            self.iterations,
            self.elapsed,
            self.throughput_mb_s(),
            self.bytes_per_op()
        )
    }
}

/// Status of a recorded benchmark run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    InProgress,
    Passed,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::InProgress => write!(f, "in_progress"),
            RunStatus::Passed => write!(f, "passed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = HarnessError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(RunStatus::InProgress),
            "passed" => Ok(RunStatus::Passed),
            "failed" => Ok(RunStatus::Failed),
            _ => Err(HarnessError::InvalidStatus(s.to_string())),
        }
    }
}

/// Summary of one benchmark run, as stored in the results ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub scenario: String,
    pub iterations: u64,
    pub nodes: usize,
    pub status: RunStatus,
    pub bytes: u64,
    pub elapsed_ms: u64,
    pub throughput_mb_s: f64,
    pub error: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

/// Human-readable IEC byte size (1.5 GiB, 100 B, ...).
pub fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;
    const TIB: u64 = GIB * 1024;

    if bytes >= TIB {
        format!("{:.1} TiB", bytes as f64 / TIB as f64)
    } else if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}
