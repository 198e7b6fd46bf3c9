use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::types::NodeRef;

/// Start stage a provisioning failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStage {
    Acquire,
    Configure,
    Resize,
    Convergence,
    Assert,
}

impl fmt::Display for ProvisionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionStage::Acquire => write!(f, "acquire"),
            ProvisionStage::Configure => write!(f, "configure"),
            ProvisionStage::Resize => write!(f, "resize"),
            ProvisionStage::Convergence => write!(f, "convergence"),
            ProvisionStage::Assert => write!(f, "assert"),
        }
    }
}

/// Seeding step a per-node failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedStage {
    Stop,
    Download,
    Restart,
}

impl fmt::Display for SeedStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeedStage::Stop => write!(f, "stopping"),
            SeedStage::Download => write!(f, "downloading store"),
            SeedStage::Restart => write!(f, "restarting"),
        }
    }
}

#[derive(Debug, Error)]
pub enum HarnessError {
    // IO
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Config
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration file not found at {0}, run `bulkbench init` first")]
    ConfigNotFound(String),

    #[error("TOML deserialization error: {0}")]
    TomlDe(String),

    #[error("TOML serialization error: {0}")]
    TomlSer(String),

    #[error("Unknown scenario: {0}")]
    InvalidScenario(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    // Preconditions
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("env variables {} must be set", .0.join(", "))]
    MissingCredentials(Vec<String>),

    // Cluster lifecycle
    #[error("Provisioning failed during {stage}: {source:#}")]
    Provisioning {
        stage: ProvisionStage,
        #[source]
        source: anyhow::Error,
    },

    #[error("error {stage} {node}: {source:#}")]
    Seeding {
        stage: SeedStage,
        node: NodeRef,
        #[source]
        source: anyhow::Error,
    },

    #[error("cluster did not converge to {expected} peers within {timeout:?}")]
    ConvergenceTimeout { expected: usize, timeout: Duration },

    // Benchmark body
    #[error("cannot connect to {url}: {source:#}")]
    Connect {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("SQL statement `{statement}` failed: {source:#}")]
    Sql {
        statement: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("recovered from panic to destroy cluster: {0}")]
    Panicked(String),

    #[error("Cluster teardown failed: {0:#}")]
    Teardown(anyhow::Error),

    // Results ledger
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HarnessError {
    pub(crate) fn provisioning(stage: ProvisionStage, source: anyhow::Error) -> Self {
        HarnessError::Provisioning { stage, source }
    }

    pub(crate) fn sql(statement: &str, source: anyhow::Error) -> Self {
        HarnessError::Sql {
            statement: statement.to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, HarnessError>;
