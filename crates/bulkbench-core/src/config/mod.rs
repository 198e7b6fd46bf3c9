pub mod credentials;

use crate::error::{HarnessError, Result};
use crate::lifecycle::LifecycleSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level harness configuration stored as TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default)]
    pub harness: HarnessSettings,
    #[serde(default)]
    pub archives: ArchiveConfig,
    #[serde(default)]
    pub farm: FarmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessSettings {
    /// Path to the SQLite results ledger.
    #[serde(default = "default_results_db")]
    pub results_db: String,
    /// Flags passed to every database process in the cluster.
    #[serde(default = "default_flags")]
    pub flags: Vec<String>,
    /// Upper bound on the wait for gossip convergence.
    #[serde(default = "default_convergence_timeout_secs")]
    pub convergence_timeout_secs: u64,
    /// Interval between two gossip peer-count probes.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Data directory of the database process on every node.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Shell command that copies one node's store out of the archive.
    /// Placeholders: `{store_url}`, `{node}`, `{data_dir}`.
    #[serde(default = "default_copy_command")]
    pub copy_command: String,
    /// Statements run against node 0 once the cluster is healthy.
    #[serde(default = "default_setup_statements")]
    pub setup_statements: Vec<String>,
    /// Payload length of every generated row, in bytes.
    #[serde(default = "default_payload_size")]
    pub payload_size: usize,
    /// Number of rows per generated INSERT statement.
    #[serde(default = "default_insert_batch_rows")]
    pub insert_batch_rows: usize,
    /// Seed for the synthetic payload generator. Random when unset.
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            results_db: default_results_db(),
            flags: default_flags(),
            convergence_timeout_secs: default_convergence_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            data_dir: default_data_dir(),
            copy_command: default_copy_command(),
            setup_statements: default_setup_statements(),
            payload_size: default_payload_size(),
            insert_batch_rows: default_insert_batch_rows(),
            rng_seed: None,
        }
    }
}

/// Externally hosted datasets and backup destinations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Archived node stores, one `node<i>` subdirectory per node.
    #[serde(default = "default_bulk_store_url")]
    pub bulk_store_url: String,
    /// Pre-existing backup restored by the fixed restore scenario.
    #[serde(default = "default_restore_fixed_uri")]
    pub restore_fixed_uri: String,
    /// Base under which the fixed backup scenario writes fresh backups.
    #[serde(default = "default_backup_base_uri")]
    pub backup_base_uri: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            bulk_store_url: default_bulk_store_url(),
            restore_fixed_uri: default_restore_fixed_uri(),
            backup_base_uri: default_backup_base_uri(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FarmKind {
    #[default]
    Terraform,
    Local,
}

/// Which provisioner builds the cluster, and how.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FarmConfig {
    #[serde(default)]
    pub kind: FarmKind,
    #[serde(default)]
    pub terraform: TerraformConfig,
    #[serde(default)]
    pub local: LocalFarmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerraformConfig {
    /// Directory holding the Terraform configuration.
    #[serde(default = "default_terraform_dir")]
    pub dir: String,
    #[serde(default = "default_ssh_user")]
    pub ssh_user: String,
    /// Private key used for SSH. Falls back to the agent when unset.
    #[serde(default)]
    pub key_path: Option<String>,
    #[serde(default = "default_sql_port")]
    pub sql_port: u16,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

impl Default for TerraformConfig {
    fn default() -> Self {
        Self {
            dir: default_terraform_dir(),
            ssh_user: default_ssh_user(),
            key_path: None,
            sql_port: default_sql_port(),
            http_port: default_http_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalFarmConfig {
    /// Database binary started once per node.
    #[serde(default = "default_local_binary")]
    pub binary: String,
    /// Arguments, with `{store}`, `{port}`, `{http_port}`, `{join}` and `{flags}` placeholders.
    #[serde(default = "default_local_args")]
    pub args: Vec<String>,
    /// Directory under which per-prefix node stores are created.
    #[serde(default = "default_local_base_dir")]
    pub base_dir: String,
    /// SQL port of node 0. Node i listens on `base_port + 2i`, HTTP on the next port.
    #[serde(default = "default_base_port")]
    pub base_port: u16,
}

impl Default for LocalFarmConfig {
    fn default() -> Self {
        Self {
            binary: default_local_binary(),
            args: default_local_args(),
            base_dir: default_local_base_dir(),
            base_port: default_base_port(),
        }
    }
}

fn default_results_db() -> String {
    HarnessConfig::default_base_dir()
        .map(|dir| dir.join("results.db"))
        .unwrap_or_else(|_| PathBuf::from("results.db"))
        .display()
        .to_string()
}

fn default_flags() -> Vec<String> {
    vec!["--max-offset=1s".to_string()]
}

fn default_convergence_timeout_secs() -> u64 {
    120
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_data_dir() -> String {
    "/mnt/data0".to_string()
}

fn default_copy_command() -> String {
    r#"gsutil -m cp -r "{store_url}/node{node}/*" "{data_dir}""#.to_string()
}

fn default_setup_statements() -> Vec<String> {
    vec!["SET CLUSTER SETTING enterprise.enabled = true".to_string()]
}

fn default_payload_size() -> usize {
    100
}

fn default_insert_batch_rows() -> usize {
    500
}

fn default_bulk_store_url() -> String {
    "gs://cockroach-test/bulkops/10nodes-2t-50000ranges".to_string()
}

fn default_restore_fixed_uri() -> String {
    "gs://cockroach-test/2t-backup".to_string()
}

fn default_backup_base_uri() -> String {
    "gs://cockroach-test".to_string()
}

fn default_terraform_dir() -> String {
    "terraform/gce".to_string()
}

fn default_ssh_user() -> String {
    "ubuntu".to_string()
}

fn default_sql_port() -> u16 {
    26257
}

fn default_http_port() -> u16 {
    8080
}

fn default_local_binary() -> String {
    "cockroach".to_string()
}

fn default_local_args() -> Vec<String> {
    [
        "start",
        "--insecure",
        "--store={store}",
        "--port={port}",
        "--http-port={http_port}",
        "{join}",
        "{flags}",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_local_base_dir() -> String {
    std::env::temp_dir()
        .join("bulkbench-local")
        .display()
        .to_string()
}

fn default_base_port() -> u16 {
    26257
}

impl HarnessSettings {
    /// Lifecycle knobs derived from this configuration.
    pub fn lifecycle_settings(&self) -> LifecycleSettings {
        LifecycleSettings {
            flags: self.flags.clone(),
            convergence_timeout: Duration::from_secs(self.convergence_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            data_dir: self.data_dir.clone(),
            copy_command: self.copy_command.clone(),
            setup_statements: self.setup_statements.clone(),
        }
    }
}

impl HarnessConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(HarnessError::ConfigNotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| HarnessError::TomlDe(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| HarnessError::TomlSer(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.harness.payload_size == 0 {
            return Err(HarnessError::Config("payload_size must be > 0".to_string()));
        }
        if self.harness.insert_batch_rows == 0 {
            return Err(HarnessError::Config(
                "insert_batch_rows must be > 0".to_string(),
            ));
        }
        if self.harness.poll_interval_ms == 0 {
            return Err(HarnessError::Config(
                "poll_interval_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Default config for `bulkbench init`.
    pub fn default_config(base_dir: &Path) -> Self {
        Self {
            harness: HarnessSettings {
                results_db: base_dir.join("results.db").display().to_string(),
                ..HarnessSettings::default()
            },
            archives: ArchiveConfig::default(),
            farm: FarmConfig::default(),
        }
    }

    /// Resolve the config file path: `<base_dir>/bulkbench.toml`
    pub fn default_path(base_dir: &Path) -> PathBuf {
        base_dir.join("bulkbench.toml")
    }

    /// Resolve the default home directory: `~/.bulkbench`
    pub fn default_base_dir() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|h| h.join(".bulkbench"))
            .ok_or_else(|| HarnessError::Config("Cannot determine home directory".to_string()))
    }
}
