//! Clusters of cloud VMs managed by Terraform and reached over SSH.
//!
//! Every node runs the database under `supervisorctl`, so stopping and
//! starting a node never touches the VM itself.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use bulkbench_core::cluster::{Cluster, ClusterProvisioner, ClusterSettings};
use bulkbench_core::config::TerraformConfig;
use bulkbench_core::types::NodeRef;
use tokio::process::Command;
use tracing::info;

use crate::command::run;
use crate::gossip::GossipProbe;

const SUPERVISED_PROGRAM: &str = "cockroach";

pub struct TerraformFarmer {
    config: TerraformConfig,
}

impl TerraformFarmer {
    pub fn new(config: TerraformConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ClusterProvisioner for TerraformFarmer {
    async fn acquire(&self, prefix: &str) -> anyhow::Result<Arc<dyn Cluster>> {
        let dir = PathBuf::from(&self.config.dir);
        if !dir.is_dir() {
            anyhow::bail!("terraform directory {} does not exist", dir.display());
        }
        Ok(Arc::new(TerraformCluster::new(self.config.clone(), prefix)?))
    }
}

pub struct TerraformCluster {
    config: TerraformConfig,
    prefix: String,
    settings: Mutex<ClusterSettings>,
    hosts: RwLock<Vec<String>>,
    num_nodes: AtomicUsize,
    probe: GossipProbe,
}

impl TerraformCluster {
    pub fn new(config: TerraformConfig, prefix: &str) -> anyhow::Result<Self> {
        Ok(Self {
            config,
            prefix: prefix.to_string(),
            settings: Mutex::new(ClusterSettings::default()),
            hosts: RwLock::new(Vec::new()),
            num_nodes: AtomicUsize::new(0),
            probe: GossipProbe::new(Duration::from_secs(5))?,
        })
    }

    fn state_file(&self) -> String {
        format!("{}.tfstate", self.prefix)
    }

    fn current_settings(&self) -> ClusterSettings {
        self.settings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// `-var k=v` arguments for apply and destroy.
    pub fn terraform_vars(&self, nodes: usize) -> Vec<String> {
        let settings = self.current_settings();
        let mut vars = vec![
            format!("prefix={}", self.prefix),
            format!("num_instances={nodes}"),
            format!("cockroach_flags={}", settings.flags.join(" ")),
        ];
        vars.extend(settings.vars.iter().map(|(k, v)| format!("{k}={v}")));
        vars.into_iter()
            .flat_map(|var| ["-var".to_string(), var])
            .collect()
    }

    fn terraform(&self) -> Command {
        let mut cmd = Command::new("terraform");
        cmd.current_dir(&self.config.dir);
        cmd
    }

    fn host(&self, node: NodeRef) -> anyhow::Result<String> {
        self.hosts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(node.index())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("{node} is not provisioned"))
    }

    /// `ssh` invocation running `remote` on `node`.
    pub fn ssh_args(&self, host: &str, remote: &str) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
        ];
        if let Some(key) = &self.config.key_path {
            args.push("-i".to_string());
            args.push(key.clone());
        }
        args.push(format!("{}@{host}", self.config.ssh_user));
        args.push(remote.to_string());
        args
    }

    async fn ssh(&self, node: NodeRef, remote: &str) -> anyhow::Result<String> {
        let host = self.host(node)?;
        run(
            Command::new("ssh").args(self.ssh_args(&host, remote)),
            &format!("ssh {node}"),
        )
        .await
    }

    async fn supervisorctl(&self, node: NodeRef, action: &str) -> anyhow::Result<String> {
        self.ssh(node, &format!("sudo supervisorctl {action} {SUPERVISED_PROGRAM}"))
            .await
    }
}

/// Hosts listed by `terraform output -json instances`.
pub fn parse_instances(output: &str) -> anyhow::Result<Vec<String>> {
    let hosts: Vec<String> = serde_json::from_str(output.trim())
        .map_err(|e| anyhow::anyhow!("unexpected terraform output: {e}"))?;
    Ok(hosts)
}

#[async_trait]
impl Cluster for TerraformCluster {
    async fn configure(&self, settings: &ClusterSettings) -> anyhow::Result<()> {
        *self.settings.lock().unwrap_or_else(|e| e.into_inner()) = settings.clone();
        Ok(())
    }

    async fn resize(&self, nodes: usize) -> anyhow::Result<()> {
        let state = format!("-state={}", self.state_file());
        run(
            self.terraform()
                .args(["apply", "-auto-approve", "-input=false", state.as_str()])
                .args(self.terraform_vars(nodes)),
            "terraform apply",
        )
        .await?;

        let out = run(
            self.terraform()
                .args(["output", state.as_str(), "-json", "instances"]),
            "terraform output",
        )
        .await?;
        let hosts = parse_instances(&out)?;
        if hosts.len() != nodes {
            anyhow::bail!("terraform reports {} instance(s), expected {nodes}", hosts.len());
        }
        info!("{} node(s) up: {}", hosts.len(), hosts.join(", "));

        *self.hosts.write().unwrap_or_else(|e| e.into_inner()) = hosts;
        self.num_nodes.store(nodes, Ordering::SeqCst);
        Ok(())
    }

    fn num_nodes(&self) -> usize {
        self.num_nodes.load(Ordering::SeqCst)
    }

    async fn kill(&self, node: NodeRef) -> anyhow::Result<()> {
        self.supervisorctl(node, "stop").await?;
        Ok(())
    }

    async fn restart(&self, node: NodeRef) -> anyhow::Result<()> {
        self.supervisorctl(node, "start").await?;
        Ok(())
    }

    async fn exec(&self, node: NodeRef, cmd: &str) -> anyhow::Result<()> {
        self.ssh(node, cmd).await?;
        Ok(())
    }

    fn pg_url(&self, node: NodeRef) -> String {
        let host = self.host(node).unwrap_or_else(|_| node.to_string());
        format!(
            "postgresql://root@{host}:{}?sslmode=disable",
            self.config.sql_port
        )
    }

    async fn peer_counts(&self) -> anyhow::Result<Vec<usize>> {
        let hosts = self.hosts.read().unwrap_or_else(|e| e.into_inner()).clone();
        let mut counts = Vec::with_capacity(hosts.len());
        for host in &hosts {
            counts.push(self.probe.peer_count(host, self.config.http_port).await?);
        }
        Ok(counts)
    }

    async fn assert_healthy(&self) -> anyhow::Result<()> {
        for node in NodeRef::all(self.num_nodes()) {
            let status = self.supervisorctl(node, "status").await?;
            if !status.contains("RUNNING") {
                anyhow::bail!("{node} is not running: {}", status.trim());
            }
        }
        Ok(())
    }

    async fn destroy(&self) -> anyhow::Result<()> {
        let state = format!("-state={}", self.state_file());
        let nodes = self.num_nodes();
        run(
            self.terraform()
                .args(["destroy", "-auto-approve", "-input=false", state.as_str()])
                .args(self.terraform_vars(nodes)),
            "terraform destroy",
        )
        .await?;
        self.hosts.write().unwrap_or_else(|e| e.into_inner()).clear();
        self.num_nodes.store(0, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.prefix
    }
}
