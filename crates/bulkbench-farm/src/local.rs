//! Clusters of local database processes, one store directory per node.
//! Used for smoke runs on a single machine.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bulkbench_core::cluster::{Cluster, ClusterProvisioner, ClusterSettings};
use bulkbench_core::config::LocalFarmConfig;
use bulkbench_core::types::NodeRef;
use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::command::run;
use crate::gossip::GossipProbe;

pub struct LocalFarmer {
    config: LocalFarmConfig,
}

impl LocalFarmer {
    pub fn new(config: LocalFarmConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ClusterProvisioner for LocalFarmer {
    async fn acquire(&self, prefix: &str) -> anyhow::Result<Arc<dyn Cluster>> {
        let base_dir = Path::new(&self.config.base_dir).join(prefix);
        tokio::fs::create_dir_all(&base_dir).await?;
        Ok(Arc::new(LocalCluster::new(
            self.config.clone(),
            prefix,
            &base_dir,
        )?))
    }
}

pub struct LocalCluster {
    config: LocalFarmConfig,
    name: String,
    base_dir: PathBuf,
    settings: Mutex<ClusterSettings>,
    children: tokio::sync::Mutex<Vec<Option<Child>>>,
    num_nodes: AtomicUsize,
    probe: GossipProbe,
}

impl LocalCluster {
    pub fn new(config: LocalFarmConfig, name: &str, base_dir: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            config,
            name: name.to_string(),
            base_dir: base_dir.to_path_buf(),
            settings: Mutex::new(ClusterSettings::default()),
            children: tokio::sync::Mutex::new(Vec::new()),
            num_nodes: AtomicUsize::new(0),
            probe: GossipProbe::new(Duration::from_secs(2))?,
        })
    }

    pub fn store_dir(&self, node: NodeRef) -> PathBuf {
        self.base_dir.join(node.to_string())
    }

    pub fn sql_port(&self, node: NodeRef) -> u16 {
        self.config.base_port.saturating_add((2 * node.index()) as u16)
    }

    pub fn http_port(&self, node: NodeRef) -> u16 {
        self.sql_port(node).saturating_add(1)
    }

    fn join_all(&self) -> bool {
        self.settings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .vars
            .get("join_all")
            .is_some_and(|v| v == "true")
    }

    /// `--join` flag for a node: every node when `join_all` is set, otherwise
    /// the previous node. Node 0 of a sequential bootstrap joins nobody.
    pub fn join_arg(&self, node: NodeRef) -> String {
        let addr = |n: usize| format!("localhost:{}", self.sql_port(NodeRef(n)));
        let nodes = self.num_nodes();
        if self.join_all() {
            let all: Vec<String> = (0..nodes).map(addr).collect();
            format!("--join={}", all.join(","))
        } else if node.index() == 0 {
            String::new()
        } else {
            format!("--join={}", addr(node.index() - 1))
        }
    }

    /// Arguments for `node` with every placeholder substituted. `{flags}`
    /// expands to the configured flags; arguments that render empty are dropped.
    pub fn render_args(&self, node: NodeRef) -> Vec<String> {
        let flags = self
            .settings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .flags
            .clone();
        let store = self.store_dir(node).display().to_string();
        let join = self.join_arg(node);

        let mut args = Vec::with_capacity(self.config.args.len() + flags.len());
        for arg in &self.config.args {
            if arg == "{flags}" {
                args.extend(flags.iter().cloned());
                continue;
            }
            let rendered = arg
                .replace("{store}", &store)
                .replace("{port}", &self.sql_port(node).to_string())
                .replace("{http_port}", &self.http_port(node).to_string())
                .replace("{join}", &join);
            if !rendered.is_empty() {
                args.push(rendered);
            }
        }
        args
    }

    async fn spawn(&self, node: NodeRef) -> anyhow::Result<Child> {
        let store = self.store_dir(node);
        tokio::fs::create_dir_all(&store).await?;
        let args = self.render_args(node);
        debug!("starting {node}: {} {}", self.config.binary, args.join(" "));
        let child = Command::new(&self.config.binary)
            .args(&args)
            .current_dir(&store)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| anyhow::anyhow!("cannot start {}: {e}", self.config.binary))?;
        Ok(child)
    }
}

/// Kill a node process unless it already exited.
async fn stop(mut child: Child) -> anyhow::Result<()> {
    if child.try_wait()?.is_none() {
        child.kill().await?;
    }
    Ok(())
}

#[async_trait]
impl Cluster for LocalCluster {
    async fn configure(&self, settings: &ClusterSettings) -> anyhow::Result<()> {
        *self.settings.lock().unwrap_or_else(|e| e.into_inner()) = settings.clone();
        Ok(())
    }

    async fn resize(&self, nodes: usize) -> anyhow::Result<()> {
        let mut children = self.children.lock().await;
        while children.len() > nodes {
            if let Some(Some(child)) = children.pop() {
                stop(child).await?;
            }
        }
        // Join flags depend on the final node count.
        self.num_nodes.store(nodes, Ordering::SeqCst);
        for index in children.len()..nodes {
            let child = self.spawn(NodeRef(index)).await?;
            children.push(Some(child));
        }
        info!("{nodes} local node(s) under {}", self.base_dir.display());
        Ok(())
    }

    fn num_nodes(&self) -> usize {
        self.num_nodes.load(Ordering::SeqCst)
    }

    async fn kill(&self, node: NodeRef) -> anyhow::Result<()> {
        let mut children = self.children.lock().await;
        let slot = children
            .get_mut(node.index())
            .ok_or_else(|| anyhow::anyhow!("{node} is not provisioned"))?;
        if let Some(child) = slot.take() {
            stop(child).await?;
        }
        Ok(())
    }

    async fn restart(&self, node: NodeRef) -> anyhow::Result<()> {
        let mut children = self.children.lock().await;
        let slot = children
            .get_mut(node.index())
            .ok_or_else(|| anyhow::anyhow!("{node} is not provisioned"))?;
        if let Some(child) = slot.take() {
            stop(child).await?;
        }
        *slot = Some(self.spawn(node).await?);
        Ok(())
    }

    async fn exec(&self, node: NodeRef, cmd: &str) -> anyhow::Result<()> {
        let store = self.store_dir(node);
        tokio::fs::create_dir_all(&store).await?;
        run(
            Command::new("sh")
                .args(["-c", cmd])
                .current_dir(&store)
                .env("NODE_INDEX", node.index().to_string())
                .env("NODE_STORE", &store),
            &format!("exec on {node}"),
        )
        .await?;
        Ok(())
    }

    fn data_dir(&self, node: NodeRef) -> Option<String> {
        Some(self.store_dir(node).display().to_string())
    }

    fn pg_url(&self, node: NodeRef) -> String {
        format!(
            "postgresql://root@localhost:{}?sslmode=disable",
            self.sql_port(node)
        )
    }

    async fn peer_counts(&self) -> anyhow::Result<Vec<usize>> {
        let mut counts = Vec::with_capacity(self.num_nodes());
        for node in NodeRef::all(self.num_nodes()) {
            counts.push(self.probe.peer_count("localhost", self.http_port(node)).await?);
        }
        Ok(counts)
    }

    async fn assert_healthy(&self) -> anyhow::Result<()> {
        let mut children = self.children.lock().await;
        for (index, slot) in children.iter_mut().enumerate() {
            let node = NodeRef(index);
            match slot {
                None => anyhow::bail!("{node} is stopped"),
                Some(child) => {
                    if let Some(status) = child.try_wait()? {
                        anyhow::bail!("{node} exited with {status}");
                    }
                }
            }
        }
        Ok(())
    }

    async fn destroy(&self) -> anyhow::Result<()> {
        let mut children = self.children.lock().await;
        for child in children.drain(..).flatten() {
            stop(child).await?;
        }
        self.num_nodes.store(0, Ordering::SeqCst);
        if self.base_dir.exists() {
            tokio::fs::remove_dir_all(&self.base_dir).await?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulkbench_core::lifecycle::render_copy_command;

    fn sleeper(base: &Path) -> LocalFarmConfig {
        LocalFarmConfig {
            binary: "sh".to_string(),
            args: vec!["-c".to_string(), "sleep 30".to_string()],
            base_dir: base.display().to_string(),
            base_port: 30000,
        }
    }

    #[tokio::test]
    async fn args_rendered_per_node() {
        let tmp = tempfile::tempdir().unwrap();
        let config = LocalFarmConfig {
            base_dir: tmp.path().display().to_string(),
            ..Default::default()
        };
        let cluster = LocalCluster::new(config, "restore", tmp.path()).unwrap();
        cluster
            .configure(&ClusterSettings {
                flags: vec!["--max-offset=1s".to_string()],
                ..Default::default()
            })
            .await
            .unwrap();
        cluster.num_nodes.store(3, Ordering::SeqCst);

        let node0 = cluster.render_args(NodeRef(0));
        assert_eq!(
            node0,
            vec![
                "start".to_string(),
                "--insecure".to_string(),
                format!("--store={}", tmp.path().join("node0").display()),
                "--port=26257".to_string(),
                "--http-port=26258".to_string(),
                "--max-offset=1s".to_string(),
            ]
        );

        let node2 = cluster.render_args(NodeRef(2));
        assert!(node2.contains(&"--port=26261".to_string()));
        assert!(node2.contains(&"--join=localhost:26259".to_string()));
    }

    #[tokio::test]
    async fn join_all_lists_every_node() {
        let tmp = tempfile::tempdir().unwrap();
        let cluster =
            LocalCluster::new(LocalFarmConfig::default(), "backup", tmp.path()).unwrap();
        let mut settings = ClusterSettings::default();
        settings.vars.insert("join_all".to_string(), "true".to_string());
        cluster.configure(&settings).await.unwrap();
        cluster.num_nodes.store(2, Ordering::SeqCst);

        assert_eq!(
            cluster.join_arg(NodeRef(0)),
            "--join=localhost:26257,localhost:26259"
        );
    }

    #[tokio::test]
    async fn processes_follow_lifecycle() {
        let tmp = tempfile::tempdir().unwrap();
        let farmer = LocalFarmer::new(sleeper(tmp.path()));
        let cluster = farmer.acquire("smoke").await.unwrap();

        cluster.resize(2).await.unwrap();
        assert_eq!(cluster.num_nodes(), 2);
        cluster.assert_healthy().await.unwrap();

        cluster.kill(NodeRef(1)).await.unwrap();
        assert!(cluster.assert_healthy().await.is_err());
        cluster.restart(NodeRef(1)).await.unwrap();
        cluster.assert_healthy().await.unwrap();

        let base = tmp.path().join("smoke");
        assert!(base.join("node1").is_dir());
        cluster.destroy().await.unwrap();
        assert!(!base.exists());
        assert_eq!(cluster.num_nodes(), 0);
    }

    #[tokio::test]
    async fn exec_runs_in_node_store() {
        let tmp = tempfile::tempdir().unwrap();
        let farmer = LocalFarmer::new(sleeper(tmp.path()));
        let cluster = farmer.acquire("exec").await.unwrap();
        cluster.resize(2).await.unwrap();

        cluster
            .exec(NodeRef(1), r#"echo "$NODE_INDEX" > "$NODE_STORE/marker""#)
            .await
            .unwrap();
        let marker = tmp.path().join("exec").join("node1").join("marker");
        assert_eq!(std::fs::read_to_string(marker).unwrap().trim(), "1");

        assert!(cluster.exec(NodeRef(0), "exit 1").await.is_err());
        cluster.destroy().await.unwrap();
    }

    #[tokio::test]
    async fn seeded_stores_land_in_their_own_node() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("archive");
        for index in 0..2 {
            let dir = archive.join(format!("node{index}"));
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join(format!("STORE_OF_{index}")), "sst").unwrap();
        }

        let farmer = LocalFarmer::new(sleeper(&tmp.path().join("farm")));
        let cluster = farmer.acquire("seed").await.unwrap();
        cluster.resize(2).await.unwrap();

        let template = r#"cp -r "{store_url}/node{node}/." "{data_dir}""#;
        let store_url = archive.display().to_string();
        for node in NodeRef::all(2) {
            let data_dir = cluster.data_dir(node).unwrap();
            let cmd = render_copy_command(template, &store_url, node, &data_dir);
            cluster.exec(node, &cmd).await.unwrap();
        }

        let stores = tmp.path().join("farm").join("seed");
        assert!(stores.join("node0").join("STORE_OF_0").is_file());
        assert!(stores.join("node1").join("STORE_OF_1").is_file());
        assert!(!stores.join("node0").join("STORE_OF_1").exists());
        assert!(!stores.join("node1").join("STORE_OF_0").exists());
        cluster.destroy().await.unwrap();
    }

    #[tokio::test]
    async fn shrinking_stops_extra_nodes() {
        let tmp = tempfile::tempdir().unwrap();
        let farmer = LocalFarmer::new(sleeper(tmp.path()));
        let cluster = farmer.acquire("shrink").await.unwrap();

        cluster.resize(3).await.unwrap();
        cluster.resize(1).await.unwrap();
        assert_eq!(cluster.num_nodes(), 1);
        cluster.assert_healthy().await.unwrap();
        assert!(cluster.kill(NodeRef(2)).await.is_err());
        cluster.destroy().await.unwrap();
    }
}
