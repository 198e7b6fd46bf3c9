//! Factory for creating the provisioner selected by configuration.

use std::sync::Arc;

use bulkbench_core::cluster::ClusterProvisioner;
use bulkbench_core::config::{FarmConfig, FarmKind};

use crate::local::LocalFarmer;
use crate::terraform::TerraformFarmer;

/// Create a ClusterProvisioner for the configured farm kind.
///
/// Supported kinds:
/// - `terraform`: cloud VMs via Terraform, nodes reached over SSH
/// - `local`: one local process per node, for smoke runs
pub fn create_provisioner(config: &FarmConfig) -> Arc<dyn ClusterProvisioner> {
    match config.kind {
        FarmKind::Terraform => Arc::new(TerraformFarmer::new(config.terraform.clone())),
        FarmKind::Local => Arc::new(LocalFarmer::new(config.local.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulkbench_core::types::NodeRef;

    #[tokio::test]
    async fn local_kind_builds_local_clusters() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = FarmConfig {
            kind: FarmKind::Local,
            ..Default::default()
        };
        config.local.base_dir = tmp.path().display().to_string();
        config.local.base_port = 40000;

        let cluster = create_provisioner(&config).acquire("factory").await.unwrap();
        assert_eq!(cluster.name(), "factory");
        assert_eq!(
            cluster.pg_url(NodeRef(1)),
            "postgresql://root@localhost:40002?sslmode=disable"
        );
        assert!(tmp.path().join("factory").is_dir());
    }

    #[tokio::test]
    async fn terraform_kind_checks_its_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = FarmConfig::default();
        config.terraform.dir = tmp.path().display().to_string();

        let cluster = create_provisioner(&config).acquire("tf").await.unwrap();
        assert_eq!(cluster.name(), "tf");
        assert_eq!(cluster.num_nodes(), 0);
    }
}
