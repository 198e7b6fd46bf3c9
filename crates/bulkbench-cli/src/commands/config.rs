use anyhow::Result;
use std::path::Path;

use bulkbench_core::config::{FarmKind, HarnessConfig};

pub fn run(base_dir: &Path) -> Result<()> {
    let config_path = HarnessConfig::default_path(base_dir);
    let config = HarnessConfig::load(&config_path)?;
    let h = &config.harness;

    println!("Config: {}", config_path.display());
    println!();
    println!("  Results DB:          {}", h.results_db);
    println!("  Node flags:          {}", h.flags.join(" "));
    println!("  Convergence timeout: {}s", h.convergence_timeout_secs);
    println!("  Data dir:            {}", h.data_dir);
    println!("  Copy command:        {}", h.copy_command);
    println!("  Setup statements:    {}", h.setup_statements.len());
    println!();
    println!("  Bulk store archive:  {}", config.archives.bulk_store_url);
    println!("  Fixed restore from:  {}", config.archives.restore_fixed_uri);
    println!("  Backups written to:  {}", config.archives.backup_base_uri);
    println!();

    match config.farm.kind {
        FarmKind::Terraform => {
            let tf = &config.farm.terraform;
            println!("  Farm: terraform");
            println!("    dir={} ssh_user={}", tf.dir, tf.ssh_user);
            println!("    sql_port={} http_port={}", tf.sql_port, tf.http_port);
        }
        FarmKind::Local => {
            let local = &config.farm.local;
            println!("  Farm: local");
            println!("    binary={} base_dir={}", local.binary, local.base_dir);
            println!("    base_port={}", local.base_port);
        }
    }

    Ok(())
}
