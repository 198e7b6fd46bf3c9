use anyhow::Result;
use std::path::Path;

use bulkbench_core::config::HarnessConfig;
use bulkbench_core::results::ResultsDb;

pub fn run(base_dir: &Path) -> Result<()> {
    println!("Initializing bulkbench in {}", base_dir.display());

    std::fs::create_dir_all(base_dir)?;

    let config_path = HarnessConfig::default_path(base_dir);
    if config_path.exists() {
        println!("Config already exists at {}", config_path.display());
    } else {
        let config = HarnessConfig::default_config(base_dir);
        config.save(&config_path)?;
        println!("Created config: {}", config_path.display());
    }

    let config = HarnessConfig::load(&config_path)?;

    let db_path = Path::new(&config.harness.results_db);
    let _db = ResultsDb::open(db_path)?;
    println!("Initialized results database: {}", db_path.display());

    println!("\nbulkbench initialized. Next steps:");
    println!("  1. Point [farm] in {} at your provisioner", config_path.display());
    println!("  2. Run `bulkbench run restore-fixed` to start a benchmark");

    Ok(())
}
