use anyhow::Result;
use std::path::Path;

use bulkbench_core::config::HarnessConfig;
use bulkbench_core::scenario::ScenarioKind;

pub fn run(base_dir: &Path) -> Result<()> {
    let config = HarnessConfig::load(&HarnessConfig::default_path(base_dir))?;

    println!(
        "{:<18} {:<22} {:>5} {:<10} {}",
        "SCENARIO", "BENCHMARK", "NODES", "SEEDED", "DESCRIPTION"
    );
    println!("{}", "-".repeat(100));

    for kind in ScenarioKind::ALL {
        let scenario = kind.build(&config, None)?;
        let cluster = scenario.benchmark_config();
        println!(
            "{:<18} {:<22} {:>5} {:<10} {}",
            kind.to_string(),
            scenario.name(),
            cluster.nodes,
            if cluster.seed_source().is_some() { "yes" } else { "no" },
            kind.description(),
        );
    }

    Ok(())
}
