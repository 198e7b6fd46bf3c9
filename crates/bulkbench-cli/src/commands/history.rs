use anyhow::Result;
use std::path::Path;

use bulkbench_core::config::HarnessConfig;
use bulkbench_core::results::{ResultsDb, runs_to_json};
use bulkbench_core::scenario::ScenarioKind;
use bulkbench_core::types::format_bytes;

pub fn run(base_dir: &Path, scenario: Option<ScenarioKind>, json: bool) -> Result<()> {
    let config = HarnessConfig::load(&HarnessConfig::default_path(base_dir))?;
    let db = ResultsDb::open(Path::new(&config.harness.results_db))?;

    let filter = scenario.map(|s| s.to_string());
    let runs = db.list_runs(filter.as_deref())?;

    if json {
        println!("{}", runs_to_json(&runs)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!("No runs recorded. Run `bulkbench run <scenario>` to create one.");
        return Ok(());
    }

    println!(
        "{:<38} {:<18} {:>6} {:<12} {:>12} {:>10} {:>10} {}",
        "ID", "SCENARIO", "ITERS", "STATUS", "SIZE", "ELAPSED", "MB/S", "CREATED"
    );
    println!("{}", "-".repeat(130));

    for r in &runs {
        println!(
            "{:<38} {:<18} {:>6} {:<12} {:>12} {:>9.1}s {:>10.1} {}",
            r.id,
            r.scenario,
            r.iterations,
            r.status,
            format_bytes(r.bytes),
            r.elapsed_ms as f64 / 1000.0,
            r.throughput_mb_s,
            r.created_at,
        );
        if let Some(ref err) = r.error {
            println!("    error: {err}");
        }
    }

    Ok(())
}
