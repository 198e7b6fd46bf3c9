use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bulkbench_core::config::HarnessConfig;
use bulkbench_core::config::credentials::AzureCredentials;
use bulkbench_core::results::ResultsDb;
use bulkbench_core::runner::Runner;
use bulkbench_core::scenario::ScenarioKind;
use bulkbench_core::sql::PgConnector;
use bulkbench_core::types::format_bytes;

use crate::AzureArgs;

pub async fn run(
    base_dir: &Path,
    kind: ScenarioKind,
    iterations: u64,
    azure: &AzureArgs,
) -> Result<()> {
    let config = HarnessConfig::load(&HarnessConfig::default_path(base_dir))?;

    // Missing credentials are reported by the scenarios that need them.
    let credentials = AzureCredentials::from_parts(
        azure.azure_container.as_deref(),
        azure.azure_account_name.as_deref(),
        azure.azure_account_key.as_deref(),
    )
    .ok();
    let scenario = kind.build(&config, credentials)?;

    let results = ResultsDb::open(Path::new(&config.harness.results_db))?;
    let runner = Runner::new(
        config.harness.lifecycle_settings(),
        bulkbench_farm::create_provisioner(&config.farm),
        Arc::new(PgConnector),
    )
    .with_results(results);

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.set_message(format!("{} x{iterations}", scenario.name()));
    pb.enable_steady_tick(Duration::from_millis(120));

    let outcome = runner.run(scenario.as_ref(), iterations).await;
    pb.finish_and_clear();
    let outcome = outcome?;

    let metric = outcome.metric;
    println!("{} passed (run {})", scenario.name(), outcome.run_id);
    println!("  Data size:  {}", format_bytes(metric.bytes));
    println!("  Iterations: {}", metric.iterations);
    println!("  Per op:     {} B", metric.bytes_per_op());
    println!("  Elapsed:    {:.2}s", metric.elapsed.as_secs_f64());
    println!("  Throughput: {:.1} MB/s", metric.throughput_mb_s());

    Ok(())
}
