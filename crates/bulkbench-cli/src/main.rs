mod commands;

use bulkbench_core::scenario::ScenarioKind;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bulkbench")]
#[command(about = "Bulk backup/restore benchmarks on ephemeral database clusters")]
#[command(version)]
struct Cli {
    /// Path to the bulkbench config directory (default: ~/.bulkbench)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration and create the results database
    Init,

    /// Show current configuration
    Config,

    /// List available benchmark scenarios
    List,

    /// Provision a cluster, run one scenario against it, tear it down
    Run {
        /// restore-synthetic, restore-fixed or backup-fixed
        scenario: ScenarioKind,

        /// Benchmark iterations (rows for restore-synthetic, must be 1 for fixed scenarios)
        #[arg(long, short = 'n', default_value_t = 1)]
        iterations: u64,

        #[command(flatten)]
        azure: AzureArgs,
    },

    /// Show recorded runs
    History {
        /// Only show runs of this scenario
        #[arg(long)]
        scenario: Option<ScenarioKind>,

        /// Print runs as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Azure storage credentials used by restore-synthetic.
#[derive(Args, Debug, Default)]
pub struct AzureArgs {
    #[arg(long, env = "AZURE_CONTAINER")]
    pub azure_container: Option<String>,

    #[arg(long, env = "AZURE_ACCOUNT_NAME")]
    pub azure_account_name: Option<String>,

    #[arg(long, env = "AZURE_ACCOUNT_KEY", hide_env_values = true)]
    pub azure_account_key: Option<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bulkbench=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let base_dir = match cli.config_dir {
        Some(ref dir) => dir.clone(),
        None => bulkbench_core::config::HarnessConfig::default_base_dir()?,
    };

    match cli.command {
        Commands::Init => commands::init::run(&base_dir),
        Commands::Config => commands::config::run(&base_dir),
        Commands::List => commands::list::run(&base_dir),
        Commands::Run {
            scenario,
            iterations,
            ref azure,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(commands::run::run(&base_dir, scenario, iterations, azure))
        }
        Commands::History { scenario, json } => {
            commands::history::run(&base_dir, scenario, json)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_parses_scenario_and_iterations() {
        let cli = Cli::try_parse_from(["bulkbench", "run", "restore-synthetic", "-n", "1000"])
            .unwrap();
        match cli.command {
            Commands::Run {
                scenario,
                iterations,
                ..
            } => {
                assert_eq!(scenario, ScenarioKind::RestoreSynthetic);
                assert_eq!(iterations, 1000);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn history_json_flag() {
        let cli = Cli::try_parse_from(["bulkbench", "history", "--json"]).unwrap();
        match cli.command {
            Commands::History { scenario, json } => {
                assert!(scenario.is_none());
                assert!(json);
            }
            _ => panic!("expected history"),
        }
    }

    #[test]
    fn unknown_scenario_rejected() {
        assert!(Cli::try_parse_from(["bulkbench", "run", "restore-huge"]).is_err());
    }
}
