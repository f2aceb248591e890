//! taskexecd — the task executor daemon.
//!
//! Runs the reconcile loop against a cluster snapshot and a local redb
//! discovery store:
//! - `run` ticks until Ctrl-C
//! - `once` runs a single tick and prints the report
//! - `import` seeds the store with templates, workers and requests
//! - `report` prints the latest stored report
//!
//! # Usage
//!
//! ```text
//! taskexecd import --data-dir /var/lib/taskexec seed.json
//! taskexecd run --data-dir /var/lib/taskexec --snapshot cluster.json --interval-ms 500
//! ```

mod daemon;
mod snapshot;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info,taskexecd=debug,taskexec=debug";

#[derive(Parser)]
#[command(name = "taskexecd", about = "Task executor daemon")]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile periodically until interrupted.
    Run {
        /// TOML configuration file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Data directory for the discovery store.
        #[arg(long, default_value = "/var/lib/taskexec")]
        data_dir: PathBuf,

        /// Cluster snapshot (JSON with nodes, pods, jobs and inventory).
        #[arg(long)]
        snapshot: PathBuf,

        /// Tick interval in milliseconds, overriding the configuration.
        #[arg(long)]
        interval_ms: Option<u64>,
    },
    /// Run a single tick and print its report as JSON.
    Once {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long, default_value = "/var/lib/taskexec")]
        data_dir: PathBuf,

        #[arg(long)]
        snapshot: PathBuf,
    },
    /// Load a JSON seed file into the discovery store.
    Import {
        #[arg(long, default_value = "/var/lib/taskexec")]
        data_dir: PathBuf,

        /// Seed file with templates, workers, requests, versions and registry.
        file: PathBuf,
    },
    /// Print the latest stored reconcile report as JSON.
    Report {
        #[arg(long, default_value = "/var/lib/taskexec")]
        data_dir: PathBuf,
    },
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(DEFAULT_LOG_FILTER)?,
    };
    // stdout carries command output, logs go to stderr
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;

    match cli.command {
        Command::Run {
            config,
            data_dir,
            snapshot,
            interval_ms,
        } => {
            let mut config = daemon::load_config(config.as_deref())?;
            if let Some(interval_ms) = interval_ms {
                config.reconcile.interval_ms = interval_ms;
            }
            daemon::run(config, data_dir, snapshot).await
        }
        Command::Once {
            config,
            data_dir,
            snapshot,
        } => {
            let config = daemon::load_config(config.as_deref())?;
            daemon::run_once(config, data_dir, snapshot).await
        }
        Command::Import { data_dir, file } => daemon::import(data_dir, file),
        Command::Report { data_dir } => daemon::print_report(data_dir),
    }
}
