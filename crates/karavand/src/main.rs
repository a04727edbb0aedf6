//! karavand: the Karavan status store daemon.
//!
//! Starts the status store on the configured backend and keeps a readiness
//! monitor running, or performs a single maintenance action:
//! - `run`: start, monitor readiness until Ctrl-C
//! - `health`: start once and print the health check result
//! - `clear-statuses`: wipe the status caches
//! - `last-commit`: print the last recorded commit
//!
//! # Usage
//!
//! ```text
//! karavand --config /etc/karavan/karavan.toml run
//! karavand --remote-url http://infinispan:11222 health
//! ```

mod setup;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use karavan_health::ReadinessMonitor;

use crate::setup::Overrides;

const DEFAULT_LOG_FILTER: &str = "info,karavand=debug,karavan=debug";

#[derive(Parser)]
#[command(name = "karavand", about = "Karavan status store daemon")]
struct Cli {
    /// Path to karavan.toml. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Embedded store directory (overrides [store] data_dir).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Remote cache server URL; selects remote mode.
    #[arg(long, global = true)]
    remote_url: Option<String>,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
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
    /// Start the store and monitor readiness until Ctrl-C.
    Run,
    /// Start the store once and print the health check.
    Health,
    /// Clear every status cache.
    ClearStatuses,
    /// Print the last recorded commit.
    LastCommit,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let overrides = Overrides {
        data_dir: cli.data_dir.clone(),
        remote_url: cli.remote_url.clone(),
    };
    let config = setup::load_config(cli.config.as_deref(), &overrides)?;
    let controller = Arc::new(setup::build_controller(&config)?);

    match cli.command {
        Command::Run => {
            controller.start().await?;
            let monitor = ReadinessMonitor::new(
                controller.clone(),
                config.health_interval(),
                config.health.unhealthy_threshold,
            );
            monitor.start().await;

            tokio::signal::ctrl_c().await?;
            info!("shutdown signal received");
            monitor.stop().await;
            info!("karavan daemon stopped");
        }
        Command::Health => {
            // A failed start is reported through the health check.
            if let Err(e) = controller.start().await {
                error!(error = %e, "start failed");
            }
            let report = controller.health().await;
            println!("{report}");
            if !report.is_up() {
                anyhow::bail!("status store is {}", controller.state());
            }
        }
        Command::ClearStatuses => {
            let store = controller.start().await?;
            store.clear_all_statuses().await?;
            println!("status caches cleared");
        }
        Command::LastCommit => {
            let store = controller.start().await?;
            let last = store.get_last_commit().await?;
            println!("{} {}", last.commit_id, last.time);
        }
    }

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
