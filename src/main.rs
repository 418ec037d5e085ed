use anyhow::Context;
use clap::{Parser, Subcommand};
use csi_cache_gc::app::{self, GcConfig};
use csi_cache_gc::GcReport;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Reclaim disk space left behind in the CSI driver's tenant cache
#[derive(Parser)]
#[command(name = "csi-cache-gc")]
#[command(about = "Node-local garbage collector for the CSI driver cache", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to configuration file
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Root cache directory (overrides config and CSI_GC_ROOT_DIR)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Report what would be removed without removing anything
    #[arg(long, global = true)]
    dry_run: bool,

    /// Print each pass report as JSON instead of a summary line
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single collection pass (default command)
    Run,
    /// Run collection passes periodically until interrupted
    Watch {
        /// Time between passes, e.g. "30s" or "5m"
        #[arg(long, value_parser = app::config::parse_duration)]
        interval: Option<Duration>,
    },
}

#[tokio::main]
async fn main() {
    let mut cli = Cli::parse();
    app::init_logging(cli.verbose);

    let command = cli.command.take().unwrap_or(Commands::Run);
    if let Err(e) = run(command, &cli).await {
        app::handle_fatal_error(e, cli.verbose);
    }
}

async fn run(command: Commands, cli: &Cli) -> anyhow::Result<()> {
    let mut config = GcConfig::load(cli.config.as_deref())
        .await
        .context("Failed to load configuration")?;
    if let Some(root) = &cli.root {
        config = config.with_root_dir(root.clone());
    }
    if cli.dry_run {
        config = config.with_dry_run(true);
    }

    let cleaner = app::build_cleaner(&config);
    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    match command {
        Commands::Run => {
            let report = app::run_once(&cleaner, &cancel).await?;
            print_report(&report, cli.json)?;
        }
        Commands::Watch { interval } => {
            if let Some(interval) = interval {
                config = config.with_interval(interval);
            }
            app::run_periodic(&cleaner, &config, &cancel, |report| {
                if let Err(e) = print_report(report, cli.json) {
                    warn!("Failed to print report: {}", e);
                }
            })
            .await;
        }
    }

    Ok(())
}

fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, stopping after the current tenant");
                cancel.cancel();
            }
            Err(e) => warn!("Failed to listen for interrupt: {}", e),
        }
    });
}

fn print_report(report: &GcReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{}", report.summary());
        for failure in &report.stats.failures {
            println!("  failed: {failure}");
        }
    }
    Ok(())
}
