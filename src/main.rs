//! questbot command line entry point
//!
//! Loads the configuration, keys and proxies, runs every account through
//! the quest pipeline and writes the statistics report.

// Compiler warning configuration
#![deny(unused_imports)]
#![deny(unused_mut)]
#![deny(unused_variables)]
#![warn(dead_code)]
#![warn(unused_must_use)]

use anyhow::{Context, Result};
use clap::Parser;
use questbot::config::Config;
use questbot::endpoints;
use questbot::report::{CsvReportSink, ReportSink};
use questbot::retry::cancel_pair;
use questbot::scheduler::{collect_reports, AccountPool, LiveLauncher};
use questbot::wallet::{build_profiles, load_proxies, KeyFileStore, SecretStore};
use questbot::RunMode;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "questbot.toml", env = "QUESTBOT_CONFIG")]
    config: PathBuf,

    /// What each account run does
    #[arg(short, long, value_enum, default_value_t = RunMode::Tasks)]
    mode: RunMode,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Override `accounts.keys_file`
    #[arg(long, env = "QUESTBOT_KEYS")]
    keys: Option<PathBuf>,

    /// Override `accounts.proxies_file`
    #[arg(long, env = "QUESTBOT_PROXIES")]
    proxies: Option<PathBuf>,

    /// Override `accounts.report_file`
    #[arg(long, env = "QUESTBOT_REPORT")]
    report: Option<PathBuf>,

    /// Serve `/metrics` and `/health` on this port
    #[arg(long, env = "QUESTBOT_METRICS_PORT")]
    metrics_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.json_logs)?;

    info!(version = env!("CARGO_PKG_VERSION"), mode = ?args.mode, "Starting questbot");

    let mut config = Config::from_file_with_env(&args.config)?;
    if let Some(keys) = args.keys {
        config.accounts.keys_file = keys;
    }
    if let Some(proxies) = args.proxies {
        config.accounts.proxies_file = proxies;
    }
    if let Some(report) = args.report {
        config.accounts.report_file = report;
    }
    config.validate().context("Invalid configuration")?;
    info!(
        network = %config.network,
        chain_id = config.network.chain_id,
        tasks = config.tasks.len(),
        "Configuration loaded"
    );

    let keys = KeyFileStore::new(&config.accounts.keys_file).load_keys()?;
    let proxies = load_proxies(&config.accounts.proxies_file)?;
    let profiles = build_profiles(keys, proxies)?;
    if profiles.is_empty() {
        warn!(path = %config.accounts.keys_file.display(), "No accounts to run");
        return Ok(());
    }
    info!(accounts = profiles.len(), "Accounts loaded");

    if let Some(port) = args.metrics_port {
        tokio::spawn(async move {
            if let Err(e) = endpoints::endpoint_server(port).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    let (cancel_handle, cancel) = cancel_pair();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupt received, stopping accounts");
                cancel_handle.cancel();
            }
            Err(e) => error!("Failed to listen for interrupt: {}", e),
        }
    });

    let config = Arc::new(config);
    let pool = AccountPool::from_config(&config, cancel);
    let launcher = Arc::new(LiveLauncher::new(config.clone(), args.mode));
    let outcomes = pool.run(profiles, launcher).await;

    let reports = collect_reports(&outcomes);
    CsvReportSink::new(&config.accounts.report_file).write(&reports)?;

    let failed = outcomes.iter().filter(|o| o.status() == "failed").count();
    info!(
        accounts = outcomes.len(),
        failed,
        report = %config.accounts.report_file.display(),
        "Run finished"
    );
    Ok(())
}

/// Initialize logging subsystem
fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let env_filter = if verbose {
        "questbot=debug,info"
    } else {
        "questbot=info,warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| env_filter.into());

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }

    Ok(())
}
