//! # classbook
//!
//! Command-line entry point.
//!
//! Every command loads and validates the configuration first; a bad
//! configuration stops the process with a clear error before anything else
//! happens.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};

use classbook::{AppConfig, DirectoryStateSource, Plan};
use classbook_catalog::parse_date;
use classbook_reconciler::{Clock, DesiredStateSource, SystemClock};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    let _log_guard = classbook::logging::init_tracing(&config.logging, &config.log_dir())?;
    debug!(config = %cli.config.display(), "Configuration loaded");

    match cli.command {
        Commands::Check => check(&config),
        Commands::Plan => plan(&config).await,
        Commands::Rows { date } => rows(&config, &date).await,
    }
}

fn check(config: &AppConfig) -> Result<()> {
    let loop_config = config.loop_config()?;
    info!("Configuration is valid");

    println!("persistent storage   {}", config.persistent_storage.display());
    println!("desired state        {}", config.desired_state_dir().display());
    println!("days ahead           {}", config.booking.days_ahead);
    println!("refresh every        {:?}", loop_config.refresh_interval);
    println!("register check every {:?}", loop_config.register_check_interval);
    println!("removal check within {:?}", loop_config.removal_ceiling);
    println!("desired sync every   {:?}", loop_config.desired_sync_interval);
    println!(
        "retry backoff        {:?} (window {}x, transient {}x)",
        loop_config.attempt.retry_backoff,
        loop_config.attempt.max_window_retries,
        loop_config.attempt.max_transient_retries
    );
    Ok(())
}

async fn plan(config: &AppConfig) -> Result<()> {
    let source = DirectoryStateSource::new(config.desired_state_dir());
    let rows = source
        .read_all()
        .await
        .with_context(|| format!("Failed to read {}", source.dir().display()))?;
    let ceiling = config.loop_config()?.removal_ceiling;

    let plan = Plan::from_rows(&rows, SystemClock.now(), ceiling);
    info!(events = plan.entries.len(), "Plan built");
    println!("{plan}");
    Ok(())
}

async fn rows(config: &AppConfig, raw_date: &str) -> Result<()> {
    let date = parse_date(raw_date).with_context(|| format!("Invalid date '{raw_date}'"))?;
    let source = DirectoryStateSource::new(config.desired_state_dir());

    let rows = source
        .partition(date)
        .await
        .with_context(|| format!("Failed to read partition {date}"))?
        .with_context(|| format!("No partition stored for {date}"))?;
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}
