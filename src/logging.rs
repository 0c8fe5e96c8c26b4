//! Tracing setup: stdout plus an optional per-run log file.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

/// Log file name for a run started now, e.g. `2024-01-09_06-00-00.log`.
pub fn log_file_name() -> String {
    chrono::Local::now().format("%Y-%m-%d_%H-%M-%S.log").to_string()
}

/// Initialize tracing subscriber with environment filter.
///
/// `RUST_LOG` wins over `config.level`. When file logging is on, the
/// returned guard must be kept alive for the file to be flushed.
pub fn init_tracing(config: &LoggingConfig, log_dir: &Path) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .with_context(|| format!("Invalid log level '{}'", config.level))?;

    let (file_layer, guard) = if config.file {
        std::fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
        let appender = tracing_appender::rolling::never(log_dir, log_file_name());
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer().with_ansi(false).with_writer(writer);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
