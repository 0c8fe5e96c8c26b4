//! Configuration loaded from `config.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use classbook_reconciler::{AttemptPolicy, LoopConfig, ReconcilerConfig};

/// Largest `days_ahead` the booking service accepts.
pub const MAX_DAYS_AHEAD: u32 = 14;

/// Configuration errors. Any of them aborts start-up.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file must end in .toml: {}", path.display())]
    WrongExtension { path: PathBuf },

    #[error("config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root for logs and, unless overridden, the desired-state store.
    #[serde(default = "default_persistent_storage")]
    pub persistent_storage: PathBuf,

    #[serde(default)]
    pub booking: BookingConfig,

    #[serde(default)]
    pub attempt: AttemptConfig,

    #[serde(default)]
    pub desired_state: DesiredStateConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            persistent_storage: default_persistent_storage(),
            booking: BookingConfig::default(),
            attempt: AttemptConfig::default(),
            desired_state: DesiredStateConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// `[booking]`: how far ahead to look and how often each loop runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingConfig {
    #[serde(default = "default_days_ahead")]
    pub days_ahead: u32,

    #[serde(default = "default_hours")]
    pub refresh_every_hours: f64,

    #[serde(default = "default_hours")]
    pub register_check_every_hours: f64,

    /// Ceiling for the removal sweep's adaptive sleep.
    #[serde(default = "default_hours")]
    pub removal_check_every_hours: f64,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            days_ahead: default_days_ahead(),
            refresh_every_hours: default_hours(),
            register_check_every_hours: default_hours(),
            removal_check_every_hours: default_hours(),
        }
    }
}

/// `[attempt]`: registration retry behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptConfig {
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default = "default_wake_early_ms")]
    pub wake_early_ms: u64,

    #[serde(default = "default_max_window_retries")]
    pub max_window_retries: u32,

    #[serde(default = "default_max_transient_retries")]
    pub max_transient_retries: u32,
}

impl Default for AttemptConfig {
    fn default() -> Self {
        Self {
            retry_backoff_ms: default_retry_backoff_ms(),
            wake_early_ms: default_wake_early_ms(),
            max_window_retries: default_max_window_retries(),
            max_transient_retries: default_max_transient_retries(),
        }
    }
}

impl AttemptConfig {
    /// As the scheduler's retry policy.
    pub const fn policy(&self) -> AttemptPolicy {
        AttemptPolicy {
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            wake_early: Duration::from_millis(self.wake_early_ms),
            max_window_retries: self.max_window_retries,
            max_transient_retries: self.max_transient_retries,
        }
    }
}

/// `[desired_state]`: where the per-date partitions live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredStateConfig {
    /// Defaults to `<persistent_storage>/desired`.
    #[serde(default)]
    pub directory: Option<PathBuf>,

    #[serde(default = "default_poll_minutes")]
    pub poll_every_minutes: f64,
}

impl Default for DesiredStateConfig {
    fn default() -> Self {
        Self {
            directory: None,
            poll_every_minutes: default_poll_minutes(),
        }
    }
}

/// `[logging]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter; `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Also write `<persistent_storage>/logs/<timestamp>.log`.
    #[serde(default = "default_log_file")]
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

impl AppConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if path.extension().is_none_or(|ext| ext != "toml") {
            return Err(ConfigError::WrongExtension {
                path: path.to_path_buf(),
            });
        }
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse without validating.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Check every value is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let days = self.booking.days_ahead;
        if !(1..=MAX_DAYS_AHEAD).contains(&days) {
            return Err(ConfigError::invalid(
                "booking.days_ahead",
                format!("{days} is outside 1..={MAX_DAYS_AHEAD}"),
            ));
        }
        self.loop_config().map(|_| ())
    }

    /// Directory holding the desired-state partitions.
    pub fn desired_state_dir(&self) -> PathBuf {
        self.desired_state
            .directory
            .clone()
            .unwrap_or_else(|| self.persistent_storage.join("desired"))
    }

    /// Directory for log files.
    pub fn log_dir(&self) -> PathBuf {
        self.persistent_storage.join("logs")
    }

    /// Convert to the loop's configuration.
    pub fn loop_config(&self) -> Result<LoopConfig, ConfigError> {
        let booking = &self.booking;
        let removal_ceiling = hours("booking.removal_check_every_hours", booking.removal_check_every_hours)?;

        Ok(LoopConfig {
            refresh_interval: hours("booking.refresh_every_hours", booking.refresh_every_hours)?,
            desired_sync_interval: hours(
                "desired_state.poll_every_minutes",
                self.desired_state.poll_every_minutes / 60.0,
            )?,
            register_check_interval: hours(
                "booking.register_check_every_hours",
                booking.register_check_every_hours,
            )?,
            removal_ceiling,
            reconciler: ReconcilerConfig {
                days_ahead: booking.days_ahead,
                ..ReconcilerConfig::default()
            },
            attempt: self.attempt.policy(),
            ..LoopConfig::default()
        })
    }
}

fn hours(field: &'static str, value: f64) -> Result<Duration, ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::invalid(field, format!("{value} must be positive and finite")));
    }
    Duration::try_from_secs_f64(value * 3600.0).map_err(|e| ConfigError::invalid(field, e.to_string()))
}

fn default_persistent_storage() -> PathBuf {
    PathBuf::from("./persist")
}

const fn default_days_ahead() -> u32 {
    7
}

const fn default_hours() -> f64 {
    1.0
}

const fn default_retry_backoff_ms() -> u64 {
    500
}

const fn default_wake_early_ms() -> u64 {
    5
}

const fn default_max_window_retries() -> u32 {
    240
}

const fn default_max_transient_retries() -> u32 {
    10
}

const fn default_poll_minutes() -> f64 {
    60.0
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_log_file() -> bool {
    true
}
