//! classbook - books capacity-limited classes the moment registration opens.
//!
//! The scheduling engine lives in `classbook-reconciler`; this crate adds
//! what a deployment needs around it:
//!
//! - [`config`] - `config.toml` loading and validation
//! - [`store`] - a directory-backed desired-state store
//! - [`logging`] - stdout and per-run file logging
//! - [`plan`] - an offline view of what the scheduler would do

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod config;
pub mod logging;
pub mod plan;
pub mod store;

pub use config::{AppConfig, ConfigError};
pub use plan::{EventStatus, Plan, PlanEntry};
pub use store::DirectoryStateSource;
