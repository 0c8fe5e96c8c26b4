//! Error types for the reconciler crate.
//!
//! Failures at the collaborator boundary are typed so the scheduler can
//! choose a policy per kind without inspecting message text:
//!
//! - [`RegisterError`] - outcome of a refused registration
//! - [`ClientError`] - any other booking service failure
//! - [`SourceError`] - desired-state store failure
//!
//! [`Error`] wraps them for the crate's own operations.

use chrono::NaiveDate;
use thiserror::Error;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Why the booking service refused a registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterError {
    /// No places left. Permanent: never retried.
    #[error("class is full")]
    EventFull,

    /// The service has not opened the window yet. Expected right at the
    /// boundary; retried after a short backoff.
    #[error("registration window is not open yet")]
    WindowNotOpen,

    /// Anything else. Treated as transient and retried a bounded number of
    /// times.
    #[error("registration failed: {0}")]
    Other(String),
}

impl RegisterError {
    /// Text the booking service answers with when a class has no places left.
    pub const FULL_MARKER: &'static str = "השיעור התמלא";

    /// Text the booking service answers with before the window opens.
    pub const NOT_OPEN_MARKER: &'static str = "הרשמה לשיעור תיפתח ביום";

    /// Classify a raw failure message from the booking service.
    ///
    /// For use by client adapters; the scheduler only sees the typed kinds.
    pub fn from_remote_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.contains(Self::FULL_MARKER) {
            Self::EventFull
        } else if message.contains(Self::NOT_OPEN_MARKER) {
            Self::WindowNotOpen
        } else {
            Self::Other(message)
        }
    }

    /// Whether retrying can never help.
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::EventFull)
    }
}

/// A booking service call failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("booking service error: {message}")]
pub struct ClientError {
    /// What went wrong, as reported by the adapter.
    pub message: String,
}

impl ClientError {
    /// Create a client error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The desired-state store failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// Reading rows failed.
    #[error("failed to read desired state: {reason}")]
    ReadFailed { reason: String },

    /// Writing one date partition failed.
    #[error("failed to write partition {date}: {reason}")]
    WriteFailed { date: NaiveDate, reason: String },

    /// Deleting one date partition failed.
    #[error("failed to delete partition {date}: {reason}")]
    DeleteFailed { date: NaiveDate, reason: String },
}

impl SourceError {
    /// Create a read error.
    pub fn read_failed(reason: impl Into<String>) -> Self {
        Self::ReadFailed {
            reason: reason.into(),
        }
    }

    /// Create a write error.
    pub fn write_failed(date: NaiveDate, reason: impl Into<String>) -> Self {
        Self::WriteFailed {
            date,
            reason: reason.into(),
        }
    }

    /// Create a delete error.
    pub fn delete_failed(date: NaiveDate, reason: impl Into<String>) -> Self {
        Self::DeleteFailed {
            date,
            reason: reason.into(),
        }
    }
}

/// Reconciler error types.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Booking service failure.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Desired-state store failure.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// An actor did not answer (stopped or dropped the reply).
    #[error("actor '{actor}' unavailable")]
    ActorUnavailable { actor: String },

    /// An actor could not be started.
    #[error("failed to spawn actor '{actor}': {reason}")]
    SpawnFailed { actor: String, reason: String },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    /// Create an actor unavailable error.
    pub fn actor_unavailable(actor: impl Into<String>) -> Self {
        Self::ActorUnavailable {
            actor: actor.into(),
        }
    }

    /// Create a spawn failed error.
    pub fn spawn_failed(actor: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            actor: actor.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}
