//! Error types for the catalog crate.

use thiserror::Error;

/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while reading catalog data from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A calendar date could not be parsed.
    #[error("invalid date '{raw}': expected YYYY-MM-DD")]
    InvalidDate { raw: String },

    /// A time of day could not be parsed.
    #[error("invalid time '{raw}': expected HH:MM")]
    InvalidTime { raw: String },
}

impl Error {
    /// Create an invalid date error.
    pub fn invalid_date(raw: impl Into<String>) -> Self {
        Self::InvalidDate { raw: raw.into() }
    }

    /// Create an invalid time error.
    pub fn invalid_time(raw: impl Into<String>) -> Self {
        Self::InvalidTime { raw: raw.into() }
    }
}
