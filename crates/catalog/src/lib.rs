//! Event catalog for classbook.
//!
//! Holds what is known about upcoming classes and what the user wants done
//! with each of them:
//!
//! - [`EventListing`] - a class as the booking service lists it
//! - [`EventRow`] - a class as the desired-state store keeps it
//! - [`Event`] - the merged view the scheduler works from
//! - [`EventCatalog`] - every known [`Event`], keyed by `(event id, date)`
//! - [`SleepPlanner`] - how long the removal sweep may sleep
//!
//! Nothing in this crate performs I/O or reads the clock; callers pass `now`
//! and `today` explicitly.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod catalog;
pub mod error;
pub mod planner;
pub mod types;

// Re-export main types
pub use catalog::EventCatalog;
pub use error::{Error, Result};
pub use planner::SleepPlanner;
pub use types::{
    DesiredState, Event, EventId, EventKey, EventListing, EventRow, REGISTRATION_LEAD_HOURS,
    RegistrationId, UNREGISTERED, parse_date, parse_time,
};
