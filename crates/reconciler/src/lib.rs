//! Reconciliation loop and timed registration scheduler.
//!
//! Keeps a user's class bookings in line with what they asked for in the
//! desired-state store:
//!
//! - **Desired state**: a `v`/`x` mark per class, kept in per-date partitions
//! - **Actual state**: what the booking service lists and has booked
//! - **Refresh**: merge the two into the catalog and write it back
//! - **Tick**: start a timed [`RegistrationAttempt`] for each wanted class
//! - **Sweep**: cancel bookings the user no longer wants
//!
//! # Key Concepts
//!
//! ## Registration attempts
//!
//! Registration opens exactly 24 hours before a class starts. Each attempt
//! sleeps until then and keeps calling the booking service until it books
//! the class, finds it full, runs out of retries or is cancelled.
//!
//! ## Actors
//!
//! The catalog is owned by one actor and the attempt registries by another,
//! so concurrent cycles never see half-applied updates.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use classbook_reconciler::{
//!     InMemoryDesiredStateSource, LoopConfig, ReconciliationLoop, SystemClock,
//! };
//!
//! #[tokio::main]
//! async fn main() -> classbook_reconciler::Result<()> {
//!     let client = Arc::new(MyBookingClient::login().await?);
//!     let source = Arc::new(InMemoryDesiredStateSource::new());
//!
//!     let running = ReconciliationLoop::start(
//!         client,
//!         source,
//!         Arc::new(SystemClock),
//!         LoopConfig::default(),
//!     )
//!     .await?;
//!
//!     let stopper = running.stopper();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         stopper.stop();
//!     });
//!     running.run_until_stopped().await;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod attempt;
pub mod booking;
pub mod clock;
pub mod error;
pub mod r#loop;
pub mod reconciler;
pub mod scheduler;
pub mod source;
pub mod store;
pub mod types;

// Re-export main types
pub use attempt::{AttemptContext, AttemptId, AttemptOutcome, AttemptPolicy, AttemptState, RegistrationAttempt};
pub use booking::BookingClient;
pub use clock::{Clock, SystemClock, TokioClock};
pub use error::{ClientError, Error, RegisterError, Result, SourceError};
pub use r#loop::{LoopConfig, LoopStopper, ReconciliationLoop};
pub use reconciler::{Reconciler, ReconcilerBuilder, ReconcilerConfig};
pub use scheduler::{ConfirmedRegistration, SchedulerArguments, SchedulerHandle};
pub use source::{DesiredStateSource, InMemoryDesiredStateSource};
pub use store::{CatalogHandle, CatalogSnapshot, MergeOutcome};
pub use types::{ReconcileResult, RegistryStatus, SweepReport, TickReport};
