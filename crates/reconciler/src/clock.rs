//! Wall-clock access.
//!
//! Every deadline in the scheduler is a local wall-clock time, while every
//! wait is a tokio sleep. [`TokioClock`] ties the two together so that tests
//! running on a paused runtime see wall-clock time move exactly as far as
//! the runtime's timers do.

use std::fmt;
use std::time::Duration;

use chrono::{Local, NaiveDate, NaiveDateTime, TimeDelta};
use tokio::time::Instant;

/// Source of the current local time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// The current local date and time.
    fn now(&self) -> NaiveDateTime;

    /// The current local date.
    fn today(&self) -> NaiveDate {
        self.now().date()
    }

    /// Time left until `at`; zero once `at` has passed.
    fn until(&self, at: NaiveDateTime) -> Duration {
        (at - self.now()).to_std().unwrap_or(Duration::ZERO)
    }
}

/// The machine's local clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock reading `anchor` plus whatever tokio's clock has advanced since
/// construction.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    anchor: NaiveDateTime,
    origin: Instant,
}

impl TokioClock {
    /// Start the clock at `anchor`.
    pub fn starting_at(anchor: NaiveDateTime) -> Self {
        Self {
            anchor,
            origin: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> NaiveDateTime {
        let elapsed = TimeDelta::from_std(self.origin.elapsed()).unwrap_or_default();
        self.anchor
            .checked_add_signed(elapsed)
            .unwrap_or(self.anchor)
    }
}
