//! Wake-up planning for the removal sweep.
//!
//! The sweep has nothing to do most of the time. Instead of polling on a
//! fixed tick it sleeps until shortly before the next moment something can
//! change: the last sensible point to drop a booked class, or the opening of
//! a registration window.

use std::time::Duration;

use chrono::{NaiveDateTime, TimeDelta};

use crate::catalog::EventCatalog;

/// Computes how long the removal sweep may idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepPlanner {
    /// Wake this long before a booked class starts.
    pub cancellation_lead: TimeDelta,
    /// Wake this long before a wanted class's registration window opens.
    pub registration_lead: TimeDelta,
}

impl Default for SleepPlanner {
    fn default() -> Self {
        Self {
            cancellation_lead: TimeDelta::hours(3),
            registration_lead: TimeDelta::minutes(5),
        }
    }
}

impl SleepPlanner {
    /// Time until the next deadline the sweep should be awake for.
    ///
    /// Booked classes take priority: if any booked class still has its
    /// cancellation point ahead, the nearest one decides. Otherwise the
    /// nearest upcoming registration window of a wanted class decides. With
    /// neither, the result is `ceiling`. Deadlines already behind `now` are
    /// skipped, so a class starting within the lead time never pins the
    /// result to zero.
    pub fn next_wake(&self, catalog: &EventCatalog, now: NaiveDateTime, ceiling: Duration) -> Duration {
        let cancellation = nearest_ahead(
            catalog
                .booked()
                .map(|event| event.starts_at() - self.cancellation_lead),
            now,
        );

        let deadline = cancellation.or_else(|| {
            nearest_ahead(
                catalog
                    .awaiting_registration()
                    .map(|event| event.registration_opens_at() - self.registration_lead),
                now,
            )
        });

        deadline.map_or(ceiling, |at| (at - now).to_std().unwrap_or(Duration::ZERO))
    }

    /// How long the sweep sleeps: the planned wake, capped at `ceiling`.
    pub fn sweep_interval(&self, catalog: &EventCatalog, now: NaiveDateTime, ceiling: Duration) -> Duration {
        self.next_wake(catalog, now, ceiling).min(ceiling)
    }
}

fn nearest_ahead(
    deadlines: impl Iterator<Item = NaiveDateTime>,
    now: NaiveDateTime,
) -> Option<NaiveDateTime> {
    deadlines.filter(|at| *at > now).min()
}
