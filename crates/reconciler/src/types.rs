//! Reports returned by reconciliation cycles.

use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use classbook_catalog::EventKey;

/// Result of one refresh cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileResult {
    /// Events in the catalog after the merge.
    pub events: usize,
    /// Events dropped because their date has passed.
    pub pruned: usize,
    /// Partitions written back to the store.
    pub partitions_written: Vec<NaiveDate>,
    /// Partitions the store refused, with the reason.
    pub partitions_failed: Vec<(NaiveDate, String)>,
    /// Stale partitions removed from the store.
    pub stale_deleted: Vec<NaiveDate>,
}

impl ReconcileResult {
    /// Check if every partition write succeeded.
    pub fn all_written(&self) -> bool {
        self.partitions_failed.is_empty()
    }
}

/// Result of one registration tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// The catalog had not been loaded yet; nothing was done.
    pub skipped: bool,
    /// Events an attempt was started for.
    pub spawned: Vec<EventKey>,
    /// In-flight attempts that were cancelled.
    pub cancelled: Vec<EventKey>,
    /// Attempts in flight after the tick.
    pub in_flight: usize,
}

/// Result of one removal sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// The catalog had not been loaded yet; nothing was done.
    pub skipped: bool,
    /// Bookings dropped on the remote side.
    pub released: Vec<EventKey>,
    /// Bookings that could not be dropped, with the reason.
    pub failed: Vec<(EventKey, String)>,
    /// In-flight attempts that were cancelled.
    pub cancelled_attempts: Vec<EventKey>,
    /// Planned time until the next deadline worth waking for.
    pub next_wake: Duration,
}

/// Snapshot of the scheduler's bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStatus {
    /// Events with a live registration attempt.
    pub in_flight: Vec<EventKey>,
    /// Events whose registration was confirmed and not yet reaped.
    pub pending_cleanup: Vec<EventKey>,
    /// Events whose attempt was rejected or exhausted.
    pub settled: Vec<EventKey>,
}

impl RegistryStatus {
    /// Whether an attempt is running for `key`.
    pub fn is_in_flight(&self, key: &EventKey) -> bool {
        self.in_flight.contains(key)
    }

    /// Whether `key` has a confirmed registration awaiting the reaper.
    pub fn is_pending_cleanup(&self, key: &EventKey) -> bool {
        self.pending_cleanup.contains(key)
    }

    /// Whether `key` was given up on and will not be attempted again.
    pub fn is_settled(&self, key: &EventKey) -> bool {
        self.settled.contains(key)
    }
}
