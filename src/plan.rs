//! Offline view of what the scheduler would do with the stored state.

use std::fmt;
use std::time::Duration;

use chrono::NaiveDateTime;

use classbook_catalog::{Event, EventCatalog, EventKey, EventRow, SleepPlanner};

/// What the scheduler thinks of one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    /// Wanted, not booked: an attempt will run when the window opens.
    Pending { opens_at: NaiveDateTime },
    /// Wanted and booked.
    Booked,
    /// Booked but marked "x": the next sweep cancels it.
    UnwantedBooking,
    /// Not wanted, not booked.
    Idle,
}

impl EventStatus {
    fn of(event: &Event) -> Self {
        if event.awaits_registration() {
            Self::Pending {
                opens_at: event.registration_opens_at(),
            }
        } else if event.is_unwanted_booking() {
            Self::UnwantedBooking
        } else if event.is_booked() {
            Self::Booked
        } else {
            Self::Idle
        }
    }
}

/// One line of the plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub key: EventKey,
    pub description: String,
    pub starts_at: NaiveDateTime,
    pub status: EventStatus,
}

/// Status of every stored event plus the sweep's next wake-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub now: NaiveDateTime,
    pub entries: Vec<PlanEntry>,
    pub next_wake: Duration,
}

impl Plan {
    /// Build a plan from stored rows. Rows dated before `now` are left out.
    pub fn from_rows(rows: &[EventRow], now: NaiveDateTime, ceiling: Duration) -> Self {
        let mut catalog: EventCatalog = rows.iter().map(Event::from_row).collect();
        catalog.prune_before(now.date());

        let entries = catalog
            .iter()
            .map(|event| PlanEntry {
                key: event.key(),
                description: event.description.clone(),
                starts_at: event.starts_at(),
                status: EventStatus::of(event),
            })
            .collect();
        let next_wake = SleepPlanner::default().sweep_interval(&catalog, now, ceiling);

        Self {
            now,
            entries,
            next_wake,
        }
    }

    /// Entries still waiting for their registration window.
    pub fn pending(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries
            .iter()
            .filter(|entry| matches!(entry.status, EventStatus::Pending { .. }))
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "As of {}:", self.now.format("%Y-%m-%d %H:%M"))?;
        if self.entries.is_empty() {
            writeln!(f, "  no upcoming classes stored")?;
        }
        for entry in &self.entries {
            let status = match entry.status {
                EventStatus::Pending { opens_at } => {
                    format!("pending, window opens {}", opens_at.format("%Y-%m-%d %H:%M"))
                }
                EventStatus::Booked => "booked".to_string(),
                EventStatus::UnwantedBooking => "booked, will be cancelled".to_string(),
                EventStatus::Idle => "-".to_string(),
            };
            writeln!(
                f,
                "  {} {:<24} {}  {status}",
                entry.starts_at.format("%Y-%m-%d %H:%M"),
                entry.description,
                entry.key.event_id,
            )?;
        }
        let minutes = self.next_wake.as_secs() / 60;
        write!(f, "Next removal check in {}h{:02}m", minutes / 60, minutes % 60)
    }
}
