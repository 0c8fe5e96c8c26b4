//! The event catalog: every known event instance keyed by `(event id, date)`.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use itertools::Itertools;

use crate::types::{Event, EventKey, EventListing, EventRow, RegistrationId};

/// All known events, keyed by their natural key.
///
/// Pure data: the catalog never performs I/O. Ordering of the underlying map
/// carries no meaning beyond making iteration deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventCatalog {
    events: BTreeMap<EventKey, Event>,
    /// Registrations cancelled with the service. Stale rows and listings
    /// still naming one of them must not bring it back.
    released: BTreeMap<EventKey, RegistrationId>,
}

impl EventCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Look up one event.
    pub fn get(&self, key: &EventKey) -> Option<&Event> {
        self.events.get(key)
    }

    /// Whether an event is known.
    pub fn contains(&self, key: &EventKey) -> bool {
        self.events.contains_key(key)
    }

    /// Insert or replace an event, returning the previous entry.
    pub fn insert(&mut self, event: Event) -> Option<Event> {
        self.events.insert(event.key(), event)
    }

    /// Iterate over all events.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.values()
    }

    /// Left-join a fresh pull against this catalog.
    ///
    /// The result holds exactly the listed events. Each keeps the desired
    /// state and registration this catalog had for the same key; keys the
    /// catalog never saw start out as `WantCancelled` and unbooked.
    pub fn merge_listings(&self, listings: impl IntoIterator<Item = EventListing>) -> Self {
        let mut merged: Self = listings
            .into_iter()
            .map(|mut listing| {
                let key = listing.key();
                if self.was_released(&key, listing.registration_id) {
                    listing.registration_id = None;
                }
                Event::from_listing(listing, self.events.get(&key))
            })
            .collect();
        merged.released = self.released.clone();
        merged
    }

    /// Overlay stored rows onto known events. Rows for unknown keys are
    /// ignored. Returns how many events were touched.
    ///
    /// A row naming a registration that was released keeps only its
    /// desired state.
    pub fn apply_rows<'a>(&mut self, rows: impl IntoIterator<Item = &'a EventRow>) -> usize {
        let mut touched = 0;
        for row in rows {
            let key = row.key();
            let stale = self.was_released(&key, row.registration());
            if let Some(event) = self.events.get_mut(&key) {
                if stale {
                    event.desired_state = row.registered;
                } else {
                    event.apply_row(row);
                }
                touched += 1;
            }
        }
        touched
    }

    /// Drop every event dated strictly before `today`. Returns how many were
    /// removed.
    pub fn prune_before(&mut self, today: NaiveDate) -> usize {
        let before = self.events.len();
        self.events.retain(|key, _| key.occurs_on >= today);
        self.released.retain(|key, _| key.occurs_on >= today);
        before.saturating_sub(self.events.len())
    }

    /// Set or clear the registration of one event. Returns `false` when the
    /// key is unknown.
    pub fn set_registration(&mut self, key: &EventKey, registration: Option<RegistrationId>) -> bool {
        self.events
            .get_mut(key)
            .map(|event| event.registration_id = registration)
            .is_some()
    }

    /// Clear a registration that was cancelled with the service and
    /// remember it, so rows or listings read before the cancellation cannot
    /// restore it. Returns `false` when the key is unknown.
    pub fn release_registration(&mut self, key: &EventKey, registration: RegistrationId) -> bool {
        self.released.insert(*key, registration);
        self.set_registration(key, None)
    }

    /// Whether `registration` was released for `key`.
    pub fn was_released(&self, key: &EventKey, registration: Option<RegistrationId>) -> bool {
        registration.is_some() && self.released.get(key).copied() == registration
    }

    /// Stored rows for one date.
    pub fn rows_on(&self, date: NaiveDate) -> Vec<EventRow> {
        self.events
            .values()
            .filter(|event| event.occurs_on == date)
            .map(Event::to_row)
            .collect_vec()
    }

    /// Stored rows grouped by date, limited to `from..=to`.
    pub fn partitions(&self, from: NaiveDate, to: NaiveDate) -> BTreeMap<NaiveDate, Vec<EventRow>> {
        self.events
            .values()
            .filter(|event| (from..=to).contains(&event.occurs_on))
            .map(|event| (event.occurs_on, event.to_row()))
            .into_group_map()
            .into_iter()
            .collect()
    }

    /// Events wanted but not booked yet.
    pub fn awaiting_registration(&self) -> impl Iterator<Item = &Event> {
        self.events.values().filter(|event| event.awaits_registration())
    }

    /// Events booked but no longer wanted.
    pub fn unwanted_bookings(&self) -> impl Iterator<Item = &Event> {
        self.events.values().filter(|event| event.is_unwanted_booking())
    }

    /// Events holding a booking.
    pub fn booked(&self) -> impl Iterator<Item = &Event> {
        self.events.values().filter(|event| event.is_booked())
    }
}

impl FromIterator<Event> for EventCatalog {
    fn from_iter<I: IntoIterator<Item = Event>>(iter: I) -> Self {
        Self {
            events: iter.into_iter().map(|event| (event.key(), event)).collect(),
            released: BTreeMap::new(),
        }
    }
}
