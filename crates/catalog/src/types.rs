//! Core types for the catalog crate.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Row value meaning "not currently booked".
pub const UNREGISTERED: i64 = -1;

/// Registration opens this many hours before a class starts.
pub const REGISTRATION_LEAD_HOURS: i64 = 24;

/// Remote identifier of a class.
///
/// The same id recurs on every date the class is held; pair it with the date
/// through [`EventKey`] to address one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(i64);

impl EventId {
    /// Wrap a remote class id.
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw id.
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle of a confirmed booking, as issued by the booking service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrationId(i64);

impl RegistrationId {
    /// Wrap a remote registration id.
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw id.
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Interpret a stored row value. The sentinel (and anything below it)
    /// means "not booked".
    pub const fn from_row_value(value: i64) -> Option<Self> {
        if value > UNREGISTERED {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Encode an optional registration as a row value.
    pub const fn to_row_value(registration: Option<Self>) -> i64 {
        match registration {
            Some(id) => id.0,
            None => UNREGISTERED,
        }
    }
}

impl std::fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the user wants for one event.
///
/// Stored in rows as a single token: `v` to book, `x` to cancel. Anything
/// else, including an empty cell, reads as a cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DesiredState {
    /// Book the event as soon as registration opens.
    WantBooked,
    /// Do not hold a booking for the event.
    #[default]
    WantCancelled,
}

impl DesiredState {
    /// Row token for [`DesiredState::WantBooked`].
    pub const BOOK_TOKEN: &'static str = "v";
    /// Row token for [`DesiredState::WantCancelled`].
    pub const CANCEL_TOKEN: &'static str = "x";

    /// Parse a row token.
    pub fn from_token(token: &str) -> Self {
        if token.trim().eq_ignore_ascii_case(Self::BOOK_TOKEN) {
            Self::WantBooked
        } else {
            Self::WantCancelled
        }
    }

    /// Row token for this state.
    pub const fn token(self) -> &'static str {
        match self {
            Self::WantBooked => Self::BOOK_TOKEN,
            Self::WantCancelled => Self::CANCEL_TOKEN,
        }
    }

    /// Whether the user wants a booking.
    pub const fn wants_booking(self) -> bool {
        matches!(self, Self::WantBooked)
    }
}

impl From<String> for DesiredState {
    fn from(token: String) -> Self {
        Self::from_token(&token)
    }
}

impl From<DesiredState> for String {
    fn from(state: DesiredState) -> Self {
        state.token().to_string()
    }
}

impl std::fmt::Display for DesiredState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WantBooked => write!(f, "want-booked"),
            Self::WantCancelled => write!(f, "want-cancelled"),
        }
    }
}

/// Natural key of one event instance: the class id on a given date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventKey {
    /// Remote class id.
    pub event_id: EventId,
    /// Date of this instance.
    pub occurs_on: NaiveDate,
}

impl EventKey {
    /// Create a key.
    pub const fn new(event_id: EventId, occurs_on: NaiveDate) -> Self {
        Self {
            event_id,
            occurs_on,
        }
    }
}

impl std::fmt::Display for EventKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.event_id, self.occurs_on)
    }
}

/// An event as listed by the booking service.
///
/// Listings carry remote fields only. A listing names a registration id when
/// the service itself reports an active booking for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventListing {
    pub event_id: EventId,
    pub occurs_on: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub description: String,
    #[serde(default)]
    pub location_name: String,
    #[serde(default)]
    pub instructor_name: String,
    #[serde(default)]
    pub capacity: u32,
    #[serde(default)]
    pub enrolled: u32,
    #[serde(default)]
    pub registration_id: Option<RegistrationId>,
}

impl EventListing {
    /// Create a listing with empty display fields.
    pub fn new(
        event_id: EventId,
        occurs_on: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        description: impl Into<String>,
    ) -> Self {
        Self {
            event_id,
            occurs_on,
            start_time,
            end_time,
            description: description.into(),
            location_name: String::new(),
            instructor_name: String::new(),
            capacity: 0,
            enrolled: 0,
            registration_id: None,
        }
    }

    /// Set location and instructor.
    #[must_use]
    pub fn with_venue(mut self, location: impl Into<String>, instructor: impl Into<String>) -> Self {
        self.location_name = location.into();
        self.instructor_name = instructor.into();
        self
    }

    /// Set capacity and current enrolment.
    #[must_use]
    pub const fn with_occupancy(mut self, capacity: u32, enrolled: u32) -> Self {
        self.capacity = capacity;
        self.enrolled = enrolled;
        self
    }

    /// Mark the listing as already booked by the user.
    #[must_use]
    pub const fn with_registration(mut self, registration_id: RegistrationId) -> Self {
        self.registration_id = Some(registration_id);
        self
    }

    /// Natural key of the listed instance.
    pub const fn key(&self) -> EventKey {
        EventKey::new(self.event_id, self.occurs_on)
    }
}

/// A known event, combining remote fields with the user's intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: EventId,
    pub occurs_on: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub description: String,
    pub location_name: String,
    pub instructor_name: String,
    pub capacity: u32,
    pub enrolled: u32,
    pub desired_state: DesiredState,
    pub registration_id: Option<RegistrationId>,
}

impl Event {
    /// Build the catalog entry for a fresh listing.
    ///
    /// Remote fields always come from the listing. Desired state and
    /// registration are carried over from `prior` unless the listing supplies
    /// a registration itself.
    pub fn from_listing(listing: EventListing, prior: Option<&Self>) -> Self {
        let desired_state = prior.map_or(DesiredState::default(), |p| p.desired_state);
        let registration_id = listing
            .registration_id
            .or_else(|| prior.and_then(|p| p.registration_id));

        Self {
            event_id: listing.event_id,
            occurs_on: listing.occurs_on,
            start_time: listing.start_time,
            end_time: listing.end_time,
            description: listing.description,
            location_name: listing.location_name,
            instructor_name: listing.instructor_name,
            capacity: listing.capacity,
            enrolled: listing.enrolled,
            desired_state,
            registration_id,
        }
    }

    /// Rebuild an event from a stored row. Fields rows do not carry stay empty.
    pub fn from_row(row: &EventRow) -> Self {
        Self {
            event_id: row.id,
            occurs_on: row.date_request,
            start_time: row.start_time,
            end_time: row.end_time,
            description: row.description.clone(),
            location_name: String::new(),
            instructor_name: String::new(),
            capacity: 0,
            enrolled: 0,
            desired_state: row.registered,
            registration_id: row.registration(),
        }
    }

    /// Natural key of this instance.
    pub const fn key(&self) -> EventKey {
        EventKey::new(self.event_id, self.occurs_on)
    }

    /// Local date and time the class starts.
    pub fn starts_at(&self) -> NaiveDateTime {
        self.occurs_on.and_time(self.start_time)
    }

    /// Local date and time the registration window opens.
    pub fn registration_opens_at(&self) -> NaiveDateTime {
        self.starts_at() - TimeDelta::hours(REGISTRATION_LEAD_HOURS)
    }

    /// Whether the remote side holds a booking for the user.
    pub const fn is_booked(&self) -> bool {
        self.registration_id.is_some()
    }

    /// Wanted but not booked yet.
    pub const fn awaits_registration(&self) -> bool {
        self.desired_state.wants_booking() && !self.is_booked()
    }

    /// Booked but no longer wanted.
    pub const fn is_unwanted_booking(&self) -> bool {
        !self.desired_state.wants_booking() && self.is_booked()
    }

    /// Overlay the user's intent from a stored row.
    ///
    /// The desired state always follows the row. A row only sets the
    /// registration when it holds one; an empty row cell never erases a
    /// booking the catalog knows about.
    pub fn apply_row(&mut self, row: &EventRow) {
        self.desired_state = row.registered;
        if let Some(registration) = row.registration() {
            self.registration_id = Some(registration);
        }
    }

    /// Encode as a stored row.
    pub fn to_row(&self) -> EventRow {
        EventRow {
            id: self.event_id,
            date_request: self.occurs_on,
            description: self.description.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            registered: self.desired_state,
            registration_id: RegistrationId::to_row_value(self.registration_id),
        }
    }
}

/// One row of the desired-state store.
///
/// Field names follow the spreadsheet headers (`id`, `dateRequest`,
/// `registered`, `registrationId`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRow {
    pub id: EventId,
    pub date_request: NaiveDate,
    #[serde(default)]
    pub description: String,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    #[serde(default)]
    pub registered: DesiredState,
    #[serde(default = "unregistered")]
    pub registration_id: i64,
}

impl EventRow {
    /// Natural key of the row.
    pub const fn key(&self) -> EventKey {
        EventKey::new(self.id, self.date_request)
    }

    /// Registration stored in the row, if any.
    pub const fn registration(&self) -> Option<RegistrationId> {
        RegistrationId::from_row_value(self.registration_id)
    }
}

const fn unregistered() -> i64 {
    UNREGISTERED
}

/// Parse a `YYYY-MM-DD` date.
///
/// # Errors
///
/// Returns [`Error::InvalidDate`] when the text is not a calendar date.
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| Error::invalid_date(raw))
}

/// Parse an `HH:MM` (or `HH:MM:SS`) time of day.
///
/// # Errors
///
/// Returns [`Error::InvalidTime`] when the text is not a time of day.
pub fn parse_time(raw: &str) -> Result<NaiveTime> {
    let trimmed = raw.trim();
    NaiveTime::parse_from_str(trimmed, hhmm::FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .map_err(|_| Error::invalid_time(raw))
}

/// Serialization helper for times of day as `HH:MM`.
mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub const FORMAT: &str = "%H:%M";

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&time.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_time(&raw).map_err(D::Error::custom)
    }
}
