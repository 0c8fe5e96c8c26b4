//! Booking service boundary.

use async_trait::async_trait;
use chrono::NaiveDate;

use classbook_catalog::{EventId, EventListing, RegistrationId};

use crate::error::{ClientError, RegisterError};

/// Remote operations the scheduler relies on.
///
/// Authentication, transport and the mapping of raw remote answers to
/// [`RegisterError`] kinds are the implementation's business.
#[async_trait]
pub trait BookingClient: Send + Sync {
    /// List the classes held over the next `days_ahead` days.
    async fn list_upcoming_events(&self, days_ahead: u32) -> Result<Vec<EventListing>, ClientError>;

    /// Book one class instance for the user.
    async fn register(
        &self,
        event_id: EventId,
        occurs_on: NaiveDate,
    ) -> Result<RegistrationId, RegisterError>;

    /// Drop a confirmed booking.
    async fn cancel(&self, registration_id: RegistrationId) -> Result<(), ClientError>;
}
