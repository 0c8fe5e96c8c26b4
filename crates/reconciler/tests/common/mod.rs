//! Shared fixtures for scheduler tests.
//!
//! Every test runs on a paused tokio clock anchored at 2024-01-09 06:00, so
//! a class at 2024-01-10 07:00 opens for registration one hour in.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use classbook_catalog::{
    DesiredState, Event, EventCatalog, EventId, EventKey, EventListing, EventRow, RegistrationId,
    SleepPlanner,
};
use classbook_reconciler::{
    AttemptContext, AttemptPolicy, BookingClient, CatalogHandle, ClientError, Clock,
    DesiredStateSource, Error, InMemoryDesiredStateSource, Reconciler, ReconcilerConfig,
    RegisterError, SchedulerArguments, SchedulerHandle, TokioClock,
};

pub const HOUR: Duration = Duration::from_secs(3600);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn anchor() -> NaiveDateTime {
    date(9).and_time(time(6, 0))
}

pub fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, day).unwrap_or_default()
}

pub fn time(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default()
}

/// A 45 minute class.
pub fn listing(id: i64, day: u32, hour: u32) -> EventListing {
    EventListing::new(
        EventId::new(id),
        date(day),
        time(hour, 0),
        time(hour, 45),
        "HIIT",
    )
}

/// The class most tests book: 2024-01-10 07:00.
pub fn e1() -> EventListing {
    listing(1001, 10, 7)
}

pub fn row(listing: &EventListing, desired: DesiredState, registration: Option<i64>) -> EventRow {
    let mut row = Event::from_listing(listing.clone(), None).to_row();
    row.registered = desired;
    row.registration_id = registration.unwrap_or(classbook_catalog::UNREGISTERED);
    row
}

pub fn wanted(listing: &EventListing) -> EventRow {
    row(listing, DesiredState::WantBooked, None)
}

/// One recorded `register` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterCall {
    pub key: EventKey,
    pub at: NaiveDateTime,
}

/// Booking service double with scripted answers.
///
/// `register` pops the next scripted answer and falls back to
/// `fallback` once the script is empty.
pub struct ScriptedClient {
    clock: TokioClock,
    listings: Mutex<Result<Vec<EventListing>, ClientError>>,
    script: Mutex<VecDeque<Result<RegistrationId, RegisterError>>>,
    fallback: Mutex<Result<RegistrationId, RegisterError>>,
    cancel_failure: Mutex<Option<ClientError>>,
    register_calls: Mutex<Vec<RegisterCall>>,
    cancel_calls: Mutex<Vec<RegistrationId>>,
}

impl ScriptedClient {
    pub fn new(clock: TokioClock, listings: Vec<EventListing>) -> Self {
        Self {
            clock,
            listings: Mutex::new(Ok(listings)),
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Err(RegisterError::WindowNotOpen)),
            cancel_failure: Mutex::new(None),
            register_calls: Mutex::new(Vec::new()),
            cancel_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn script(&self, answers: impl IntoIterator<Item = Result<RegistrationId, RegisterError>>) {
        lock(&self.script).extend(answers);
    }

    pub fn set_fallback(&self, answer: Result<RegistrationId, RegisterError>) {
        *lock(&self.fallback) = answer;
    }

    pub fn set_listings(&self, listings: Result<Vec<EventListing>, ClientError>) {
        *lock(&self.listings) = listings;
    }

    pub fn fail_cancels(&self, error: Option<ClientError>) {
        *lock(&self.cancel_failure) = error;
    }

    pub fn register_calls(&self) -> Vec<RegisterCall> {
        lock(&self.register_calls).clone()
    }

    pub fn cancel_calls(&self) -> Vec<RegistrationId> {
        lock(&self.cancel_calls).clone()
    }
}

#[async_trait]
impl BookingClient for ScriptedClient {
    async fn list_upcoming_events(&self, _days_ahead: u32) -> Result<Vec<EventListing>, ClientError> {
        lock(&self.listings).clone()
    }

    async fn register(
        &self,
        event_id: EventId,
        occurs_on: NaiveDate,
    ) -> Result<RegistrationId, RegisterError> {
        lock(&self.register_calls).push(RegisterCall {
            key: EventKey::new(event_id, occurs_on),
            at: self.clock.now(),
        });
        let next = lock(&self.script).pop_front();
        next.unwrap_or_else(|| lock(&self.fallback).clone())
    }

    async fn cancel(&self, registration_id: RegistrationId) -> Result<(), ClientError> {
        if let Some(error) = lock(&self.cancel_failure).clone() {
            return Err(error);
        }
        lock(&self.cancel_calls).push(registration_id);
        Ok(())
    }
}

/// Actors and collaborators wired together, driven by hand.
pub struct Harness {
    pub clock: TokioClock,
    pub client: Arc<ScriptedClient>,
    pub source: Arc<InMemoryDesiredStateSource>,
    pub catalog: CatalogHandle,
    pub scheduler: SchedulerHandle,
    pub reconciler: Reconciler,
}

impl Harness {
    pub async fn new(listings: Vec<EventListing>, rows: Vec<EventRow>) -> Result<Self, Error> {
        Self::with_policy(listings, rows, AttemptPolicy::default(), 6 * HOUR).await
    }

    pub async fn with_policy(
        listings: Vec<EventListing>,
        rows: Vec<EventRow>,
        policy: AttemptPolicy,
        removal_ceiling: Duration,
    ) -> Result<Self, Error> {
        let clock = TokioClock::starting_at(anchor());
        let client = Arc::new(ScriptedClient::new(clock, listings));
        let source = Arc::new(InMemoryDesiredStateSource::with_rows(rows));
        let (catalog, _catalog_actor) = CatalogHandle::spawn(EventCatalog::new()).await?;

        let shared_client: Arc<dyn BookingClient> = client.clone();
        let shared_source: Arc<dyn DesiredStateSource> = source.clone();
        let shared_clock: Arc<dyn Clock> = Arc::new(clock);

        let (scheduler, _scheduler_actor) = SchedulerHandle::spawn(SchedulerArguments {
            ctx: AttemptContext {
                client: shared_client.clone(),
                source: shared_source.clone(),
                catalog: catalog.clone(),
                clock: shared_clock.clone(),
                policy,
            },
            planner: SleepPlanner::default(),
            removal_ceiling,
        })
        .await?;

        let reconciler = Reconciler::new(
            shared_client,
            shared_source,
            catalog.clone(),
            shared_clock,
            ReconcilerConfig::default(),
        );

        Ok(Self {
            clock,
            client,
            source,
            catalog,
            scheduler,
            reconciler,
        })
    }

    /// Let paused time run forward, then wait until no attempt is in
    /// flight (or give up after a simulated day).
    pub async fn advance_until_idle(&self, first: Duration) -> Result<(), Error> {
        tokio::time::sleep(first).await;
        for _ in 0..24 * 60 {
            if self.scheduler.status().await?.in_flight.is_empty() {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        Ok(())
    }

    pub async fn stop(self) {
        self.scheduler.stop();
        self.catalog.stop();
        tokio::task::yield_now().await;
    }
}
