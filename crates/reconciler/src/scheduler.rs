//! SchedulerActor - decides which registrations to attempt and which
//! bookings to drop.
//!
//! The actor owns three registries:
//!
//! - **in flight**: one live [`RegistrationAttempt`] per event at most
//! - **pending cleanup**: registrations confirmed by an attempt, kept until
//!   the reaper clears them. While an event is listed here no new attempt
//!   is started for it, and a later "cancel" from the user can still be
//!   honoured even if the catalog lost the registration id.
//! - **settled**: events whose attempt ended `Rejected` or `Exhausted`.
//!   They are not attempted again until the user unmarks them or they
//!   leave the catalog.
//!
//! Attempts run on their own tasks and report back with
//! [`SchedulerMessage::AttemptFinished`].

use std::collections::HashMap;
use std::time::Duration;

use chrono::NaiveDateTime;
use ractor::concurrency::JoinHandle;
use ractor::rpc::CallResult;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use classbook_catalog::{EventCatalog, EventKey, RegistrationId, SleepPlanner};

use crate::attempt::{AttemptContext, AttemptId, AttemptOutcome, AttemptState, RegistrationAttempt};
use crate::error::Error;
use crate::types::{RegistryStatus, SweepReport, TickReport};

const ACTOR_NAME: &str = "scheduler";

#[derive(Clone, Default)]
pub struct SchedulerActorDef;

/// Start-up arguments for the SchedulerActor.
#[derive(Clone)]
pub struct SchedulerArguments {
    pub ctx: AttemptContext,
    pub planner: SleepPlanner,
    /// Longest the removal sweep may sleep.
    pub removal_ceiling: Duration,
}

#[derive(Debug)]
struct LiveAttempt {
    id: AttemptId,
    cancel: CancellationToken,
}

/// A registration confirmed by an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmedRegistration {
    pub attempt: AttemptId,
    pub registration: RegistrationId,
    pub confirmed_at: NaiveDateTime,
}

pub struct SchedulerState {
    args: SchedulerArguments,
    in_flight: HashMap<EventKey, LiveAttempt>,
    pending_cleanup: HashMap<EventKey, ConfirmedRegistration>,
    settled: HashMap<EventKey, AttemptState>,
}

/// Messages for the SchedulerActor.
#[derive(Debug)]
pub enum SchedulerMessage {
    // COMMANDS
    /// An attempt reached a terminal state.
    AttemptFinished {
        key: EventKey,
        attempt: AttemptId,
        outcome: AttemptOutcome,
    },

    // QUERIES
    /// Sync desired state, then start and cancel attempts.
    Tick {
        reply: RpcReplyPort<Result<TickReport, Error>>,
    },

    /// Sync desired state, then drop unwanted bookings and plan the next
    /// wake-up.
    Sweep {
        reply: RpcReplyPort<Result<SweepReport, Error>>,
    },

    /// Clear the pending-cleanup registry. Replies with how many entries
    /// were dropped.
    Reap { reply: RpcReplyPort<usize> },

    /// Current registries.
    Status { reply: RpcReplyPort<RegistryStatus> },
}

impl Actor for SchedulerActorDef {
    type Msg = SchedulerMessage;
    type State = SchedulerState;
    type Arguments = SchedulerArguments;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        info!(
            removal_ceiling_secs = args.removal_ceiling.as_secs(),
            "SchedulerActor starting"
        );
        Ok(SchedulerState {
            args,
            in_flight: HashMap::new(),
            pending_cleanup: HashMap::new(),
            settled: HashMap::new(),
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SchedulerMessage::AttemptFinished {
                key,
                attempt,
                outcome,
            } => state.finish_attempt(key, attempt, &outcome),

            SchedulerMessage::Tick { reply } => {
                let _ = reply.send(state.tick(&myself).await);
            }

            SchedulerMessage::Sweep { reply } => {
                let _ = reply.send(state.sweep().await);
            }

            SchedulerMessage::Reap { reply } => {
                let _ = reply.send(state.reap());
            }

            SchedulerMessage::Status { reply } => {
                let _ = reply.send(state.status());
            }
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        for attempt in state.in_flight.values() {
            attempt.cancel.cancel();
        }
        info!(
            cancelled = state.in_flight.len(),
            pending_cleanup = state.pending_cleanup.len(),
            settled = state.settled.len(),
            "SchedulerActor stopped"
        );
        state.in_flight.clear();
        Ok(())
    }
}

impl SchedulerState {
    async fn sync_desired_state(&self) {
        let ctx = &self.args.ctx;
        ctx.catalog.sync_desired_state(ctx.source.as_ref()).await;
    }

    async fn tick(&mut self, myself: &ActorRef<SchedulerMessage>) -> Result<TickReport, Error> {
        self.sync_desired_state().await;
        let snapshot = self.args.ctx.catalog.snapshot().await?;
        if !snapshot.loaded {
            debug!("Catalog not loaded yet, skipping tick");
            return Ok(TickReport {
                skipped: true,
                ..TickReport::default()
            });
        }
        let catalog = snapshot.catalog;
        let mut report = TickReport::default();

        report.cancelled = self.cancel_unwanted_attempts(&catalog);
        self.forget_unwanted_settled(&catalog);

        for event in catalog.awaiting_registration() {
            let key = event.key();
            if self.in_flight.contains_key(&key) || self.settled.contains_key(&key) {
                continue;
            }
            if let Some(registration) = self.pending_cleanup.get(&key).map(|c| c.registration) {
                // Confirmed here but lost by the catalog; put it back.
                debug!(event = %key, %registration, "Restoring confirmed registration");
                self.args
                    .ctx
                    .catalog
                    .set_registration(key, Some(registration))
                    .await?;
                continue;
            }

            let cancel = CancellationToken::new();
            let attempt = RegistrationAttempt::new(event.clone(), self.args.ctx.clone(), cancel.clone());
            let id = attempt.id();
            let reporter = myself.clone();
            tokio::spawn(async move {
                let outcome = attempt.run().await;
                let _ = reporter.send_message(SchedulerMessage::AttemptFinished {
                    key,
                    attempt: id,
                    outcome,
                });
            });

            self.in_flight.insert(key, LiveAttempt { id, cancel });
            report.spawned.push(key);
        }

        report.in_flight = self.in_flight.len();
        if !report.spawned.is_empty() || !report.cancelled.is_empty() {
            info!(
                spawned = report.spawned.len(),
                cancelled = report.cancelled.len(),
                in_flight = report.in_flight,
                "Registration tick"
            );
        }
        Ok(report)
    }

    /// Cancel attempts whose event is no longer wanted or no longer listed.
    fn cancel_unwanted_attempts(&mut self, catalog: &EventCatalog) -> Vec<EventKey> {
        let unwanted: Vec<EventKey> = self
            .in_flight
            .keys()
            .filter(|key| {
                catalog
                    .get(key)
                    .is_none_or(|event| !event.desired_state.wants_booking())
            })
            .copied()
            .collect();

        for key in &unwanted {
            if let Some(attempt) = self.in_flight.remove(key) {
                attempt.cancel.cancel();
                info!(event = %key, attempt = %attempt.id, "Registration attempt cancelled");
            }
        }
        unwanted
    }

    /// Settled events the user unmarked, or that left the catalog, may be
    /// attempted again later.
    fn forget_unwanted_settled(&mut self, catalog: &EventCatalog) {
        self.settled.retain(|key, _| {
            catalog
                .get(key)
                .is_some_and(|event| event.desired_state.wants_booking())
        });
    }

    fn finish_attempt(&mut self, key: EventKey, attempt: AttemptId, outcome: &AttemptOutcome) {
        let current = self
            .in_flight
            .get(&key)
            .is_some_and(|live| live.id == attempt);
        if current {
            self.in_flight.remove(&key);
        }

        if current && matches!(outcome.state(), AttemptState::Rejected | AttemptState::Exhausted) {
            info!(event = %key, state = %outcome.state(), "Registration given up");
            self.settled.insert(key, outcome.state());
        }

        if let Some(registration) = outcome.registration() {
            self.pending_cleanup.insert(
                key,
                ConfirmedRegistration {
                    attempt,
                    registration,
                    confirmed_at: self.args.ctx.clock.now(),
                },
            );
        }

        debug!(event = %key, %attempt, state = %outcome.state(), current, "Attempt reported");
    }

    async fn sweep(&mut self) -> Result<SweepReport, Error> {
        let ceiling = self.args.removal_ceiling;
        self.sync_desired_state().await;
        let snapshot = self.args.ctx.catalog.snapshot().await?;
        if !snapshot.loaded {
            debug!("Catalog not loaded yet, skipping sweep");
            return Ok(SweepReport {
                skipped: true,
                next_wake: ceiling,
                ..SweepReport::default()
            });
        }
        let mut catalog = snapshot.catalog;
        let mut report = SweepReport {
            cancelled_attempts: self.cancel_unwanted_attempts(&catalog),
            ..SweepReport::default()
        };

        let mut to_release: Vec<(EventKey, RegistrationId)> = catalog
            .unwanted_bookings()
            .filter_map(|event| event.registration_id.map(|registration| (event.key(), registration)))
            .collect();

        // Confirmed by an attempt but unknown to the catalog.
        to_release.extend(self.pending_cleanup.iter().filter_map(|(key, confirmed)| {
            catalog
                .get(key)
                .filter(|event| !event.desired_state.wants_booking() && !event.is_booked())
                .map(|_| (*key, confirmed.registration))
        }));

        for (key, registration) in to_release {
            match self.release(key, registration).await {
                Ok(()) => {
                    catalog.set_registration(&key, None);
                    report.released.push(key);
                }
                Err(e) => {
                    warn!(event = %key, %registration, error = %e, "Failed to cancel booking");
                    report.failed.push((key, e.to_string()));
                }
            }
        }

        report.next_wake = self.args.planner.next_wake(&catalog, self.args.ctx.clock.now(), ceiling);
        info!(
            released = report.released.len(),
            failed = report.failed.len(),
            next_wake_secs = report.next_wake.as_secs(),
            "Removal sweep"
        );
        Ok(report)
    }

    /// Cancel one booking remotely, then clear it everywhere.
    async fn release(&mut self, key: EventKey, registration: RegistrationId) -> Result<(), Error> {
        let ctx = &self.args.ctx;
        ctx.client.cancel(registration).await?;
        info!(event = %key, %registration, "Booking cancelled");

        self.pending_cleanup.remove(&key);
        ctx.catalog.release_registration(key, registration).await?;
        if let Err(e) = ctx.catalog.write_through(ctx.source.as_ref(), key.occurs_on).await {
            warn!(event = %key, error = %e, "Failed to persist cancellation");
        }
        Ok(())
    }

    fn reap(&mut self) -> usize {
        let reaped = self.pending_cleanup.len();
        self.pending_cleanup.clear();
        if reaped > 0 {
            info!(reaped, "Pending cleanup cleared");
        }
        reaped
    }

    fn status(&self) -> RegistryStatus {
        let mut in_flight: Vec<EventKey> = self.in_flight.keys().copied().collect();
        let mut pending_cleanup: Vec<EventKey> = self.pending_cleanup.keys().copied().collect();
        let mut settled: Vec<EventKey> = self.settled.keys().copied().collect();
        in_flight.sort();
        pending_cleanup.sort();
        settled.sort();
        RegistryStatus {
            in_flight,
            pending_cleanup,
            settled,
        }
    }
}

/// Typed access to a running SchedulerActor.
#[derive(Clone)]
pub struct SchedulerHandle {
    actor: ActorRef<SchedulerMessage>,
}

impl SchedulerHandle {
    /// Spawn a SchedulerActor.
    pub async fn spawn(args: SchedulerArguments) -> Result<(Self, JoinHandle<()>), Error> {
        let (actor, handle) = Actor::spawn(None, SchedulerActorDef, args)
            .await
            .map_err(|e| Error::spawn_failed(ACTOR_NAME, e.to_string()))?;
        Ok((Self { actor }, handle))
    }

    /// Run one registration tick.
    pub async fn tick(&self) -> Result<TickReport, Error> {
        self.query(|reply| SchedulerMessage::Tick { reply }).await?
    }

    /// Run one removal sweep.
    pub async fn sweep(&self) -> Result<SweepReport, Error> {
        self.query(|reply| SchedulerMessage::Sweep { reply }).await?
    }

    /// Clear the pending-cleanup registry.
    pub async fn reap(&self) -> Result<usize, Error> {
        self.query(|reply| SchedulerMessage::Reap { reply }).await
    }

    /// Current registries.
    pub async fn status(&self) -> Result<RegistryStatus, Error> {
        self.query(|reply| SchedulerMessage::Status { reply }).await
    }

    /// Stop the actor, cancelling every in-flight attempt.
    pub fn stop(&self) {
        self.actor.stop(None);
    }

    async fn query<T>(&self, build: impl FnOnce(RpcReplyPort<T>) -> SchedulerMessage) -> Result<T, Error>
    where
        T: Send + 'static,
    {
        match self.actor.call(build, None).await {
            Ok(CallResult::Success(value)) => Ok(value),
            Ok(_) | Err(_) => Err(Error::actor_unavailable(ACTOR_NAME)),
        }
    }
}
