//! Timed registration attempts.
//!
//! One attempt books one class instance. It sleeps until the registration
//! window opens, then calls the booking service until it gets a definite
//! answer:
//!
//! ```text
//! Waiting --window opens--> Attempting --ok--------------> Confirmed
//!    |                          |--class full-------------> Rejected
//!    |                          |--retries used up--------> Exhausted
//!    +------cancelled-----------+-----------cancelled-----> Cancelled
//! ```
//!
//! A confirmed registration is written to the catalog and then to the
//! date's desired-state partition before the attempt reports back.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use classbook_catalog::{Event, RegistrationId};

use crate::booking::BookingClient;
use crate::clock::Clock;
use crate::error::RegisterError;
use crate::source::DesiredStateSource;
use crate::store::CatalogHandle;

/// Identifies one attempt, so a late report from a superseded attempt can
/// be told apart from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptId(Uuid);

impl AttemptId {
    /// Create a fresh id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where an attempt is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttemptState {
    /// Sleeping until the registration window opens.
    Waiting,
    /// Calling the booking service.
    Attempting,
    /// Booked.
    Confirmed,
    /// The class is full.
    Rejected,
    /// Stopped from outside.
    Cancelled,
    /// Retry budget used up without a definite answer.
    Exhausted,
}

impl AttemptState {
    /// Whether the attempt has finished.
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Waiting | Self::Attempting)
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Waiting => "waiting",
            Self::Attempting => "attempting",
            Self::Confirmed => "confirmed",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
            Self::Exhausted => "exhausted",
        };
        write!(f, "{s}")
    }
}

/// How an attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Booked under this registration.
    Confirmed(RegistrationId),
    /// The class is full.
    Rejected,
    /// Stopped from outside before a definite answer.
    Cancelled,
    /// Gave up after `calls` refused calls.
    Exhausted {
        calls: u32,
        last_error: RegisterError,
    },
}

impl AttemptOutcome {
    /// The terminal state this outcome corresponds to.
    pub const fn state(&self) -> AttemptState {
        match self {
            Self::Confirmed(_) => AttemptState::Confirmed,
            Self::Rejected => AttemptState::Rejected,
            Self::Cancelled => AttemptState::Cancelled,
            Self::Exhausted { .. } => AttemptState::Exhausted,
        }
    }

    /// The registration, when booked.
    pub const fn registration(&self) -> Option<RegistrationId> {
        match self {
            Self::Confirmed(registration) => Some(*registration),
            _ => None,
        }
    }
}

/// Timing and retry limits for attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptPolicy {
    /// Pause between refused calls.
    pub retry_backoff: Duration,
    /// Wake this much before the window opens, then sleep out the rest.
    pub wake_early: Duration,
    /// Retries allowed after "window not open" answers.
    pub max_window_retries: u32,
    /// Retries allowed after any other failure.
    pub max_transient_retries: u32,
}

impl Default for AttemptPolicy {
    fn default() -> Self {
        Self {
            retry_backoff: Duration::from_millis(500),
            wake_early: Duration::from_millis(5),
            max_window_retries: 240,
            max_transient_retries: 10,
        }
    }
}

/// Everything an attempt talks to.
#[derive(Clone)]
pub struct AttemptContext {
    pub client: Arc<dyn BookingClient>,
    pub source: Arc<dyn DesiredStateSource>,
    pub catalog: CatalogHandle,
    pub clock: Arc<dyn Clock>,
    pub policy: AttemptPolicy,
}

/// One timed registration for one class instance.
pub struct RegistrationAttempt {
    id: AttemptId,
    event: Event,
    ctx: AttemptContext,
    cancel: CancellationToken,
    state: AttemptState,
}

impl RegistrationAttempt {
    /// Create an attempt for `event`. It stops early once `cancel` fires.
    pub fn new(event: Event, ctx: AttemptContext, cancel: CancellationToken) -> Self {
        Self {
            id: AttemptId::new(),
            event,
            ctx,
            cancel,
            state: AttemptState::Waiting,
        }
    }

    /// This attempt's id.
    pub const fn id(&self) -> AttemptId {
        self.id
    }

    /// Current state.
    pub const fn state(&self) -> AttemptState {
        self.state
    }

    /// Drive the attempt to a terminal state.
    pub async fn run(mut self) -> AttemptOutcome {
        info!(
            attempt = %self.id,
            event = %self.event.key(),
            description = %self.event.description,
            opens_at = %self.event.registration_opens_at(),
            "Registration attempt scheduled"
        );

        let outcome = if self.wait_for_window().await {
            self.state = AttemptState::Attempting;
            self.register().await
        } else {
            AttemptOutcome::Cancelled
        };
        self.state = outcome.state();

        info!(
            attempt = %self.id,
            event = %self.event.key(),
            state = %self.state,
            "Registration attempt finished"
        );
        outcome
    }

    /// Sleep until the window opens. Returns `false` if cancelled first.
    ///
    /// The first sleep ends `wake_early` before the opening; whatever is left
    /// is slept out after re-reading the clock, so no call is ever made
    /// before the window opens.
    async fn wait_for_window(&self) -> bool {
        let clock = self.ctx.clock.as_ref();
        let opens_at = self.event.registration_opens_at();

        let first = clock.until(opens_at).saturating_sub(self.ctx.policy.wake_early);
        if !first.is_zero() && !self.pause(first).await {
            return false;
        }

        loop {
            let remaining = clock.until(opens_at);
            if remaining.is_zero() {
                return !self.cancel.is_cancelled();
            }
            if !self.pause(remaining).await {
                return false;
            }
        }
    }

    async fn register(&self) -> AttemptOutcome {
        let policy = self.ctx.policy;
        let key = self.event.key();
        let mut window_refusals = 0_u32;
        let mut transient_failures = 0_u32;

        loop {
            if self.cancel.is_cancelled() {
                return AttemptOutcome::Cancelled;
            }

            match self.ctx.client.register(key.event_id, key.occurs_on).await {
                Ok(registration) => {
                    self.record(registration).await;
                    return AttemptOutcome::Confirmed(registration);
                }
                Err(RegisterError::EventFull) => {
                    warn!(attempt = %self.id, event = %key, "Class is full");
                    return AttemptOutcome::Rejected;
                }
                Err(RegisterError::WindowNotOpen) => {
                    window_refusals = window_refusals.saturating_add(1);
                    debug!(attempt = %self.id, event = %key, window_refusals, "Window not open yet");
                    if window_refusals > policy.max_window_retries {
                        return AttemptOutcome::Exhausted {
                            calls: window_refusals.saturating_add(transient_failures),
                            last_error: RegisterError::WindowNotOpen,
                        };
                    }
                }
                Err(RegisterError::Other(reason)) => {
                    transient_failures = transient_failures.saturating_add(1);
                    warn!(
                        attempt = %self.id,
                        event = %key,
                        transient_failures,
                        reason = %reason,
                        "Registration call failed"
                    );
                    if transient_failures > policy.max_transient_retries {
                        return AttemptOutcome::Exhausted {
                            calls: window_refusals.saturating_add(transient_failures),
                            last_error: RegisterError::Other(reason),
                        };
                    }
                }
            }

            if !self.pause(policy.retry_backoff).await {
                return AttemptOutcome::Cancelled;
            }
        }
    }

    /// Store a confirmed registration in the catalog, then in the store.
    async fn record(&self, registration: RegistrationId) {
        let key = self.event.key();
        info!(attempt = %self.id, event = %key, %registration, "Registered");

        match self.ctx.catalog.set_registration(key, Some(registration)).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(event = %key, "Event left the catalog before its registration was recorded");
                return;
            }
            Err(e) => {
                warn!(event = %key, error = %e, "Failed to record registration");
                return;
            }
        }

        if let Err(e) = self
            .ctx
            .catalog
            .write_through(self.ctx.source.as_ref(), key.occurs_on)
            .await
        {
            warn!(event = %key, error = %e, "Failed to persist registration");
        }
    }

    /// Sleep for `duration`. Returns `false` if cancelled first.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(duration) => true,
        }
    }
}
