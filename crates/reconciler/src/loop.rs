//! Reconciliation loop runner.
//!
//! Starts the two actors and five periodic tasks, all stopped by one
//! cancellation token:
//!
//! | task    | period                                   |
//! |---------|------------------------------------------|
//! | refresh | `refresh_interval`                       |
//! | sync    | `desired_sync_interval`                  |
//! | tick    | `register_check_interval`                |
//! | sweep   | `min(removal_ceiling, planned next wake)`|
//! | reaper  | `reap_interval`                          |
//!
//! The tick and sweep tasks wait for the first completed refresh before
//! their first cycle.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use ractor::concurrency::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use classbook_catalog::{EventCatalog, SleepPlanner};

use crate::attempt::{AttemptContext, AttemptPolicy};
use crate::booking::BookingClient;
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::reconciler::{Reconciler, ReconcilerConfig};
use crate::scheduler::{SchedulerArguments, SchedulerHandle};
use crate::source::DesiredStateSource;
use crate::store::CatalogHandle;

/// Configuration for the reconciliation loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopConfig {
    /// Time between refreshes.
    pub refresh_interval: Duration,
    /// Time between desired-state syncs outside of ticks and sweeps.
    pub desired_sync_interval: Duration,
    /// Time between registration ticks.
    pub register_check_interval: Duration,
    /// Longest the removal sweep sleeps.
    pub removal_ceiling: Duration,
    /// Time between pending-cleanup reaps.
    pub reap_interval: Duration,
    /// Poll period while waiting for the first refresh.
    pub load_poll_interval: Duration,
    pub reconciler: ReconcilerConfig,
    pub attempt: AttemptPolicy,
    pub planner: SleepPlanner,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(3600),
            desired_sync_interval: Duration::from_secs(3600),
            register_check_interval: Duration::from_secs(3600),
            removal_ceiling: Duration::from_secs(3600),
            reap_interval: Duration::from_secs(30 * 60),
            load_poll_interval: Duration::from_secs(20),
            reconciler: ReconcilerConfig::default(),
            attempt: AttemptPolicy::default(),
            planner: SleepPlanner::default(),
        }
    }
}

impl LoopConfig {
    /// Check that every period is positive.
    pub fn validate(&self) -> Result<()> {
        let periods = [
            ("refresh_interval", self.refresh_interval),
            ("desired_sync_interval", self.desired_sync_interval),
            ("register_check_interval", self.register_check_interval),
            ("removal_ceiling", self.removal_ceiling),
            ("reap_interval", self.reap_interval),
            ("load_poll_interval", self.load_poll_interval),
        ];
        match periods.iter().find(|(_, period)| period.is_zero()) {
            Some((name, _)) => Err(Error::invalid_config(format!("{name} must be positive"))),
            None => Ok(()),
        }
    }
}

/// Stops a running [`ReconciliationLoop`] from anywhere.
#[derive(Debug, Clone)]
pub struct LoopStopper {
    token: CancellationToken,
}

impl LoopStopper {
    /// Ask every task to stop.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Whether a stop was requested.
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once a stop was requested.
    pub async fn stopped(&self) {
        self.token.cancelled().await;
    }
}

/// A running scheduler: two actors and five periodic tasks.
pub struct ReconciliationLoop {
    catalog: CatalogHandle,
    scheduler: SchedulerHandle,
    token: CancellationToken,
    tasks: Vec<tokio::task::JoinHandle<()>>,
    actors: Vec<JoinHandle<()>>,
}

impl ReconciliationLoop {
    /// Spawn the actors and start every loop.
    pub async fn start(
        client: Arc<dyn BookingClient>,
        source: Arc<dyn DesiredStateSource>,
        clock: Arc<dyn Clock>,
        config: LoopConfig,
    ) -> Result<Self> {
        config.validate()?;

        let (catalog, catalog_actor) = CatalogHandle::spawn(EventCatalog::new()).await?;
        let ctx = AttemptContext {
            client: client.clone(),
            source: source.clone(),
            catalog: catalog.clone(),
            clock: clock.clone(),
            policy: config.attempt,
        };
        let (scheduler, scheduler_actor) = SchedulerHandle::spawn(SchedulerArguments {
            ctx,
            planner: config.planner,
            removal_ceiling: config.removal_ceiling,
        })
        .await?;

        let reconciler = Arc::new(Reconciler::new(
            client,
            source.clone(),
            catalog.clone(),
            clock,
            config.reconciler,
        ));
        let token = CancellationToken::new();

        let tasks = vec![
            tokio::spawn(refresh_loop(reconciler, config, token.clone())),
            tokio::spawn(sync_loop(catalog.clone(), source, config, token.clone())),
            tokio::spawn(tick_loop(catalog.clone(), scheduler.clone(), config, token.clone())),
            tokio::spawn(sweep_loop(catalog.clone(), scheduler.clone(), config, token.clone())),
            tokio::spawn(reap_loop(scheduler.clone(), config, token.clone())),
        ];

        info!(
            refresh_secs = config.refresh_interval.as_secs(),
            register_check_secs = config.register_check_interval.as_secs(),
            removal_ceiling_secs = config.removal_ceiling.as_secs(),
            "Reconciliation loop started"
        );

        Ok(Self {
            catalog,
            scheduler,
            token,
            tasks,
            actors: vec![catalog_actor, scheduler_actor],
        })
    }

    /// A handle that stops this loop.
    pub fn stopper(&self) -> LoopStopper {
        LoopStopper {
            token: self.token.clone(),
        }
    }

    /// The catalog actor.
    pub fn catalog(&self) -> &CatalogHandle {
        &self.catalog
    }

    /// The scheduler actor.
    pub fn scheduler(&self) -> &SchedulerHandle {
        &self.scheduler
    }

    /// Wait for a stop request, then shut down.
    pub async fn run_until_stopped(self) {
        self.token.cancelled().await;
        self.shutdown().await;
    }

    /// Stop every task, cancel in-flight attempts and stop the actors.
    pub async fn shutdown(self) {
        self.token.cancel();
        join_all(self.tasks).await;

        self.scheduler.stop();
        self.catalog.stop();
        join_all(self.actors).await;
        info!("Reconciliation loop stopped");
    }
}

/// Sleep for `period`. Returns `false` if stopped first.
async fn sleep_or_stop(token: &CancellationToken, period: Duration) -> bool {
    tokio::select! {
        biased;
        () = token.cancelled() => false,
        () = tokio::time::sleep(period) => true,
    }
}

/// Run `step` until stopped.
async fn every<F, Fut>(token: &CancellationToken, mut step: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Duration>,
{
    while !token.is_cancelled() {
        let period = step().await;
        if !sleep_or_stop(token, period).await {
            break;
        }
    }
}

/// Block until the first refresh completed. Returns `false` if stopped
/// first.
async fn wait_for_catalog(catalog: &CatalogHandle, poll: Duration, token: &CancellationToken) -> bool {
    loop {
        match catalog.snapshot().await {
            Ok(snapshot) if snapshot.loaded => return true,
            Ok(_) => debug!("Waiting for the first refresh"),
            Err(e) => error!(error = %e, "Catalog unavailable"),
        }
        if !sleep_or_stop(token, poll).await {
            return false;
        }
    }
}

async fn refresh_loop(reconciler: Arc<Reconciler>, config: LoopConfig, token: CancellationToken) {
    every(&token, || {
        let reconciler = reconciler.clone();
        async move {
            if let Err(e) = reconciler.refresh().await {
                error!(error = %e, "Refresh failed, skipping cycle");
            }
            config.refresh_interval
        }
    })
    .await;
    debug!("Refresh loop stopped");
}

async fn sync_loop(
    catalog: CatalogHandle,
    source: Arc<dyn DesiredStateSource>,
    config: LoopConfig,
    token: CancellationToken,
) {
    while sleep_or_stop(&token, config.desired_sync_interval).await {
        catalog.sync_desired_state(source.as_ref()).await;
    }
    debug!("Desired-state sync stopped");
}

async fn tick_loop(
    catalog: CatalogHandle,
    scheduler: SchedulerHandle,
    config: LoopConfig,
    token: CancellationToken,
) {
    if !wait_for_catalog(&catalog, config.load_poll_interval, &token).await {
        return;
    }
    every(&token, || {
        let scheduler = scheduler.clone();
        async move {
            if let Err(e) = scheduler.tick().await {
                error!(error = %e, "Registration tick failed");
            }
            config.register_check_interval
        }
    })
    .await;
    debug!("Tick loop stopped");
}

async fn sweep_loop(
    catalog: CatalogHandle,
    scheduler: SchedulerHandle,
    config: LoopConfig,
    token: CancellationToken,
) {
    if !wait_for_catalog(&catalog, config.load_poll_interval, &token).await {
        return;
    }
    every(&token, || {
        let scheduler = scheduler.clone();
        async move {
            match scheduler.sweep().await {
                Ok(report) => report.next_wake.min(config.removal_ceiling),
                Err(e) => {
                    error!(error = %e, "Removal sweep failed");
                    config.removal_ceiling
                }
            }
        }
    })
    .await;
    debug!("Sweep loop stopped");
}

async fn reap_loop(scheduler: SchedulerHandle, config: LoopConfig, token: CancellationToken) {
    while sleep_or_stop(&token, config.reap_interval).await {
        if let Err(e) = scheduler.reap().await {
            error!(error = %e, "Reap failed");
        }
    }
    debug!("Reaper stopped");
}
