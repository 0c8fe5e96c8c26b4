//! Reconciler implementation.
//!
//! A refresh pulls the booking service's listings, merges them with the
//! user's desired state, and writes the result back:
//!
//! 1. Read every stored row.
//! 2. List the next `days_ahead` days of classes.
//! 3. In the catalog actor: left-join the listings against the catalog,
//!    overlay the rows, drop past dates, mark loaded.
//! 4. Write one partition per date in `today..=today + write_window_days`,
//!    taking each partition's rows from the catalog actor as it is written.
//! 5. Delete the partitions for the `stale_partition_days` days before
//!    today, ignoring failures.

use std::sync::Arc;

use chrono::{Days, NaiveDate};
use tracing::{debug, info, warn};

use crate::booking::BookingClient;
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::source::DesiredStateSource;
use crate::store::CatalogHandle;
use crate::types::ReconcileResult;

/// Configuration for the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Days of classes to ask the booking service for.
    pub days_ahead: u32,
    /// Partitions written back cover today and this many days after it.
    pub write_window_days: u32,
    /// Partitions this many days back (and no further) are deleted.
    pub stale_partition_days: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            days_ahead: 7,
            write_window_days: 7,
            stale_partition_days: 6,
        }
    }
}

/// Keeps the catalog and the desired-state store in step with the booking
/// service.
pub struct Reconciler {
    client: Arc<dyn BookingClient>,
    source: Arc<dyn DesiredStateSource>,
    catalog: CatalogHandle,
    clock: Arc<dyn Clock>,
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(
        client: Arc<dyn BookingClient>,
        source: Arc<dyn DesiredStateSource>,
        catalog: CatalogHandle,
        clock: Arc<dyn Clock>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            client,
            source,
            catalog,
            clock,
            config,
        }
    }

    /// Run one refresh cycle.
    ///
    /// A failed read or listing aborts the cycle before the catalog is
    /// touched. Failed partition writes are reported but do not abort.
    pub async fn refresh(&self) -> Result<ReconcileResult> {
        let rows = self.source.read_all().await?;
        let listings = self
            .client
            .list_upcoming_events(self.config.days_ahead)
            .await?;
        let today = self.clock.today();

        info!(
            rows = rows.len(),
            listings = listings.len(),
            %today,
            "Starting refresh"
        );

        let outcome = self.catalog.merge(listings, rows, today).await?;

        let window_end = offset(today, self.config.write_window_days, Direction::Forward)?;
        let mut result = ReconcileResult {
            events: outcome.catalog.len(),
            pruned: outcome.pruned,
            ..ReconcileResult::default()
        };

        // Rows come from the actor at write time: an attempt may have
        // confirmed a registration since the merge.
        for date in outcome.catalog.partitions(today, window_end).into_keys() {
            match self.catalog.write_through(self.source.as_ref(), date).await {
                Ok(()) => result.partitions_written.push(date),
                Err(e) => {
                    warn!(%date, error = %e, "Failed to write partition");
                    result.partitions_failed.push((date, e.to_string()));
                }
            }
        }

        for back in 1..=self.config.stale_partition_days {
            let date = offset(today, back, Direction::Back)?;
            match self.source.delete_partition(date).await {
                Ok(()) => result.stale_deleted.push(date),
                Err(e) => debug!(%date, error = %e, "Stale partition not deleted"),
            }
        }

        if result.all_written() {
            info!(
                events = result.events,
                pruned = result.pruned,
                partitions = result.partitions_written.len(),
                "Refresh complete"
            );
        } else {
            warn!(
                events = result.events,
                failed = result.partitions_failed.len(),
                "Refresh complete with write failures"
            );
        }

        Ok(result)
    }

    /// Get the configuration.
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }
}

enum Direction {
    Forward,
    Back,
}

fn offset(date: NaiveDate, days: u32, direction: Direction) -> Result<NaiveDate> {
    let days = Days::new(u64::from(days));
    match direction {
        Direction::Forward => date.checked_add_days(days),
        Direction::Back => date.checked_sub_days(days),
    }
    .ok_or_else(|| Error::invalid_config(format!("date out of range around {date}")))
}

/// Builder for Reconciler.
pub struct ReconcilerBuilder {
    client: Option<Arc<dyn BookingClient>>,
    source: Option<Arc<dyn DesiredStateSource>>,
    catalog: Option<CatalogHandle>,
    clock: Option<Arc<dyn Clock>>,
    config: ReconcilerConfig,
}

impl ReconcilerBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            client: None,
            source: None,
            catalog: None,
            clock: None,
            config: ReconcilerConfig::default(),
        }
    }

    /// Set the booking client.
    pub fn with_client(mut self, client: Arc<dyn BookingClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the desired-state store.
    pub fn with_source(mut self, source: Arc<dyn DesiredStateSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the catalog actor.
    pub fn with_catalog(mut self, catalog: CatalogHandle) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Set the clock. Defaults to the system clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set how many days of listings to fetch.
    pub fn days_ahead(mut self, days: u32) -> Self {
        self.config.days_ahead = days;
        self
    }

    /// Build the reconciler.
    pub fn build(self) -> Result<Reconciler> {
        let client = self
            .client
            .ok_or_else(|| Error::invalid_config("Booking client is required"))?;
        let source = self
            .source
            .ok_or_else(|| Error::invalid_config("Desired-state source is required"))?;
        let catalog = self
            .catalog
            .ok_or_else(|| Error::invalid_config("Catalog actor is required"))?;
        if self.config.days_ahead == 0 {
            return Err(Error::invalid_config("days_ahead must be at least 1"));
        }
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(crate::clock::SystemClock));

        Ok(Reconciler::new(client, source, catalog, clock, self.config))
    }
}

impl Default for ReconcilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
