//! Desired-state store boundary.
//!
//! The store holds one partition of [`EventRow`]s per date. The user edits
//! the `registered` cell; the reconciler writes everything else back.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;

use classbook_catalog::{DesiredState, EventKey, EventRow};

use crate::error::SourceError;

/// Where the user's intent lives.
#[async_trait]
pub trait DesiredStateSource: Send + Sync {
    /// Every row of every partition.
    async fn read_all(&self) -> Result<Vec<EventRow>, SourceError>;

    /// Replace the partition for `date` with `rows`, creating it if missing.
    async fn write_rows(&self, date: NaiveDate, rows: Vec<EventRow>) -> Result<(), SourceError>;

    /// Remove the partition for `date`. Removing a missing partition is not
    /// an error.
    async fn delete_partition(&self, date: NaiveDate) -> Result<(), SourceError>;
}

/// In-memory store keyed by date.
///
/// Keeps a log of every write and delete so tests can assert on them.
#[derive(Debug, Default)]
pub struct InMemoryDesiredStateSource {
    partitions: RwLock<BTreeMap<NaiveDate, Vec<EventRow>>>,
    writes: RwLock<Vec<(NaiveDate, Vec<EventRow>)>>,
    deletes: RwLock<Vec<NaiveDate>>,
}

impl InMemoryDesiredStateSource {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `rows`, partitioned by their date.
    pub fn with_rows(rows: impl IntoIterator<Item = EventRow>) -> Self {
        let mut partitions: BTreeMap<NaiveDate, Vec<EventRow>> = BTreeMap::new();
        for row in rows {
            partitions.entry(row.date_request).or_default().push(row);
        }
        Self {
            partitions: RwLock::new(partitions),
            ..Self::default()
        }
    }

    /// Rows currently stored for `date`.
    pub async fn partition(&self, date: NaiveDate) -> Option<Vec<EventRow>> {
        self.partitions.read().await.get(&date).cloned()
    }

    /// Dates that currently have a partition.
    pub async fn dates(&self) -> Vec<NaiveDate> {
        self.partitions.read().await.keys().copied().collect()
    }

    /// The row stored for one class instance.
    pub async fn row(&self, key: &EventKey) -> Option<EventRow> {
        self.partitions
            .read()
            .await
            .get(&key.occurs_on)
            .and_then(|rows| rows.iter().find(|row| row.key() == *key).cloned())
    }

    /// Edit the `registered` cell of one row, the way the user would.
    /// Returns `false` when no such row is stored.
    pub async fn set_desired(&self, key: &EventKey, desired: DesiredState) -> bool {
        let mut partitions = self.partitions.write().await;
        partitions
            .get_mut(&key.occurs_on)
            .and_then(|rows| rows.iter_mut().find(|row| row.key() == *key))
            .map(|row| row.registered = desired)
            .is_some()
    }

    /// Every write so far, oldest first.
    pub async fn writes(&self) -> Vec<(NaiveDate, Vec<EventRow>)> {
        self.writes.read().await.clone()
    }

    /// Every delete so far, oldest first.
    pub async fn deletes(&self) -> Vec<NaiveDate> {
        self.deletes.read().await.clone()
    }
}

#[async_trait]
impl DesiredStateSource for InMemoryDesiredStateSource {
    async fn read_all(&self) -> Result<Vec<EventRow>, SourceError> {
        Ok(self
            .partitions
            .read()
            .await
            .values()
            .flatten()
            .cloned()
            .collect())
    }

    async fn write_rows(&self, date: NaiveDate, rows: Vec<EventRow>) -> Result<(), SourceError> {
        self.writes.write().await.push((date, rows.clone()));
        self.partitions.write().await.insert(date, rows);
        Ok(())
    }

    async fn delete_partition(&self, date: NaiveDate) -> Result<(), SourceError> {
        self.deletes.write().await.push(date);
        self.partitions.write().await.remove(&date);
        Ok(())
    }
}
