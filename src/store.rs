//! Desired-state store backed by a directory of JSON files.
//!
//! Each date partition is one file, `<dir>/<YYYY-MM-DD>.json`, holding a
//! JSON array of rows. Files whose name is not a date are ignored, so the
//! user can keep notes next to them.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{debug, warn};

use classbook_catalog::EventRow;
use classbook_reconciler::{DesiredStateSource, SourceError};

const EXTENSION: &str = "json";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// One JSON file per date under a directory.
#[derive(Debug, Clone)]
pub struct DirectoryStateSource {
    dir: PathBuf,
}

impl DirectoryStateSource {
    /// Use `dir`, which is created on first write if missing.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory in use.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the partition file for `date`.
    pub fn partition_path(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}.{EXTENSION}", date.format(DATE_FORMAT)))
    }

    /// Rows stored for `date`; `None` when the partition does not exist.
    pub async fn partition(&self, date: NaiveDate) -> Result<Option<Vec<EventRow>>, SourceError> {
        let path = self.partition_path(date);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => parse_partition(&path, &content).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SourceError::read_failed(format!("{}: {e}", path.display()))),
        }
    }

    /// Every partition, keyed by date.
    pub async fn partitions(&self) -> Result<BTreeMap<NaiveDate, Vec<EventRow>>, SourceError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(SourceError::read_failed(format!("{}: {e}", self.dir.display())));
            }
        };

        let mut partitions = BTreeMap::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SourceError::read_failed(e.to_string()))?
        {
            let path = entry.path();
            let Some(date) = partition_date(&path) else {
                debug!(path = %path.display(), "Skipping non-partition file");
                continue;
            };
            let content = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| SourceError::read_failed(format!("{}: {e}", path.display())))?;
            partitions.insert(date, parse_partition(&path, &content)?);
        }
        Ok(partitions)
    }
}

#[async_trait]
impl DesiredStateSource for DirectoryStateSource {
    async fn read_all(&self) -> Result<Vec<EventRow>, SourceError> {
        Ok(self.partitions().await?.into_values().flatten().collect())
    }

    async fn write_rows(&self, date: NaiveDate, rows: Vec<EventRow>) -> Result<(), SourceError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| SourceError::write_failed(date, e.to_string()))?;

        let content = serde_json::to_string_pretty(&rows)
            .map_err(|e| SourceError::write_failed(date, e.to_string()))?;
        let path = self.partition_path(date);
        let staging = path.with_extension("json.tmp");

        tokio::fs::write(&staging, content)
            .await
            .map_err(|e| SourceError::write_failed(date, e.to_string()))?;
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|e| SourceError::write_failed(date, e.to_string()))?;

        debug!(%date, rows = rows.len(), "Partition written");
        Ok(())
    }

    async fn delete_partition(&self, date: NaiveDate) -> Result<(), SourceError> {
        match tokio::fs::remove_file(self.partition_path(date)).await {
            Ok(()) => {
                debug!(%date, "Partition deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SourceError::delete_failed(date, e.to_string())),
        }
    }
}

fn partition_date(path: &Path) -> Option<NaiveDate> {
    if path.extension().is_none_or(|ext| ext != EXTENSION) {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    NaiveDate::parse_from_str(stem, DATE_FORMAT).ok()
}

fn parse_partition(path: &Path, content: &str) -> Result<Vec<EventRow>, SourceError> {
    serde_json::from_str(content).map_err(|e| {
        warn!(path = %path.display(), error = %e, "Unreadable partition");
        SourceError::read_failed(format!("{}: {e}", path.display()))
    })
}
