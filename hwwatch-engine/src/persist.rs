//! Durable configuration and event-log persistence.
//!
//! Two independent artifacts:
//!
//! - the settings store: one JSON document holding the full
//!   [`MonitorConfig`], rewritten atomically (write-to-temp-then-rename) on
//!   every change;
//! - the event log: append-only JSON Lines, one self-contained record per
//!   line, never rewritten in place.
//!
//! Writes are retried with bounded exponential backoff before surfacing
//! [`EngineError::Persistence`]; losing durability silently is not an
//! option, so the caller sees the final failure while in-memory state stays
//! authoritative.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use hwwatch_types::{MonitorConfig, StatsSummary, ViolationEvent};

use crate::error::EngineError;

const WRITE_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_millis(50);

/// One record in the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entry", rename_all = "snake_case")]
pub enum LogRecord {
    /// A threshold breach or recovery.
    Violation(ViolationEvent),
    /// A periodic statistics checkpoint (written when `log_stats` is on).
    Stats(StatsRecord),
}

/// Point-in-time statistics for all sampled metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsRecord {
    pub timestamp_ms: u64,
    pub metrics: BTreeMap<String, StatsSummary>,
}

/// The persisted settings document.
///
/// One store handle is the single writer for its path; concurrent saves
/// through clones of the same handle are not supported.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a settings document exists yet.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load and validate the settings document.
    ///
    /// A malformed document or one violating configuration invariants is
    /// rejected here, before it can corrupt the registry.
    pub async fn load(&self) -> Result<MonitorConfig, EngineError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        let config: MonitorConfig =
            serde_json::from_str(&content).map_err(|e| EngineError::Corrupt {
                path: self.path.display().to_string(),
                source: e,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load the settings document, or fall back to an empty default when
    /// none exists yet (first run).
    pub async fn load_or_default(&self) -> Result<MonitorConfig, EngineError> {
        if self.exists() {
            self.load().await
        } else {
            Ok(MonitorConfig::default())
        }
    }

    /// Persist the full configuration atomically.
    ///
    /// The document is written to `<path>.tmp` and renamed over the target,
    /// so a crash mid-write leaves the previous document intact.
    pub async fn save(&self, config: &MonitorConfig) -> Result<(), EngineError> {
        config.validate()?;
        let json = serde_json::to_string_pretty(config).map_err(|e| EngineError::Corrupt {
            path: self.path.display().to_string(),
            source: e,
        })?;

        let tmp = self.path.with_extension("json.tmp");
        retry_write(&self.path, || async {
            tokio::fs::write(&tmp, json.as_bytes()).await?;
            tokio::fs::rename(&tmp, &self.path).await
        })
        .await
    }

    fn io_error(&self, source: io::Error) -> EngineError {
        EngineError::Persistence {
            path: self.path.display().to_string(),
            source,
        }
    }
}

/// The append-only event log.
#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record.
    pub async fn append(&self, record: &LogRecord) -> Result<(), EngineError> {
        self.append_many(std::slice::from_ref(record)).await
    }

    /// Append a batch of records in order (one tick's events).
    pub async fn append_many(&self, records: &[LogRecord]) -> Result<(), EngineError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut buf = String::new();
        for record in records {
            let line = serde_json::to_string(record).map_err(|e| EngineError::Corrupt {
                path: self.path.display().to_string(),
                source: e,
            })?;
            buf.push_str(&line);
            buf.push('\n');
        }

        retry_write(&self.path, || async {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            file.write_all(buf.as_bytes()).await?;
            file.flush().await
        })
        .await
    }

    /// Read every record in append order.
    ///
    /// A torn trailing line (crash mid-append) is skipped with a warning
    /// rather than making the whole log unreadable.
    pub async fn read_all(&self) -> Result<Vec<LogRecord>, EngineError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            EngineError::Persistence {
                path: self.path.display().to_string(),
                source: e,
            }
        })?;

        let mut records = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    path = %self.path.display(),
                    line = lineno + 1,
                    error = %e,
                    "skipping unreadable log record"
                ),
            }
        }
        Ok(records)
    }

    /// Violation events only, in append order.
    pub async fn violations(&self) -> Result<Vec<ViolationEvent>, EngineError> {
        Ok(self
            .read_all()
            .await?
            .into_iter()
            .filter_map(|record| match record {
                LogRecord::Violation(event) => Some(event),
                LogRecord::Stats(_) => None,
            })
            .collect())
    }
}

/// Run a write closure with bounded exponential backoff.
async fn retry_write<F, Fut>(path: &Path, mut write: F) -> Result<(), EngineError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = io::Result<()>>,
{
    let mut last_err = None;
    for attempt in 0..WRITE_ATTEMPTS {
        match write().await {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    attempt = attempt + 1,
                    error = %e,
                    "persistence write failed"
                );
                last_err = Some(e);
            }
        }
        if attempt + 1 < WRITE_ATTEMPTS {
            tokio::time::sleep(BACKOFF_BASE * 2u32.pow(attempt)).await;
        }
    }
    Err(EngineError::Persistence {
        path: path.display().to_string(),
        source: last_err.unwrap_or_else(|| io::Error::other("write failed")),
    })
}
