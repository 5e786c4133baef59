//! Snapshot - a point-in-time joined view of monitoring state.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::metrics::Threshold;

/// Per-metric violation state, as shown in the snapshot table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationState {
    /// No sample applied yet, or the last collection failed - the metric is
    /// stale/unavailable, not a false breach.
    #[default]
    Unknown,
    Normal,
    Violating,
}

/// Rolling statistics summary for one metric.
///
/// All value fields are `None` while `count == 0`; consumers must handle
/// the empty state explicitly rather than defaulting to zero.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StatsSummary {
    pub count: u64,
    pub current: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub std: Option<f64>,
}

/// One row of the snapshot table: descriptor context joined with rolling
/// statistics, the configured threshold, and the current violation state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricReport {
    #[serde(default)]
    pub unit: String,
    pub enabled: bool,
    pub stats: StatsSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<Threshold>,
    pub state: ViolationState,
    /// Collection failure from the most recent tick, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// A point-in-time view across all registered metrics.
///
/// Keyed by metric name in a `BTreeMap`, so iteration order is stable and
/// rendering is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    /// Unix timestamp in milliseconds when this snapshot was taken.
    pub timestamp_ms: u64,
    pub metrics: BTreeMap<String, MetricReport>,
}

impl MonitorSnapshot {
    /// Create an empty snapshot timestamped now.
    pub fn new() -> Self {
        Self {
            timestamp_ms: current_timestamp_ms(),
            metrics: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    /// Get the report for a specific metric.
    pub fn get(&self, metric: &str) -> Option<&MetricReport> {
        self.metrics.get(metric)
    }

    /// Iterate over all metrics in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetricReport)> {
        self.metrics.iter()
    }

    /// Metrics currently in the `Violating` state.
    pub fn violating(&self) -> impl Iterator<Item = (&String, &MetricReport)> {
        self.metrics.iter().filter(|(_, r)| r.state == ViolationState::Violating)
    }
}

impl Default for MonitorSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

/// Current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
