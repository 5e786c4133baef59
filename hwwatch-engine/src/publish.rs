//! Snapshot publishing - the joined view handed to rendering layers.

use std::path::Path;

use hwwatch_types::MonitorSnapshot;

use crate::error::EngineError;
use crate::state::EngineState;

/// Produce a point-in-time view across threshold, rolling statistics, and
/// violation state for every enabled metric, keyed (and therefore ordered)
/// by metric name.
///
/// This is a stale-but-consistent read: each metric's row is assembled
/// under its own short-lived locks, so the call never waits on an in-flight
/// collection. Disabled metrics are omitted; their definitions remain in
/// the settings store.
pub fn snapshot(state: &EngineState) -> MonitorSnapshot {
    let mut snapshot = MonitorSnapshot::new();
    for metric in state.enabled_metrics() {
        snapshot.metrics.insert(metric.name().to_string(), metric.report());
    }
    snapshot
}

/// Write a snapshot to a JSON file, overwriting any previous export.
pub async fn write_json(path: impl AsRef<Path>, snapshot: &MonitorSnapshot) -> Result<(), EngineError> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(snapshot).map_err(|e| EngineError::Corrupt {
        path: path.display().to_string(),
        source: e,
    })?;
    tokio::fs::write(path, json).await.map_err(|e| EngineError::Persistence {
        path: path.display().to_string(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hwwatch_types::{Comparator, MetricDescriptor, Threshold, ViolationPolicy, ViolationState};
    use tempfile::tempdir;

    fn engine() -> EngineState {
        let state = EngineState::new();
        state.register(MetricDescriptor::new("fan_speed", "sensors")).unwrap();
        state.register(MetricDescriptor::new("cpu_temp", "sensors").with_unit("°C")).unwrap();
        state
    }

    #[test]
    fn snapshot_is_ordered_by_metric_name() {
        let state = engine();
        let names: Vec<String> = snapshot(&state).iter().map(|(n, _)| n.clone()).collect();
        assert_eq!(names, vec!["cpu_temp", "fan_speed"]);
    }

    #[test]
    fn snapshot_joins_stats_threshold_and_state() {
        let state = engine();
        state.set_threshold("cpu_temp", Threshold::new(Comparator::Gt, 80.0)).unwrap();
        let metric = state.get("cpu_temp").unwrap();
        metric.apply_sample(1, 85.0, ViolationPolicy::default());

        let view = snapshot(&state);
        let report = view.get("cpu_temp").unwrap();
        assert_eq!(report.unit, "°C");
        assert_eq!(report.stats.current, Some(85.0));
        assert_eq!(report.threshold, Some(Threshold::new(Comparator::Gt, 80.0)));
        assert_eq!(report.state, ViolationState::Violating);

        // No samples yet for fan_speed: explicit empty state, not zeros
        let fan = view.get("fan_speed").unwrap();
        assert_eq!(fan.stats.count, 0);
        assert_eq!(fan.state, ViolationState::Unknown);
    }

    #[test]
    fn disabled_metrics_are_omitted() {
        let state = engine();
        state.set_metric_enabled("fan_speed", false).unwrap();
        let view = snapshot(&state);
        assert_eq!(view.len(), 1);
        assert!(view.get("fan_speed").is_none());
    }

    #[tokio::test]
    async fn write_json_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let state = engine();
        state.get("cpu_temp").unwrap().apply_sample(1, 42.0, ViolationPolicy::default());

        let view = snapshot(&state);
        write_json(&path, &view).await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let back: MonitorSnapshot = serde_json::from_str(&content).unwrap();
        assert_eq!(back, view);
    }
}
