//! Shared engine state: the metric registry joined with per-metric rolling
//! statistics and violation tracking.
//!
//! Mutations are serialized per metric (each metric's own locks), while
//! different metrics update concurrently. The map itself sits behind one
//! `RwLock` with the usual fast-path-read / slow-path-write access pattern.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use hwwatch_types::{
    GeneralConfig, MetricConfig, MetricDescriptor, MetricReport, MonitorConfig, Threshold,
    ViolationEvent, ViolationPolicy, ViolationState,
};

use crate::error::{CollectError, EngineError};
use crate::evaluate::ViolationTracker;
use crate::source::{CommandSource, MetricSource};
use crate::stats::RollingStats;

/// All state for a single registered metric.
#[derive(Debug)]
pub struct MetricState {
    name: String,
    descriptor: RwLock<MetricDescriptor>,
    source: RwLock<Arc<dyn MetricSource>>,
    threshold: RwLock<Option<Threshold>>,
    stats: Mutex<RollingStats>,
    tracker: Mutex<ViolationTracker>,
    last_error: RwLock<Option<String>>,
    /// Highest tick whose outcome has been applied. Late results for a
    /// superseded tick are discarded, never merged out of order.
    last_tick: AtomicU64,
}

impl MetricState {
    fn new(descriptor: MetricDescriptor, source: Arc<dyn MetricSource>) -> Self {
        Self {
            name: descriptor.name.clone(),
            descriptor: RwLock::new(descriptor),
            source: RwLock::new(source),
            threshold: RwLock::new(None),
            stats: Mutex::new(RollingStats::new()),
            tracker: Mutex::new(ViolationTracker::new()),
            last_error: RwLock::new(None),
            last_tick: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> MetricDescriptor {
        self.descriptor.read().clone()
    }

    pub fn threshold(&self) -> Option<Threshold> {
        *self.threshold.read()
    }

    /// The source to sample on the next tick.
    pub fn source(&self) -> Arc<dyn MetricSource> {
        self.source.read().clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.descriptor.read().enabled
    }

    /// Apply a successful sample for `tick`: update rolling statistics,
    /// then evaluate the threshold. Returns the violation event to log, if
    /// any. A result for a tick older than the newest applied outcome is
    /// discarded.
    ///
    /// The tick comparison and the statistics update happen under the same
    /// lock, so two appliers racing on adjacent ticks cannot leave `current`
    /// at the older tick's value.
    pub fn apply_sample(
        &self,
        tick: u64,
        value: f64,
        policy: ViolationPolicy,
    ) -> Option<ViolationEvent> {
        let mut stats = self.stats.lock();
        let prev = self.last_tick.fetch_max(tick, Ordering::AcqRel);
        if prev > tick {
            return None;
        }
        stats.update(value);
        *self.last_error.write() = None;

        let threshold = *self.threshold.read();
        self.tracker
            .lock()
            .observe(&self.name, value, threshold.as_ref(), policy)
    }

    /// Record a collection failure for `tick`. Rolling statistics are left
    /// untouched; the metric reports as stale until a sample succeeds. The
    /// stats lock is held for the tick check so a failure cannot race a
    /// concurrent sample for the same metric.
    pub fn record_failure(&self, tick: u64, error: &CollectError) {
        let stats = self.stats.lock();
        let prev = self.last_tick.fetch_max(tick, Ordering::AcqRel);
        if prev > tick {
            return;
        }
        drop(stats);
        *self.last_error.write() = Some(error.to_string());
    }

    /// Discard accumulated statistics and return to the `Unknown` state.
    pub fn reset_stats(&self) {
        self.stats.lock().reset();
        self.tracker.lock().reset();
        *self.last_error.write() = None;
    }

    /// Produce this metric's snapshot row.
    ///
    /// A metric whose last collection failed reports `Unknown` - stale, not
    /// a false breach.
    pub fn report(&self) -> MetricReport {
        let descriptor = self.descriptor.read();
        let last_error = self.last_error.read().clone();
        let state = if last_error.is_some() {
            ViolationState::Unknown
        } else {
            self.tracker.lock().state()
        };
        MetricReport {
            unit: descriptor.unit.clone(),
            enabled: descriptor.enabled,
            stats: self.stats.lock().summary(),
            threshold: *self.threshold.read(),
            state,
            last_error,
        }
    }
}

/// Registry of all metrics plus the general settings, shared between the
/// scheduler, mutation APIs, and the snapshot publisher.
///
/// This is the explicitly-owned state object of the engine: initialized
/// from the settings store at startup, checkpointed back on every mutation
/// (by [`crate::monitor::Monitor`]), and dropped on shutdown.
#[derive(Debug, Default)]
pub struct EngineState {
    metrics: RwLock<BTreeMap<String, Arc<MetricState>>>,
    general: RwLock<GeneralConfig>,
}

impl EngineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a metric, building a [`CommandSource`] from its descriptor.
    ///
    /// Registering an existing name replaces the descriptor and source in
    /// place while keeping accumulated statistics and the threshold - this
    /// is how descriptor edits are expressed.
    pub fn register(&self, descriptor: MetricDescriptor) -> Result<Arc<MetricState>, EngineError> {
        let source: Arc<dyn MetricSource> = Arc::new(CommandSource::from_descriptor(&descriptor)?);
        Ok(self.register_with_source(descriptor, source))
    }

    /// Register a metric with an explicit source implementation.
    pub fn register_with_source(
        &self,
        descriptor: MetricDescriptor,
        source: Arc<dyn MetricSource>,
    ) -> Arc<MetricState> {
        // Fast path: update an existing entry in place
        {
            let metrics = self.metrics.read();
            if let Some(state) = metrics.get(&descriptor.name) {
                *state.descriptor.write() = descriptor;
                *state.source.write() = source;
                return state.clone();
            }
        }

        // Slow path: insert, double-checking after taking the write lock
        let mut metrics = self.metrics.write();
        let entry = metrics
            .entry(descriptor.name.clone())
            .or_insert_with(|| Arc::new(MetricState::new(descriptor.clone(), source.clone())));
        *entry.descriptor.write() = descriptor;
        *entry.source.write() = source;
        entry.clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<MetricState>> {
        self.metrics.read().get(name).cloned()
    }

    fn require(&self, name: &str) -> Result<Arc<MetricState>, EngineError> {
        self.get(name)
            .ok_or_else(|| EngineError::UnknownMetric(name.to_string()))
    }

    pub fn metric_names(&self) -> Vec<String> {
        self.metrics.read().keys().cloned().collect()
    }

    /// Metrics enabled for sampling, in name order.
    pub fn enabled_metrics(&self) -> Vec<Arc<MetricState>> {
        self.metrics
            .read()
            .values()
            .filter(|m| m.is_enabled())
            .cloned()
            .collect()
    }

    /// Soft-enable or soft-disable sampling for a metric. Definitions are
    /// never destroyed while history references them.
    pub fn set_metric_enabled(&self, name: &str, enabled: bool) -> Result<(), EngineError> {
        let state = self.require(name)?;
        state.descriptor.write().enabled = enabled;
        Ok(())
    }

    /// Set (or overwrite in place) the metric's threshold. Idempotent:
    /// setting identical arguments twice yields identical state.
    pub fn set_threshold(&self, name: &str, threshold: Threshold) -> Result<(), EngineError> {
        if !threshold.bound.is_finite() {
            return Err(EngineError::InvalidConfig(format!(
                "threshold bound for '{name}' must be finite"
            )));
        }
        let state = self.require(name)?;
        *state.threshold.write() = Some(threshold);
        Ok(())
    }

    pub fn clear_threshold(&self, name: &str) -> Result<(), EngineError> {
        let state = self.require(name)?;
        *state.threshold.write() = None;
        Ok(())
    }

    /// Toggle violation evaluation without touching sampling.
    pub fn set_threshold_enabled(&self, name: &str, enabled: bool) -> Result<(), EngineError> {
        let state = self.require(name)?;
        let mut threshold = state.threshold.write();
        match threshold.as_mut() {
            Some(t) => {
                t.enabled = enabled;
                Ok(())
            }
            None => Err(EngineError::InvalidConfig(format!(
                "metric '{name}' has no threshold to toggle"
            ))),
        }
    }

    pub fn threshold(&self, name: &str) -> Result<Option<Threshold>, EngineError> {
        Ok(self.require(name)?.threshold())
    }

    pub fn reset_stats(&self, name: &str) -> Result<(), EngineError> {
        self.require(name)?.reset_stats();
        Ok(())
    }

    pub fn general(&self) -> GeneralConfig {
        self.general.read().clone()
    }

    pub fn set_general(&self, general: GeneralConfig) {
        *self.general.write() = general;
    }

    pub fn policy(&self) -> ViolationPolicy {
        self.general.read().policy
    }

    /// Replace all state from a validated configuration document. On
    /// startup the settings store is the sole source of truth for
    /// definitions and thresholds; rolling statistics restart from empty.
    pub fn load_config(&self, config: &MonitorConfig) -> Result<(), EngineError> {
        config.validate()?;

        // Build the full map before swapping so a bad entry cannot leave
        // the registry half-loaded.
        let mut loaded = BTreeMap::new();
        for metric in &config.metrics {
            let source: Arc<dyn MetricSource> =
                Arc::new(CommandSource::from_descriptor(&metric.descriptor)?);
            let state = Arc::new(MetricState::new(metric.descriptor.clone(), source));
            *state.threshold.write() = metric.threshold;
            loaded.insert(metric.descriptor.name.clone(), state);
        }

        *self.general.write() = config.general.clone();
        *self.metrics.write() = loaded;
        Ok(())
    }

    /// Export the current configuration for persistence.
    pub fn to_config(&self) -> MonitorConfig {
        let metrics = self
            .metrics
            .read()
            .values()
            .map(|state| MetricConfig {
                descriptor: state.descriptor(),
                threshold: state.threshold(),
            })
            .collect();
        MonitorConfig {
            general: self.general(),
            metrics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hwwatch_types::Comparator;

    fn engine_with(names: &[&str]) -> EngineState {
        let state = EngineState::new();
        for name in names {
            state.register(MetricDescriptor::new(*name, "true")).unwrap();
        }
        state
    }

    fn policy() -> ViolationPolicy {
        ViolationPolicy::default()
    }

    #[test]
    fn set_threshold_on_unknown_metric_fails_and_leaves_state_unchanged() {
        let state = engine_with(&["cpu_temp"]);
        let before = state.to_config();

        let result = state.set_threshold("unknown_metric", Threshold::new(Comparator::Gt, 10.0));
        assert!(matches!(result, Err(EngineError::UnknownMetric(name)) if name == "unknown_metric"));
        assert_eq!(state.to_config(), before);
    }

    #[test]
    fn set_threshold_twice_is_idempotent() {
        let state = engine_with(&["cpu_temp"]);
        let threshold = Threshold::new(Comparator::Gt, 80.0);

        state.set_threshold("cpu_temp", threshold).unwrap();
        let first = state.to_config();
        state.set_threshold("cpu_temp", threshold).unwrap();
        assert_eq!(state.to_config(), first);
    }

    #[test]
    fn set_threshold_overwrites_in_place() {
        let state = engine_with(&["cpu_temp"]);
        state.set_threshold("cpu_temp", Threshold::new(Comparator::Gt, 80.0)).unwrap();
        state.set_threshold("cpu_temp", Threshold::new(Comparator::Ge, 85.0)).unwrap();

        let threshold = state.threshold("cpu_temp").unwrap().unwrap();
        assert_eq!(threshold.comparator, Comparator::Ge);
        assert_eq!(threshold.bound, 85.0);
    }

    #[test]
    fn non_finite_bound_rejected() {
        let state = engine_with(&["cpu_temp"]);
        let result = state.set_threshold("cpu_temp", Threshold::new(Comparator::Gt, f64::NAN));
        assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn count_zero_never_violates() {
        let state = engine_with(&["cpu_temp"]);
        state.set_threshold("cpu_temp", Threshold::new(Comparator::Gt, 0.0)).unwrap();

        let report = state.get("cpu_temp").unwrap().report();
        assert_eq!(report.stats.count, 0);
        assert_eq!(report.state, ViolationState::Unknown);
    }

    #[test]
    fn disabled_threshold_keeps_stats_updating_without_events() {
        // Scenario D
        let state = engine_with(&["cpu_temp"]);
        let metric = state.get("cpu_temp").unwrap();
        state.set_threshold("cpu_temp", Threshold::new(Comparator::Gt, 80.0)).unwrap();

        assert!(metric.apply_sample(1, 90.0, policy()).is_some());

        state.set_threshold_enabled("cpu_temp", false).unwrap();
        assert!(metric.apply_sample(2, 95.0, policy()).is_none());
        assert!(metric.apply_sample(3, 99.0, policy()).is_none());

        let report = metric.report();
        assert_eq!(report.stats.count, 3);
        assert_eq!(report.stats.current, Some(99.0));
        assert_eq!(report.state, ViolationState::Normal);
    }

    #[test]
    fn toggling_threshold_without_one_is_an_error() {
        let state = engine_with(&["cpu_temp"]);
        assert!(matches!(
            state.set_threshold_enabled("cpu_temp", true),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn failure_leaves_stats_from_previous_tick() {
        // Scenario C, single-metric half
        let state = engine_with(&["fan_speed"]);
        let metric = state.get("fan_speed").unwrap();

        for (tick, value) in [(1, 1000.0), (2, 1010.0), (3, 1020.0), (4, 1030.0)] {
            metric.apply_sample(tick, value, policy());
        }
        metric.record_failure(5, &CollectError::Timeout);

        let report = metric.report();
        assert_eq!(report.stats.count, 4);
        assert_eq!(report.stats.current, Some(1030.0));
        assert_eq!(report.state, ViolationState::Unknown);
        assert!(report.last_error.unwrap().contains("timed out"));
    }

    #[test]
    fn successful_sample_clears_stale_error() {
        let state = engine_with(&["fan_speed"]);
        let metric = state.get("fan_speed").unwrap();

        metric.record_failure(1, &CollectError::Timeout);
        assert!(metric.report().last_error.is_some());

        metric.apply_sample(2, 900.0, policy());
        let report = metric.report();
        assert!(report.last_error.is_none());
        assert_eq!(report.state, ViolationState::Normal);
    }

    #[test]
    fn late_result_for_superseded_tick_is_discarded() {
        let state = engine_with(&["cpu_temp"]);
        let metric = state.get("cpu_temp").unwrap();

        metric.apply_sample(2, 50.0, policy());
        // Tick 1's result arrives after tick 2 was applied
        assert!(metric.apply_sample(1, 99.0, policy()).is_none());

        let report = metric.report();
        assert_eq!(report.stats.count, 1);
        assert_eq!(report.stats.current, Some(50.0));
    }

    #[test]
    fn late_failure_does_not_mark_newer_success_stale() {
        let state = engine_with(&["cpu_temp"]);
        let metric = state.get("cpu_temp").unwrap();

        metric.apply_sample(5, 50.0, policy());
        metric.record_failure(4, &CollectError::Timeout);
        assert!(metric.report().last_error.is_none());
    }

    #[test]
    fn disable_metric_removes_it_from_enabled_set() {
        let state = engine_with(&["a", "b"]);
        state.set_metric_enabled("b", false).unwrap();

        let enabled: Vec<String> =
            state.enabled_metrics().iter().map(|m| m.name().to_string()).collect();
        assert_eq!(enabled, vec!["a"]);

        // Soft-disable only: the definition is still registered
        assert!(state.get("b").is_some());
    }

    #[test]
    fn reregistering_keeps_stats_and_threshold() {
        let state = engine_with(&["cpu_temp"]);
        let metric = state.get("cpu_temp").unwrap();
        state.set_threshold("cpu_temp", Threshold::new(Comparator::Gt, 80.0)).unwrap();
        metric.apply_sample(1, 70.0, policy());

        let edited = MetricDescriptor::new("cpu_temp", "sensors -u").with_unit("°C");
        state.register(edited).unwrap();

        let metric = state.get("cpu_temp").unwrap();
        assert_eq!(metric.descriptor().command, "sensors -u");
        assert_eq!(metric.report().stats.count, 1);
        assert!(metric.threshold().is_some());
    }

    #[test]
    fn config_round_trip_through_state() {
        let state = engine_with(&["cpu_temp", "fan_speed"]);
        state.set_threshold("cpu_temp", Threshold::new(Comparator::Gt, 80.0)).unwrap();
        state.set_metric_enabled("fan_speed", false).unwrap();

        let config = state.to_config();
        let restored = EngineState::new();
        restored.load_config(&config).unwrap();

        assert_eq!(restored.to_config(), config);
        // Statistics restart from empty after a reload
        assert_eq!(restored.get("cpu_temp").unwrap().report().stats.count, 0);
    }

    #[test]
    fn load_config_rejects_invalid_documents_atomically() {
        let state = engine_with(&["existing"]);
        let mut bad = MonitorConfig::new();
        bad.general.interval_secs = -1.0;
        bad.metrics.push(MetricDescriptor::new("new_metric", "true").into());

        assert!(state.load_config(&bad).is_err());
        // Nothing was applied
        assert!(state.get("existing").is_some());
        assert!(state.get("new_metric").is_none());
    }

    #[test]
    fn reset_stats_returns_metric_to_unknown() {
        let state = engine_with(&["cpu_temp"]);
        let metric = state.get("cpu_temp").unwrap();
        metric.apply_sample(1, 70.0, policy());

        state.reset_stats("cpu_temp").unwrap();
        let report = metric.report();
        assert_eq!(report.stats.count, 0);
        assert_eq!(report.state, ViolationState::Unknown);
    }

    #[test]
    fn concurrent_updates_to_different_metrics() {
        use std::thread;

        let state = Arc::new(engine_with(&["a", "b", "c", "d"]));
        let mut handles = vec![];
        for name in ["a", "b", "c", "d"] {
            let state = state.clone();
            handles.push(thread::spawn(move || {
                let metric = state.get(name).unwrap();
                for tick in 1..=100u64 {
                    metric.apply_sample(tick, tick as f64, ViolationPolicy::default());
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        for name in ["a", "b", "c", "d"] {
            assert_eq!(state.get(name).unwrap().report().stats.count, 100);
        }
    }

    #[test]
    fn concurrent_appliers_on_one_metric_keep_tick_order() {
        use std::thread;

        let state = Arc::new(engine_with(&["cpu_temp"]));
        let mut handles = vec![];
        // Two appliers racing over the same tick range, as when a driver
        // tick overlaps a manual collection cycle.
        for _ in 0..2 {
            let state = state.clone();
            handles.push(thread::spawn(move || {
                let metric = state.get("cpu_temp").unwrap();
                for tick in 1..=1000u64 {
                    metric.apply_sample(tick, tick as f64, ViolationPolicy::default());
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        // Whatever interleaving happened, the newest applied value must be
        // the one from the highest tick.
        let report = state.get("cpu_temp").unwrap().report();
        assert_eq!(report.stats.current, Some(1000.0));
        assert_eq!(report.stats.max, Some(1000.0));
    }
}
