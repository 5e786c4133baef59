//! The sampling scheduler: drives periodic collection across all enabled
//! metrics and owns the engine's mutation-and-checkpoint lifecycle.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use hwwatch_types::{
    current_timestamp_ms, Comparator, MetricDescriptor, MonitorConfig, MonitorSnapshot, Threshold,
    ViolationEvent,
};

use crate::error::{CollectError, EngineError};
use crate::persist::{EventLog, LogRecord, SettingsStore, StatsRecord};
use crate::publish;
use crate::state::EngineState;

const DEFAULT_SAMPLE_TIMEOUT: Duration = Duration::from_secs(10);

/// The monitoring engine's entry point.
///
/// A `Monitor` owns the registry state, the persistence handles, and the
/// sampling cadence. Configuration mutations go through its methods so
/// every change is checkpointed to the settings store immediately; there is
/// no ambient module-level state.
///
/// # Example
///
/// ```rust,no_run
/// use hwwatch_engine::Monitor;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let monitor = Monitor::builder()
///         .settings("monitor_settings.json")
///         .log("monitor_log.json")
///         .sample_timeout(Duration::from_secs(5))
///         .build()
///         .await?;
///
///     let handle = monitor.start();
///     tokio::signal::ctrl_c().await?;
///     handle.stop().await;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Monitor {
    state: Arc<EngineState>,
    store: SettingsStore,
    log: EventLog,
    sample_timeout: Duration,
    snapshot_path: Option<PathBuf>,
    interval_tx: watch::Sender<Duration>,
    /// Monotonic tick sequence shared by the driver and `tick_once`.
    tick: Arc<AtomicU64>,
}

impl Monitor {
    /// Create a builder.
    pub fn builder() -> MonitorBuilder {
        MonitorBuilder::default()
    }

    /// The shared registry/statistics state.
    pub fn state(&self) -> &Arc<EngineState> {
        &self.state
    }

    /// The append-only event log.
    pub fn log(&self) -> &EventLog {
        &self.log
    }

    /// The settings store backing this monitor.
    pub fn store(&self) -> &SettingsStore {
        &self.store
    }

    /// Point-in-time joined view of all enabled metrics.
    pub fn snapshot(&self) -> MonitorSnapshot {
        publish::snapshot(&self.state)
    }

    /// Persist the current configuration.
    pub async fn checkpoint(&self) -> Result<(), EngineError> {
        self.store.save(&self.state.to_config()).await
    }

    /// Register (or edit) a metric definition and checkpoint.
    pub async fn register_metric(&self, descriptor: MetricDescriptor) -> Result<(), EngineError> {
        self.state.register(descriptor)?;
        self.checkpoint().await
    }

    /// Set a metric's threshold and checkpoint. Threshold suggestions from
    /// an external oracle arrive through this same contract as manual
    /// edits; the engine does not care where a bound came from.
    pub async fn set_threshold(
        &self,
        name: &str,
        comparator: Comparator,
        bound: f64,
    ) -> Result<(), EngineError> {
        self.state.set_threshold(name, Threshold::new(comparator, bound))?;
        self.checkpoint().await
    }

    /// Remove a metric's threshold and checkpoint.
    pub async fn clear_threshold(&self, name: &str) -> Result<(), EngineError> {
        self.state.clear_threshold(name)?;
        self.checkpoint().await
    }

    /// Toggle violation evaluation for a metric and checkpoint. Sampling
    /// continues regardless.
    pub async fn set_threshold_enabled(&self, name: &str, enabled: bool) -> Result<(), EngineError> {
        self.state.set_threshold_enabled(name, enabled)?;
        self.checkpoint().await
    }

    /// Soft-enable or soft-disable sampling for a metric and checkpoint.
    pub async fn set_metric_enabled(&self, name: &str, enabled: bool) -> Result<(), EngineError> {
        self.state.set_metric_enabled(name, enabled)?;
        self.checkpoint().await
    }

    /// Change the sampling interval at runtime and checkpoint. Takes
    /// effect from the next tick, not mid-flight.
    pub async fn set_interval(&self, interval_secs: f64) -> Result<(), EngineError> {
        if !interval_secs.is_finite() || interval_secs <= 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "sampling interval must be positive and finite, got {interval_secs}"
            )));
        }
        let mut general = self.state.general();
        general.interval_secs = interval_secs;
        self.state.set_general(general);
        let _ = self.interval_tx.send(Duration::from_secs_f64(interval_secs));
        self.checkpoint().await
    }

    /// Discard a metric's rolling statistics (explicit user action; this is
    /// in-memory state and is not checkpointed).
    pub fn reset_stats(&self, name: &str) -> Result<(), EngineError> {
        self.state.reset_stats(name)
    }

    /// Run a single collection cycle inline and return the violation
    /// events it produced (after appending them to the log).
    pub async fn tick_once(&self) -> Result<Vec<ViolationEvent>, EngineError> {
        let tick = self.tick.fetch_add(1, Ordering::AcqRel) + 1;
        run_tick(&self.state, &self.log, self.sample_timeout, tick).await
    }

    /// Start the background sampling driver.
    ///
    /// One task drives ticks at the configured interval; each tick spawns
    /// an independent, timeout-bounded collection task per enabled metric,
    /// so a slow or hanging source cannot delay unrelated metrics.
    pub fn start(&self) -> MonitorHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let state = self.state.clone();
        let log = self.log.clone();
        let interval_rx = self.interval_tx.subscribe();
        let sample_timeout = self.sample_timeout;
        let snapshot_path = self.snapshot_path.clone();
        let tick_counter = self.tick.clone();

        let task = tokio::spawn(async move {
            loop {
                // Interval changes apply from the next tick
                let interval = *interval_rx.borrow();
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        let tick = tick_counter.fetch_add(1, Ordering::AcqRel) + 1;
                        if let Err(error) = run_tick(&state, &log, sample_timeout, tick).await {
                            warn!(%error, tick, "event log write failed; in-memory state remains authoritative");
                        }
                        if let Some(path) = &snapshot_path {
                            let snapshot = publish::snapshot(&state);
                            if let Err(error) = publish::write_json(path, &snapshot).await {
                                warn!(%error, "snapshot export failed");
                            }
                        }
                    }
                    _ = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            debug!("sampling driver stopping");
                            break;
                        }
                    }
                }
            }
        });

        MonitorHandle { stop_tx, task }
    }
}

/// Handle for stopping the background sampling driver.
#[derive(Debug)]
pub struct MonitorHandle {
    stop_tx: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl MonitorHandle {
    /// Stop the driver, waiting for any in-flight tick to finish or time
    /// out (graceful drain).
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.task.await;
    }
}

/// Collect every enabled metric once.
///
/// Per-metric collection is independent: each sample runs in its own task
/// under its own timeout, and one metric's failure never invalidates
/// another's result for the tick.
async fn run_tick(
    state: &EngineState,
    log: &EventLog,
    sample_timeout: Duration,
    tick: u64,
) -> Result<Vec<ViolationEvent>, EngineError> {
    let policy = state.policy();
    let mut tasks = JoinSet::new();
    for metric in state.enabled_metrics() {
        let source = metric.source();
        let name = metric.name().to_string();
        tasks.spawn(async move {
            let result = match tokio::time::timeout(sample_timeout, source.sample()).await {
                Ok(result) => result,
                Err(_) => Err(CollectError::Timeout),
            };
            (name, result)
        });
    }

    let mut events = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let (name, result) = match joined {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(%error, tick, "collection task failed to run");
                continue;
            }
        };
        // The metric may have been replaced mid-tick; apply to whatever is
        // registered under the name now, if anything.
        let Some(metric) = state.get(&name) else {
            continue;
        };
        match result {
            Ok(value) => {
                debug!(metric = %name, value, tick, "sample applied");
                if let Some(event) = metric.apply_sample(tick, value, policy) {
                    warn!(metric = %name, message = %event.message, "threshold violation");
                    events.push(event);
                }
            }
            Err(error) => {
                warn!(metric = %name, %error, tick, "collection failed; skipping update");
                metric.record_failure(tick, &error);
            }
        }
    }

    // Completion order is nondeterministic across metrics; log in a stable
    // order within the tick.
    events.sort_by(|a, b| a.timestamp_ms.cmp(&b.timestamp_ms).then_with(|| a.metric.cmp(&b.metric)));
    if !events.is_empty() {
        let records: Vec<LogRecord> = events.iter().cloned().map(LogRecord::Violation).collect();
        log.append_many(&records).await?;
    }

    if state.general().log_stats {
        let metrics = state
            .enabled_metrics()
            .into_iter()
            .map(|m| (m.name().to_string(), m.report().stats))
            .collect();
        log.append(&LogRecord::Stats(StatsRecord {
            timestamp_ms: current_timestamp_ms(),
            metrics,
        }))
        .await?;
    }

    Ok(events)
}

/// Builder for configuring a [`Monitor`].
#[derive(Debug, Default)]
pub struct MonitorBuilder {
    settings_path: Option<PathBuf>,
    log_path: Option<PathBuf>,
    sample_timeout: Option<Duration>,
    snapshot_path: Option<PathBuf>,
    config: Option<MonitorConfig>,
}

impl MonitorBuilder {
    /// Path of the settings store (default `monitor_settings.json`).
    pub fn settings(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_path = Some(path.into());
        self
    }

    /// Path of the event log (default `monitor_log.json`).
    pub fn log(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Per-metric collection timeout (default 10 seconds).
    pub fn sample_timeout(mut self, timeout: Duration) -> Self {
        self.sample_timeout = Some(timeout);
        self
    }

    /// Export a snapshot JSON file after every tick.
    pub fn snapshot_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    /// Start from this configuration instead of loading the settings store
    /// (the document is validated and checkpointed on build).
    pub fn config(mut self, config: MonitorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the monitor: load (or adopt) the configuration and populate
    /// the registry. Rolling statistics always start from empty.
    pub async fn build(self) -> Result<Monitor, EngineError> {
        let store = SettingsStore::new(
            self.settings_path.unwrap_or_else(|| PathBuf::from("monitor_settings.json")),
        );
        let log = EventLog::new(self.log_path.unwrap_or_else(|| PathBuf::from("monitor_log.json")));

        let config = match self.config {
            Some(config) => {
                store.save(&config).await?;
                config
            }
            None => store.load_or_default().await?,
        };

        let state = Arc::new(EngineState::new());
        state.load_config(&config)?;

        let (interval_tx, _) = watch::channel(Duration::from_secs_f64(config.general.interval_secs));

        Ok(Monitor {
            state,
            store,
            log,
            sample_timeout: self.sample_timeout.unwrap_or(DEFAULT_SAMPLE_TIMEOUT),
            snapshot_path: self.snapshot_path,
            interval_tx,
            tick: Arc::new(AtomicU64::new(0)),
        })
    }
}
