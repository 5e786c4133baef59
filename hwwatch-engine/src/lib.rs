//! # hwwatch-engine
//!
//! The hardware monitoring core: periodic sampling, rolling statistics,
//! threshold evaluation, and durable configuration/log persistence.
//!
//! This crate deliberately has no rendering or transport surface. It
//! consumes raw metric sources (shell commands, or anything implementing
//! [`MetricSource`]) and exposes two things to the outside: point-in-time
//! [`MonitorSnapshot`]s and the persisted settings/log files.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hwwatch_engine::Monitor;
//! use hwwatch_types::Comparator;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Load definitions and thresholds from the settings store
//!     let monitor = Monitor::builder()
//!         .settings("monitor_settings.json")
//!         .log("monitor_log.json")
//!         .sample_timeout(Duration::from_secs(5))
//!         .build()
//!         .await?;
//!
//!     // Thresholds are edited (and checkpointed) through the monitor
//!     monitor.set_threshold("cpu_temp", Comparator::Gt, 80.0).await?;
//!
//!     // Sample in the background until shutdown
//!     let handle = monitor.start();
//!     tokio::signal::ctrl_c().await?;
//!     handle.stop().await;
//!
//!     println!("{}", serde_json::to_string_pretty(&monitor.snapshot())?);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`source`]: the [`MetricSource`] capability and its command-driven
//!   implementation
//! - [`stats`]: Welford online mean/variance per metric
//! - [`state`]: the shared registry joining descriptors, thresholds,
//!   statistics, and violation state
//! - [`evaluate`]: the `Normal -> Violating -> Normal` state machine
//! - [`monitor`]: the tick driver and mutation/checkpoint API
//! - [`persist`]: atomic settings store and append-only event log
//! - [`publish`]: the snapshot view handed to rendering layers
//! - [`seed`]: initial configuration from externally collected system data

pub mod error;
pub mod evaluate;
pub mod monitor;
pub mod persist;
pub mod publish;
pub mod seed;
pub mod source;
pub mod state;
pub mod stats;

pub use error::{CollectError, EngineError};
pub use monitor::{Monitor, MonitorBuilder, MonitorHandle};
pub use persist::{EventLog, LogRecord, SettingsStore, StatsRecord};
pub use source::{ChannelSource, CommandSource, MetricSource};
pub use state::{EngineState, MetricState};
pub use stats::RollingStats;

// Re-export the shared schema for convenience
pub use hwwatch_types::{
    Comparator, MetricDescriptor, MetricReport, MonitorConfig, MonitorSnapshot, Threshold,
    ViolationEvent, ViolationState,
};
