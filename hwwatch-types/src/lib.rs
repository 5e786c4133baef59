//! # hwwatch-types
//!
//! Core types for hardware monitoring - the shared schema between the
//! monitoring engine and anything that renders its output.
//!
//! This crate defines the data model only; the sampling, aggregation, and
//! persistence logic lives in `hwwatch-engine`. Keeping the schema separate
//! lets web/API layers consume snapshots and event logs without linking the
//! engine itself.
//!
//! ## Type overview
//!
//! - [`MetricDescriptor`] - a named, periodically sampled numeric quantity
//!   and the command that produces it
//! - [`Threshold`] / [`Comparator`] - a bound applied to a metric's current
//!   value to detect violations
//! - [`MonitorConfig`] - the full persisted configuration (general settings
//!   plus every metric and its threshold)
//! - [`ViolationEvent`] - a durable record that a threshold was breached
//! - [`MonitorSnapshot`] / [`MetricReport`] - the point-in-time joined view
//!   handed to rendering layers

mod config;
mod event;
mod metrics;
mod snapshot;

pub use config::{
    ConfigError, GeneralConfig, MetricConfig, MonitorConfig, ViolationMode, ViolationPolicy,
};
pub use event::{ViolationEvent, ViolationKind};
pub use metrics::{Comparator, MetricDescriptor, ParseRule, Threshold};
pub use snapshot::{
    current_timestamp_ms, MetricReport, MonitorSnapshot, StatsSummary, ViolationState,
};
