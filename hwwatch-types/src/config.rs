//! Persisted monitor configuration.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metrics::{MetricDescriptor, Threshold};

/// Error raised when a configuration document fails validation.
///
/// Rejected synchronously at the API boundary, before the registry sees any
/// part of the document - no partial application.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("sampling interval must be positive and finite, got {0}")]
    InvalidInterval(f64),
    #[error("duplicate metric name '{0}'")]
    DuplicateMetric(String),
    #[error("metric name must not be empty")]
    EmptyMetricName,
    #[error("metric '{0}' has an empty command")]
    EmptyCommand(String),
    #[error("threshold bound for '{0}' must be finite")]
    NonFiniteBound(String),
}

/// When violation events are emitted for an already-violating metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationMode {
    /// One event per breaching tick (repeated breaches are logged
    /// individually).
    #[default]
    EveryTick,
    /// One event per Normal -> Violating transition; re-entrant breaches
    /// are coalesced.
    OnTransition,
}

/// Policy for turning threshold breaches into events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ViolationPolicy {
    #[serde(default)]
    pub mode: ViolationMode,
    /// Emit a recovery event on the Violating -> Normal transition.
    #[serde(default)]
    pub emit_recovery: bool,
}

/// General (non-per-metric) settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Seconds between sampling ticks.
    #[serde(default = "default_interval")]
    pub interval_secs: f64,
    /// Display hint: how many recent rows a table renderer should show.
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
    #[serde(default)]
    pub policy: ViolationPolicy,
    /// Append a per-tick statistics record to the event log.
    #[serde(default)]
    pub log_stats: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            max_rows: default_max_rows(),
            policy: ViolationPolicy::default(),
            log_stats: false,
        }
    }
}

/// One metric's persisted configuration: its descriptor plus at most one
/// threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricConfig {
    #[serde(flatten)]
    pub descriptor: MetricDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<Threshold>,
}

impl From<MetricDescriptor> for MetricConfig {
    fn from(descriptor: MetricDescriptor) -> Self {
        Self {
            descriptor,
            threshold: None,
        }
    }
}

/// The full monitor configuration, as persisted in the settings store.
///
/// Invariants (checked by [`MonitorConfig::validate`]): metric names are
/// unique and non-empty, every threshold bound is finite, and the sampling
/// interval is positive. Every threshold belongs to the metric entry that
/// carries it, so a threshold can never reference a missing metric.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub metrics: Vec<MetricConfig>,
}

impl MonitorConfig {
    /// Create a configuration with default general settings and no metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.general.interval_secs.is_finite() || self.general.interval_secs <= 0.0 {
            return Err(ConfigError::InvalidInterval(self.general.interval_secs));
        }

        let mut seen = BTreeSet::new();
        for metric in &self.metrics {
            let name = &metric.descriptor.name;
            if name.is_empty() {
                return Err(ConfigError::EmptyMetricName);
            }
            if metric.descriptor.command.is_empty() {
                return Err(ConfigError::EmptyCommand(name.clone()));
            }
            if !seen.insert(name.clone()) {
                return Err(ConfigError::DuplicateMetric(name.clone()));
            }
            if let Some(threshold) = &metric.threshold {
                if !threshold.bound.is_finite() {
                    return Err(ConfigError::NonFiniteBound(name.clone()));
                }
            }
        }
        Ok(())
    }

    /// Look up a metric entry by name.
    pub fn metric(&self, name: &str) -> Option<&MetricConfig> {
        self.metrics.iter().find(|m| m.descriptor.name == name)
    }

    /// Names of all metrics currently enabled for sampling.
    pub fn enabled_metrics(&self) -> Vec<&str> {
        self.metrics
            .iter()
            .filter(|m| m.descriptor.enabled)
            .map(|m| m.descriptor.name.as_str())
            .collect()
    }
}

fn default_interval() -> f64 {
    5.0
}

fn default_max_rows() -> usize {
    5
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Comparator;

    fn config_with(metrics: Vec<MetricConfig>) -> MonitorConfig {
        MonitorConfig {
            general: GeneralConfig::default(),
            metrics,
        }
    }

    #[test]
    fn default_interval_is_five_seconds() {
        assert_eq!(GeneralConfig::default().interval_secs, 5.0);
    }

    #[test]
    fn empty_config_is_valid() {
        assert!(MonitorConfig::new().validate().is_ok());
    }

    #[test]
    fn duplicate_metric_names_rejected() {
        let cfg = config_with(vec![
            MetricDescriptor::new("cpu_temp", "sensors").into(),
            MetricDescriptor::new("cpu_temp", "sensors -j").into(),
        ]);
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::DuplicateMetric("cpu_temp".to_string()))
        );
    }

    #[test]
    fn non_positive_interval_rejected() {
        let mut cfg = MonitorConfig::new();
        cfg.general.interval_secs = 0.0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidInterval(_))
        ));
        cfg.general.interval_secs = f64::NAN;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidInterval(_))
        ));
    }

    #[test]
    fn non_finite_bound_rejected() {
        let mut entry: MetricConfig = MetricDescriptor::new("fan_speed", "sensors").into();
        entry.threshold = Some(Threshold::new(Comparator::Gt, f64::INFINITY));
        let cfg = config_with(vec![entry]);
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::NonFiniteBound("fan_speed".to_string()))
        );
    }

    #[test]
    fn enabled_metrics_filters_disabled() {
        let cfg = config_with(vec![
            MetricDescriptor::new("a", "true").into(),
            MetricDescriptor::new("b", "true").with_enabled(false).into(),
        ]);
        assert_eq!(cfg.enabled_metrics(), vec!["a"]);
    }

    #[test]
    fn settings_document_round_trips() {
        let mut entry: MetricConfig =
            MetricDescriptor::new("ping_rtt", "ping -c 1 google.com").with_unit("ms").into();
        entry.threshold = Some(Threshold::new(Comparator::Gt, 100.0));
        let cfg = config_with(vec![entry]);

        let json = serde_json::to_string_pretty(&cfg).unwrap();
        let back: MonitorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn minimal_document_fills_defaults() {
        let cfg: MonitorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.general.interval_secs, 5.0);
        assert_eq!(cfg.general.max_rows, 5);
        assert_eq!(cfg.general.policy.mode, ViolationMode::EveryTick);
        assert!(!cfg.general.policy.emit_recovery);
        assert!(cfg.metrics.is_empty());
    }
}
