//! Violation events - the durable alerting record.

use serde::{Deserialize, Serialize};

use crate::metrics::Threshold;
use crate::snapshot::current_timestamp_ms;

/// Whether an event records a breach or a recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// The sampled value breached the threshold.
    Breach,
    /// The metric returned to normal after violating.
    Recovery,
}

/// A durable record that a metric's value breached (or recovered from) its
/// configured threshold at a specific time.
///
/// Events are immutable once created and self-contained: each carries the
/// threshold it was evaluated against, so log records can be interpreted
/// without cross-referencing the configuration that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationEvent {
    /// Unix timestamp in milliseconds when the event was created.
    pub timestamp_ms: u64,
    /// The metric that breached or recovered.
    pub metric: String,
    /// The sampled value that triggered the event.
    pub value: f64,
    /// The threshold in effect when the event was created.
    pub threshold: Threshold,
    pub kind: ViolationKind,
    /// Human-readable summary, e.g. `cpu_temp = 90 breached threshold > 80`.
    pub message: String,
}

impl ViolationEvent {
    /// Create a breach event timestamped now.
    pub fn breach(metric: impl Into<String>, value: f64, threshold: Threshold) -> Self {
        let metric = metric.into();
        let message = format!("{metric} = {value} breached threshold {threshold}");
        Self {
            timestamp_ms: current_timestamp_ms(),
            metric,
            value,
            threshold,
            kind: ViolationKind::Breach,
            message,
        }
    }

    /// Create a recovery event timestamped now.
    pub fn recovery(metric: impl Into<String>, value: f64, threshold: Threshold) -> Self {
        let metric = metric.into();
        let message = format!("{metric} = {value} recovered below threshold {threshold}");
        Self {
            timestamp_ms: current_timestamp_ms(),
            metric,
            value,
            threshold,
            kind: ViolationKind::Recovery,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Comparator;

    #[test]
    fn breach_event_message_names_metric_and_threshold() {
        let event = ViolationEvent::breach("cpu_temp", 90.0, Threshold::new(Comparator::Gt, 80.0));
        assert_eq!(event.kind, ViolationKind::Breach);
        assert_eq!(event.message, "cpu_temp = 90 breached threshold > 80");
    }

    #[test]
    fn event_round_trips_through_json() {
        let event = ViolationEvent::recovery("fan_speed", 900.0, Threshold::new(Comparator::Lt, 1000.0));
        let json = serde_json::to_string(&event).unwrap();
        let back: ViolationEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn event_is_timestamped_at_creation() {
        let before = current_timestamp_ms();
        let event = ViolationEvent::breach("m", 1.0, Threshold::new(Comparator::Ge, 1.0));
        let after = current_timestamp_ms();
        assert!(event.timestamp_ms >= before && event.timestamp_ms <= after);
    }
}
