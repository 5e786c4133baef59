//! Violation evaluation - the per-metric `Normal -> Violating -> Normal`
//! state machine.

use hwwatch_types::{Threshold, ViolationEvent, ViolationPolicy, ViolationMode, ViolationState};

/// Tracks one metric's violation state across ticks and decides which
/// events to emit.
///
/// The state machine starts in `Unknown` and only leaves it once a sample
/// is evaluated, so a metric with no samples never triggers a violation
/// regardless of threshold configuration.
#[derive(Debug, Clone, Default)]
pub struct ViolationTracker {
    state: ViolationState,
}

impl ViolationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ViolationState {
        self.state
    }

    /// Force the state back to `Unknown` (used when statistics are reset).
    pub fn reset(&mut self) {
        self.state = ViolationState::Unknown;
    }

    /// Evaluate a fresh sample against the metric's threshold.
    ///
    /// With no enabled threshold, the sample just moves the state to
    /// `Normal` and nothing is emitted - alerting is off, sampling
    /// continues. Re-entrant breaches are coalesced or logged individually
    /// depending on `policy.mode`; recoveries are emitted only when
    /// `policy.emit_recovery` is set.
    pub fn observe(
        &mut self,
        metric: &str,
        value: f64,
        threshold: Option<&Threshold>,
        policy: ViolationPolicy,
    ) -> Option<ViolationEvent> {
        let threshold = match threshold {
            Some(t) if t.enabled => *t,
            _ => {
                self.state = ViolationState::Normal;
                return None;
            }
        };

        if threshold.breached_by(value) {
            let already_violating = self.state == ViolationState::Violating;
            self.state = ViolationState::Violating;
            if already_violating && policy.mode == ViolationMode::OnTransition {
                return None;
            }
            return Some(ViolationEvent::breach(metric, value, threshold));
        }

        let was_violating = self.state == ViolationState::Violating;
        self.state = ViolationState::Normal;
        if was_violating && policy.emit_recovery {
            return Some(ViolationEvent::recovery(metric, value, threshold));
        }
        None
    }
}
