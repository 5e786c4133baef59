//! Rolling statistics via Welford's online algorithm.

use hwwatch_types::StatsSummary;

/// Per-metric accumulator of count, current value, min, max, mean, and
/// variance.
///
/// Mean and variance are maintained online (Welford's method), so memory
/// stays constant and numerical stability holds for arbitrarily long runs.
/// State is process-lifetime: it resets on restart or on explicit
/// [`RollingStats::reset`], never from persistence.
#[derive(Debug, Clone, Default)]
pub struct RollingStats {
    count: u64,
    current: f64,
    min: f64,
    max: f64,
    mean: f64,
    m2: f64,
}

impl RollingStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one sample. Called exactly once per successful collection.
    pub fn update(&mut self, value: f64) {
        self.count += 1;
        self.current = value;
        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
            return;
        }
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    /// Discard all accumulated state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Sample standard deviation; `0.0` with a single sample.
    fn std(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        // m2 can drift a hair below zero on constant input
        (self.m2.max(0.0) / (self.count - 1) as f64).sqrt()
    }

    /// Current summary. All value fields are `None` while `count == 0`;
    /// callers must not substitute zeros, which would bias the first
    /// threshold comparison.
    pub fn summary(&self) -> StatsSummary {
        if self.count == 0 {
            return StatsSummary::default();
        }
        StatsSummary {
            count: self.count,
            current: Some(self.current),
            min: Some(self.min),
            max: Some(self.max),
            mean: Some(self.mean),
            std: Some(self.std()),
        }
    }
}
