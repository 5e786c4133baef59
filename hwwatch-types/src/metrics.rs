//! Metric descriptors and thresholds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Comparison operator for threshold evaluation.
///
/// Evaluation uses exact float semantics matching the configured operator;
/// there is no implicit tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    /// Violates when `value < bound`.
    #[serde(rename = "<")]
    Lt,
    /// Violates when `value <= bound`.
    #[serde(rename = "<=")]
    Le,
    /// Violates when `value > bound`.
    #[serde(rename = ">")]
    Gt,
    /// Violates when `value >= bound`.
    #[serde(rename = ">=")]
    Ge,
    /// Violates when `value == bound`.
    #[serde(rename = "==")]
    Eq,
}

impl Comparator {
    /// Evaluate `value <op> bound`.
    pub fn evaluate(self, value: f64, bound: f64) -> bool {
        match self {
            Comparator::Lt => value < bound,
            Comparator::Le => value <= bound,
            Comparator::Gt => value > bound,
            Comparator::Ge => value >= bound,
            Comparator::Eq => value == bound,
        }
    }

    /// The operator's textual form, as used in settings files and messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
            Comparator::Eq => "==",
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Comparator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "<" => Ok(Comparator::Lt),
            "<=" => Ok(Comparator::Le),
            ">" => Ok(Comparator::Gt),
            ">=" => Ok(Comparator::Ge),
            "==" => Ok(Comparator::Eq),
            other => Err(format!("unknown comparator '{other}'")),
        }
    }
}

/// A threshold applied to a metric's current value.
///
/// At most one threshold exists per metric; setting a new one overwrites in
/// place. Disabling a threshold stops violation evaluation while the metric
/// itself keeps sampling - monitoring and alerting toggle independently.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub comparator: Comparator,
    pub bound: f64,
    /// Whether violation evaluation is active for this threshold.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Threshold {
    /// Create an enabled threshold.
    pub fn new(comparator: Comparator, bound: f64) -> Self {
        Self {
            comparator,
            bound,
            enabled: true,
        }
    }

    /// Check whether `value` breaches this threshold.
    ///
    /// A disabled threshold never breaches.
    pub fn breached_by(&self, value: f64) -> bool {
        self.enabled && self.comparator.evaluate(value, self.bound)
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.comparator, self.bound)
    }
}

/// How to extract a numeric sample from raw command output.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseRule {
    /// Trim the output and parse it as a float.
    #[default]
    Auto,
    /// Apply a regex with one capture group and parse the capture as a float.
    ///
    /// Used for tools whose output embeds the value in prose, e.g.
    /// `time=([0-9.]+)\s*ms` for ping round-trip times.
    Pattern { regex: String },
}

/// A named, periodically sampled numeric quantity.
///
/// Descriptors are created at configuration time (manually or seeded from a
/// metrics catalog) and are soft-disabled rather than destroyed, so history
/// referencing them stays interpretable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDescriptor {
    /// Unique identifier, e.g. `cpu_temp`.
    pub name: String,
    /// Shell command whose output yields the sample.
    pub command: String,
    /// How to extract the numeric value from the command output.
    #[serde(default)]
    pub parse: ParseRule,
    /// Display unit, e.g. `°C` or `RPM`. May be empty.
    #[serde(default)]
    pub unit: String,
    /// Whether this metric is sampled on each tick.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl MetricDescriptor {
    /// Create an enabled descriptor with auto parsing and no unit.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            parse: ParseRule::Auto,
            unit: String::new(),
            enabled: true,
        }
    }

    /// Set the parse rule.
    pub fn with_parse(mut self, parse: ParseRule) -> Self {
        self.parse = parse;
        self
    }

    /// Set the display unit.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Set the enabled flag.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparator_evaluate_all_operators() {
        assert!(Comparator::Lt.evaluate(1.0, 2.0));
        assert!(!Comparator::Lt.evaluate(2.0, 2.0));
        assert!(Comparator::Le.evaluate(2.0, 2.0));
        assert!(Comparator::Gt.evaluate(3.0, 2.0));
        assert!(!Comparator::Gt.evaluate(2.0, 2.0));
        assert!(Comparator::Ge.evaluate(2.0, 2.0));
        assert!(Comparator::Eq.evaluate(2.0, 2.0));
        assert!(!Comparator::Eq.evaluate(2.0000001, 2.0));
    }

    #[test]
    fn comparator_parse_display_round_trip() {
        for op in ["<", "<=", ">", ">=", "=="] {
            let parsed: Comparator = op.parse().unwrap();
            assert_eq!(parsed.to_string(), op);
        }
    }

    #[test]
    fn comparator_parse_rejects_garbage() {
        assert!("!=".parse::<Comparator>().is_err());
        assert!("".parse::<Comparator>().is_err());
        assert!("gt".parse::<Comparator>().is_err());
    }

    #[test]
    fn comparator_serde_uses_operator_strings() {
        let json = serde_json::to_string(&Comparator::Ge).unwrap();
        assert_eq!(json, "\">=\"");
        let back: Comparator = serde_json::from_str("\"<=\"").unwrap();
        assert_eq!(back, Comparator::Le);
    }

    #[test]
    fn disabled_threshold_never_breaches() {
        let mut t = Threshold::new(Comparator::Gt, 80.0);
        assert!(t.breached_by(90.0));
        t.enabled = false;
        assert!(!t.breached_by(90.0));
    }

    #[test]
    fn descriptor_defaults_from_json() {
        let d: MetricDescriptor =
            serde_json::from_str(r#"{"name":"cpu_temp","command":"sensors"}"#).unwrap();
        assert!(d.enabled);
        assert_eq!(d.parse, ParseRule::Auto);
        assert_eq!(d.unit, "");
    }

    #[test]
    fn parse_rule_pattern_round_trips() {
        let rule = ParseRule::Pattern {
            regex: r"fan1:\s+(\d+)".to_string(),
        };
        let json = serde_json::to_string(&rule).unwrap();
        let back: ParseRule = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rule);
    }
}
