//! Seeding initial configuration from externally collected system data.
//!
//! A separate data-collection process probes the machine (lspci, sensors,
//! ethtool, ...) and produces two artifacts this module consumes:
//!
//! - a metrics catalog (JSON): every discovered metric with the command
//!   that samples it, tagged by kind - only `dynamic_single` entries yield
//!   a single numeric value and become monitorable metric definitions;
//! - a system-info capture (text): `=== Section ===` delimited command
//!   output, useful as hardware context for threshold advisors.

use std::collections::BTreeMap;

use serde::Deserialize;

use hwwatch_types::{
    Comparator, MetricConfig, MetricDescriptor, MonitorConfig, ParseRule, Threshold,
};

use crate::error::EngineError;

/// Catalog entries of this kind sample to a single numeric value.
const KIND_DYNAMIC_SINGLE: &str = "dynamic_single";

/// The metrics catalog document produced by the collection process.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsCatalog {
    #[serde(default)]
    pub sections: Vec<CatalogSection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogSection {
    #[serde(default)]
    pub metrics: Vec<CatalogMetric>,
}

/// One discovered metric. Non-numeric kinds (`static`, `dynamic_multi`)
/// are carried in the catalog but are not monitorable.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogMetric {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
}

impl MetricsCatalog {
    pub fn parse(json: &str) -> Result<Self, EngineError> {
        serde_json::from_str(json)
            .map_err(|e| EngineError::InvalidConfig(format!("bad metrics catalog: {e}")))
    }
}

/// Build an initial monitor configuration from a metrics catalog.
///
/// Every `dynamic_single` entry with a command becomes a metric definition,
/// disabled by default so the user opts in per metric. `ping_rtt` is the
/// exception: it is enabled out of the box with a `> 100` ms threshold,
/// giving a fresh install one working metric.
pub fn seed_config(catalog: &MetricsCatalog) -> MonitorConfig {
    let mut config = MonitorConfig::new();
    for section in &catalog.sections {
        for metric in &section.metrics {
            if metric.kind != KIND_DYNAMIC_SINGLE {
                continue;
            }
            let Some(command) = metric.command.as_deref() else {
                continue;
            };
            if metric.name.is_empty() || command.is_empty() {
                continue;
            }
            // Catalogs can repeat a metric across sections; first wins
            if config.metric(&metric.name).is_some() {
                continue;
            }

            let descriptor = MetricDescriptor::new(&metric.name, command)
                .with_parse(builtin_parse_rule(&metric.name))
                .with_unit(metric.unit.clone().unwrap_or_default())
                .with_enabled(metric.name == "ping_rtt");
            let threshold = (metric.name == "ping_rtt")
                .then(|| Threshold::new(Comparator::Gt, 100.0));

            config.metrics.push(MetricConfig {
                descriptor,
                threshold,
            });
        }
    }
    config
}

/// Parse a catalog document and build the seeded configuration in one step.
pub fn seed_from_str(json: &str) -> Result<MonitorConfig, EngineError> {
    let catalog = MetricsCatalog::parse(json)?;
    let config = seed_config(&catalog);
    config.validate()?;
    Ok(config)
}

/// Known output shapes that need more than a bare float parse.
fn builtin_parse_rule(name: &str) -> ParseRule {
    let regex = match name {
        "ping_rtt" => r"time=([0-9.]+)\s*ms",
        "cpu_temp" => r"Package id 0:\s+\+?([0-9.]+)",
        "fan1_speed" => r"fan1:\s+([0-9]+)",
        _ => return ParseRule::Auto,
    };
    ParseRule::Pattern {
        regex: regex.to_string(),
    }
}

/// Parse a `=== Section ===` delimited system-info capture into its
/// sections.
pub fn parse_system_info(text: &str) -> BTreeMap<String, String> {
    let mut sections = BTreeMap::new();
    let mut current: Option<String> = None;
    let mut body: Vec<&str> = Vec::new();

    for line in text.lines() {
        let line = line.trim_end();
        if line.starts_with("===") && line.ends_with("===") && line.len() >= 6 {
            if let Some(name) = current.take() {
                sections.insert(name, body.join("\n").trim().to_string());
            }
            current = Some(line.trim_matches('=').trim().to_string());
            body.clear();
        } else if current.is_some() {
            body.push(line);
        }
    }
    if let Some(name) = current {
        sections.insert(name, body.join("\n").trim().to_string());
    }

    sections.retain(|_, v| !v.is_empty());
    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"{
        "sections": [
            {
                "metrics": [
                    {"name": "cpu_info", "tool": "lscpu", "command": "lscpu", "type": "static"},
                    {"name": "cpu_frequency", "tool": "lscpu", "command": "lscpu | awk '/MHz/ {print $3}'", "type": "dynamic_single", "unit": "MHz"},
                    {"name": "ping_rtt", "tool": "ping", "command": "ping -c 1 google.com", "type": "dynamic_single", "unit": "ms"}
                ]
            },
            {
                "metrics": [
                    {"name": "enp0s1_drops", "command": "cat /sys/class/net/enp0s1/statistics/rx_dropped", "type": "dynamic_single"},
                    {"name": "sensors_full", "command": "sensors", "type": "dynamic_multi"}
                ]
            }
        ]
    }"#;

    #[test]
    fn seed_keeps_only_dynamic_single_entries() {
        let config = seed_from_str(CATALOG).unwrap();
        let names: Vec<&str> =
            config.metrics.iter().map(|m| m.descriptor.name.as_str()).collect();
        assert_eq!(names, vec!["cpu_frequency", "ping_rtt", "enp0s1_drops"]);
    }

    #[test]
    fn seed_enables_only_ping_rtt_with_default_threshold() {
        let config = seed_from_str(CATALOG).unwrap();
        assert_eq!(config.enabled_metrics(), vec!["ping_rtt"]);

        let ping = config.metric("ping_rtt").unwrap();
        assert_eq!(ping.threshold, Some(Threshold::new(Comparator::Gt, 100.0)));
        assert_eq!(ping.descriptor.unit, "ms");
        assert!(matches!(ping.descriptor.parse, ParseRule::Pattern { .. }));

        assert!(config.metric("cpu_frequency").unwrap().threshold.is_none());
    }

    #[test]
    fn seed_ignores_entries_without_commands() {
        let config = seed_from_str(
            r#"{"sections":[{"metrics":[{"name":"ghost","type":"dynamic_single"}]}]}"#,
        )
        .unwrap();
        assert!(config.metrics.is_empty());
    }

    #[test]
    fn seed_deduplicates_repeated_names() {
        let config = seed_from_str(
            r#"{"sections":[
                {"metrics":[{"name":"m","command":"echo 1","type":"dynamic_single"}]},
                {"metrics":[{"name":"m","command":"echo 2","type":"dynamic_single"}]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(config.metrics.len(), 1);
        assert_eq!(config.metrics[0].descriptor.command, "echo 1");
    }

    #[test]
    fn malformed_catalog_rejected() {
        assert!(matches!(
            seed_from_str("{nope"),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn unknown_metric_names_get_auto_parse() {
        assert_eq!(builtin_parse_rule("enp0s1_drops"), ParseRule::Auto);
        assert!(matches!(builtin_parse_rule("cpu_temp"), ParseRule::Pattern { .. }));
    }

    #[test]
    fn system_info_sections_parsed() {
        let text = "=== CPU Info ===\nModel name: Xeon\nCPU(s): 8\n\n=== NIC Model Info ===\n00:1f.6 Ethernet controller\n";
        let sections = parse_system_info(text);
        assert_eq!(sections.len(), 2);
        assert!(sections.get("CPU Info").unwrap().contains("Model name: Xeon"));
        assert!(sections.get("NIC Model Info").unwrap().contains("Ethernet controller"));
    }

    #[test]
    fn system_info_ignores_preamble_and_empty_sections() {
        let text = "collected 2026-01-01\n=== Empty ===\n\n=== Disk ===\nsda 512G\n";
        let sections = parse_system_info(text);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections.get("Disk").unwrap(), "sda 512G");
    }
}
