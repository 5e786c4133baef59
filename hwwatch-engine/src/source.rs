//! Metric source abstraction.
//!
//! A [`MetricSource`] turns "run something and read a number" into a uniform
//! capability: the scheduler samples every source the same way, so new
//! metrics are added by registering a descriptor rather than by
//! special-casing code paths.

use std::collections::VecDeque;
use std::fmt::Debug;

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use tokio::process::Command;

use hwwatch_types::{MetricDescriptor, ParseRule};

use crate::error::{CollectError, EngineError};

/// A pluggable producer of numeric samples for one metric.
///
/// `sample` is the only operation expected to block; the scheduler bounds
/// every call with a per-metric timeout so one stuck source cannot stall
/// the others.
#[async_trait]
pub trait MetricSource: Send + Sync + Debug {
    /// Collect one sample.
    async fn sample(&self) -> Result<f64, CollectError>;

    /// Human-readable description of the source, for logs and status lines.
    fn describe(&self) -> String;
}

/// A source that runs a shell command and parses its stdout.
///
/// Commands run through `sh -c` so pipelines like
/// `sensors | grep fan1` work as configured.
#[derive(Debug)]
pub struct CommandSource {
    command: String,
    pattern: Option<Regex>,
}

impl CommandSource {
    /// Build a source from a command and parse rule.
    ///
    /// Fails with [`EngineError::InvalidConfig`] if the pattern does not
    /// compile or has no capture group, so a bad rule is rejected at
    /// registration time rather than on every tick.
    pub fn new(command: impl Into<String>, parse: &ParseRule) -> Result<Self, EngineError> {
        let pattern = match parse {
            ParseRule::Auto => None,
            ParseRule::Pattern { regex } => {
                let compiled = Regex::new(regex)
                    .map_err(|e| EngineError::InvalidConfig(format!("bad parse pattern: {e}")))?;
                if compiled.captures_len() < 2 {
                    return Err(EngineError::InvalidConfig(format!(
                        "parse pattern '{regex}' needs one capture group"
                    )));
                }
                Some(compiled)
            }
        };
        Ok(Self {
            command: command.into(),
            pattern,
        })
    }

    /// Build a source straight from a descriptor.
    pub fn from_descriptor(descriptor: &MetricDescriptor) -> Result<Self, EngineError> {
        Self::new(descriptor.command.clone(), &descriptor.parse)
    }

    /// Extract the numeric value from raw command output.
    fn parse_output(&self, output: &str) -> Result<f64, CollectError> {
        let text = match &self.pattern {
            Some(regex) => regex
                .captures(output)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
                .ok_or_else(|| CollectError::Unparseable(truncate(output)))?,
            None => output.trim().to_string(),
        };
        text.trim()
            .parse::<f64>()
            .map_err(|_| CollectError::Unparseable(truncate(&text)))
    }
}

#[async_trait]
impl MetricSource for CommandSource {
    async fn sample(&self) -> Result<f64, CollectError> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .output()
            .await
            .map_err(|e| CollectError::Spawn(e.to_string()))?;

        if !output.status.success() {
            return Err(CollectError::CommandFailed {
                status: output.status.code().unwrap_or(-1),
                stderr: truncate(&String::from_utf8_lossy(&output.stderr)),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        self.parse_output(&stdout)
    }

    fn describe(&self) -> String {
        format!("command: {}", self.command)
    }
}

/// A source fed from an in-memory queue of scripted results.
///
/// Useful for tests and for embedding the engine behind a data feed that is
/// not command-driven. An exhausted queue reports a collection error rather
/// than repeating stale values.
#[derive(Debug, Default)]
pub struct ChannelSource {
    values: Mutex<VecDeque<Result<f64, CollectError>>>,
}

impl ChannelSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful sample.
    pub fn push(&self, value: f64) {
        self.values.lock().push_back(Ok(value));
    }

    /// Queue a collection failure.
    pub fn push_error(&self, error: CollectError) {
        self.values.lock().push_back(Err(error));
    }
}

#[async_trait]
impl MetricSource for ChannelSource {
    async fn sample(&self) -> Result<f64, CollectError> {
        self.values
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(CollectError::Unparseable("source exhausted".to_string())))
    }

    fn describe(&self) -> String {
        "channel".to_string()
    }
}

/// Cap stored output fragments so error messages and logs stay readable.
fn truncate(text: &str) -> String {
    const MAX: usize = 200;
    let trimmed = text.trim();
    if trimmed.len() <= MAX {
        trimmed.to_string()
    } else {
        let mut end = MAX;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &trimmed[..end])
    }
}
