//! Error types for the monitoring engine.

use thiserror::Error;

use hwwatch_types::ConfigError;

/// Errors that can occur when sampling a metric source.
///
/// Collection errors are isolated to one metric for one tick: the metric is
/// shown as stale and its rolling statistics skip the update, but the
/// scheduler and every other metric carry on.
#[derive(Debug, Clone, Error)]
pub enum CollectError {
    /// The collection command could not be started.
    #[error("failed to spawn command: {0}")]
    Spawn(String),

    /// The command ran but exited with a failure status.
    #[error("command exited with status {status}: {stderr}")]
    CommandFailed { status: i32, stderr: String },

    /// The command output did not contain a numeric value.
    #[error("unparseable output: {0}")]
    Unparseable(String),

    /// The sample did not complete within the per-metric timeout.
    #[error("collection timed out")]
    Timeout,
}

/// Errors surfaced by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An operation referenced a metric that was never registered. The
    /// caller must define the metric first.
    #[error("unknown metric '{0}'")]
    UnknownMetric(String),

    /// A malformed threshold, comparator, or descriptor was rejected before
    /// it could reach the registry.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A settings or log write failed after bounded retries. In-memory
    /// state remains authoritative until a write succeeds.
    #[error("persistence failed for {path}: {source}")]
    Persistence {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A persisted document could not be decoded.
    #[error("corrupt persisted state in {path}: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<ConfigError> for EngineError {
    fn from(err: ConfigError) -> Self {
        EngineError::InvalidConfig(err.to_string())
    }
}
