//! Executor configuration.
//!
//! Every field has a serde default, so a partial JSON document (or none at
//! all) yields a usable configuration.

use crate::errors::BrickflowError;
use serde::{Deserialize, Serialize};

/// Default nested pipeline depth limit.
pub const DEFAULT_MAX_DEPTH: u32 = 32;

/// Default number of runs retained per trace owner.
pub const DEFAULT_MAX_RUNS_PER_OWNER: usize = 3;

fn default_max_depth() -> u32 {
    DEFAULT_MAX_DEPTH
}

fn default_true() -> bool {
    true
}

fn default_max_runs_per_owner() -> usize {
    DEFAULT_MAX_RUNS_PER_OWNER
}

fn default_log_filter() -> String {
    "brickflow=info".to_string()
}

/// How a detached (fire-and-forget) run relates to its parent's abort signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetachedAbortPolicy {
    /// The detached run has its own abort signal and outlives the parent.
    #[default]
    Independent,
    /// The detached run is cancelled when the parent's signal fires.
    Inherit,
}

/// Trace retention settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRetentionConfig {
    /// Runs kept per top-level owner; older runs are evicted.
    #[serde(default = "default_max_runs_per_owner")]
    pub max_runs_per_owner: usize,
}

impl Default for TraceRetentionConfig {
    fn default() -> Self {
        Self {
            max_runs_per_owner: DEFAULT_MAX_RUNS_PER_OWNER,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging settings used by [`crate::observability::init_tracing`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            format: LogFormat::Pretty,
        }
    }
}

/// Configuration for a [`crate::pipeline::PipelineExecutor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Maximum nesting depth of sub-pipelines.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    /// Whether rendered arguments and outputs are stored in traces.
    #[serde(default = "default_true")]
    pub trace_values: bool,
    /// Whether top-level runs reject duplicate instance ids.
    #[serde(default = "default_true")]
    pub validate_instance_ids: bool,
    /// Whether bricks fail when the platform lacks a required capability.
    #[serde(default = "default_true")]
    pub enforce_capabilities: bool,
    /// Abort relationship of detached runs.
    #[serde(default)]
    pub detached_abort: DetachedAbortPolicy,
    /// Trace retention.
    #[serde(default)]
    pub trace_retention: TraceRetentionConfig,
    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            trace_values: true,
            validate_instance_ids: true,
            enforce_capabilities: true,
            detached_abort: DetachedAbortPolicy::Independent,
            trace_retention: TraceRetentionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ExecutorConfig {
    /// Creates a default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from JSON.
    pub fn from_json_str(json: &str) -> Result<Self, BrickflowError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Sets the maximum depth.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Sets whether values are traced.
    #[must_use]
    pub fn with_trace_values(mut self, trace_values: bool) -> Self {
        self.trace_values = trace_values;
        self
    }

    /// Sets whether instance ids are validated.
    #[must_use]
    pub fn with_validate_instance_ids(mut self, validate: bool) -> Self {
        self.validate_instance_ids = validate;
        self
    }

    /// Sets whether capabilities are enforced.
    #[must_use]
    pub fn with_enforce_capabilities(mut self, enforce: bool) -> Self {
        self.enforce_capabilities = enforce;
        self
    }

    /// Sets the detached abort policy.
    #[must_use]
    pub fn with_detached_abort(mut self, policy: DetachedAbortPolicy) -> Self {
        self.detached_abort = policy;
        self
    }

    /// Sets the number of retained runs per owner.
    #[must_use]
    pub fn with_max_runs_per_owner(mut self, runs: usize) -> Self {
        self.trace_retention.max_runs_per_owner = runs.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExecutorConfig::default();
        assert_eq!(config.max_depth, 32);
        assert!(config.trace_values);
        assert_eq!(config.detached_abort, DetachedAbortPolicy::Independent);
        assert_eq!(config.trace_retention.max_runs_per_owner, 3);
    }

    #[test]
    fn test_partial_json() {
        let config = ExecutorConfig::from_json_str(
            r#"{"max_depth": 4, "detached_abort": "inherit", "logging": {"format": "json"}}"#,
        )
        .unwrap();

        assert_eq!(config.max_depth, 4);
        assert_eq!(config.detached_abort, DetachedAbortPolicy::Inherit);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.filter, "brickflow=info");
        assert!(config.enforce_capabilities);
    }

    #[test]
    fn test_empty_json_is_default() {
        assert_eq!(ExecutorConfig::from_json_str("{}").unwrap(), ExecutorConfig::default());
    }

    #[test]
    fn test_invalid_json() {
        let err = ExecutorConfig::from_json_str("{\"max_depth\": \"deep\"}").unwrap_err();
        assert!(matches!(err, BrickflowError::Serialization(_)));
    }

    #[test]
    fn test_builder() {
        let config = ExecutorConfig::new()
            .with_max_depth(2)
            .with_trace_values(false)
            .with_max_runs_per_owner(0);
        assert_eq!(config.max_depth, 2);
        assert!(!config.trace_values);
        assert_eq!(config.trace_retention.max_runs_per_owner, 1);
    }
}
