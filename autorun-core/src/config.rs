//! Runtime Configuration
//!
//! A `TrackerConfig` controls how a `ReactiveContext` behaves during flush
//! passes. It can be built in code or loaded from JSON:
//!
//! ```json
//! { "max_reruns_per_computation": 500, "error_policy": "log_and_continue" }
//! ```
//!
//! Missing fields fall back to their defaults.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};

/// Default cap on how often one computation re-runs within a flush pass.
pub const DEFAULT_MAX_RERUNS_PER_COMPUTATION: usize = 1000;

/// What a flush pass does when a computation returns an error and has no
/// `on_error` handler of its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushErrorPolicy {
    /// Abort the pass and return the error to whoever called `flush()`.
    /// Computations still queued remain pending.
    #[default]
    Propagate,

    /// Log the error and keep draining the queue.
    LogAndContinue,
}

/// Configuration for a reactive context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Upper bound on re-runs of any one computation in a flush pass.
    ///
    /// A computation that unconditionally invalidates itself would otherwise
    /// keep the flush loop spinning forever. The total number of re-runs in a
    /// pass is not limited.
    pub max_reruns_per_computation: usize,

    /// Error handling for computations without an `on_error` handler.
    pub error_policy: FlushErrorPolicy,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_reruns_per_computation: DEFAULT_MAX_RERUNS_PER_COMPUTATION,
            error_policy: FlushErrorPolicy::default(),
        }
    }
}

impl TrackerConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_reruns_per_computation == 0 {
            return Err(TrackerError::Config(
                "max_reruns_per_computation must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_max_reruns(mut self, limit: usize) -> Self {
        self.max_reruns_per_computation = limit;
        self
    }

    pub fn with_error_policy(mut self, policy: FlushErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }
}
