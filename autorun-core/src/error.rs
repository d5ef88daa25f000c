//! Error Types
//!
//! Bookkeeping inside the reactive graph (attribution, dependent sets, the
//! invalidation queue) cannot fail. Everything fallible comes from user
//! functions, the flush budget, or loading configuration.

use thiserror::Error;

use crate::reactive::{Computation, ComputationId};

/// Boxed error returned by user computation functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used throughout the crate.
pub type Result<T, E = TrackerError> = std::result::Result<T, E>;

/// Errors surfaced by the reactive runtime.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// A computation's function returned an error.
    ///
    /// The computation is left running. The handle is carried along so the
    /// caller can decide whether to stop it.
    #[error("computation {id} failed: {source}")]
    Computation {
        id: ComputationId,
        computation: Computation,
        #[source]
        source: BoxError,
    },

    /// One computation re-ran more often in a single flush pass than the
    /// configured budget allows.
    ///
    /// The offending computation stays queued.
    #[error("computation {id} re-ran more than {limit} times in one flush")]
    FlushBudgetExceeded {
        limit: usize,
        id: ComputationId,
        computation: Computation,
    },

    /// `flush()` was called while a computation was running outside a flush.
    #[error("cannot flush from inside computation {0}")]
    FlushInsideComputation(ComputationId),

    /// A hook that needs a running computation was called without one.
    #[error("no computation is currently running")]
    NoCurrentComputation,

    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TrackerError {
    /// The computation involved in this error, if any.
    pub fn computation(&self) -> Option<&Computation> {
        match self {
            Self::Computation { computation, .. } | Self::FlushBudgetExceeded { computation, .. } => {
                Some(computation)
            }
            _ => None,
        }
    }
}
