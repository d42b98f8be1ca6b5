//! Error types for the behavior runtime.
//!
//! Most misuse of the engine is a construction defect (a node kind that
//! never chose an activation strategy, a feedback loop between sinks) and
//! panics. The conditions below are the ones a caller can reasonably
//! observe and handle.

use thiserror::Error;

/// Errors surfaced by behaviors, futures and configuration loading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BehaviorError {
    /// The node has no closed-form function of time.
    #[error("{0} behavior has no semantic representation")]
    NoSemantic(&'static str),

    /// The node cannot be sampled on demand.
    #[error("{0} behavior does not support sampling")]
    NotSampleable(&'static str),

    /// A one-shot result was resolved twice.
    #[error("future has already been resolved")]
    AlreadyResolved,

    /// The runtime configuration could not be parsed.
    #[error("invalid runtime configuration: {0}")]
    Config(String),
}

/// Result alias used throughout the crate.
pub type Result<T, E = BehaviorError> = std::result::Result<T, E>;
