//! Error taxonomy for graph construction and execution.
//!
//! Every failure in the engine is a caller or topology programming error,
//! never a transient condition, so nothing here is retried. Build-time
//! failures ([`GraphError::Contract`], [`GraphError::Wiring`],
//! [`GraphError::AlreadyInitialized`]) refuse the graph outright; run-time
//! failures ([`GraphError::OrderingViolation`], [`GraphError::ClosedStream`],
//! [`GraphError::TypeMismatch`], [`GraphError::Calculator`]) are fatal to the
//! run and surface either from the call that triggered them or from
//! [`wait_until_done`](crate::graph::CalculatorGraph::wait_until_done).
//!
//! [`GraphError::StopRequested`] is the one non-failure: a cooperative,
//! calculator-initiated shutdown signal the scheduler filters out of the run
//! result.

use crate::timestamp::Timestamp;
use thiserror::Error;

/// Errors produced by graph construction and execution.
#[derive(Debug, Clone, Error)]
pub enum GraphError {
    /// A calculator's declared contract is invalid, or a required side packet
    /// was missing at bind time. Build-time, fatal.
    #[error("contract error in calculator '{node}': {message}")]
    Contract {
        /// Name of the node whose contract failed.
        node: String,
        /// What was wrong with the contract.
        message: String,
    },

    /// The topology could not be wired: malformed config, unknown calculator,
    /// missing or duplicate stream producer, type mismatch across an edge, or
    /// a cyclic dependency. Build-time, fatal.
    #[error("wiring error: {0}")]
    Wiring(String),

    /// `initialize` was called on a graph that is already built.
    #[error("graph is already initialized")]
    AlreadyInitialized,

    /// A producer emitted a timestamp that is not strictly greater than the
    /// last timestamp on the same stream. Indicates a producer bug; fatal to
    /// the run, never retried.
    #[error("ordering violation on stream '{stream}': timestamp {timestamp} is not after {last}")]
    OrderingViolation {
        /// Name of the stream the packet was emitted on.
        stream: String,
        /// The offending timestamp.
        timestamp: Timestamp,
        /// The last timestamp observed on the stream.
        last: Timestamp,
    },

    /// A packet was injected or emitted on a stream that has been closed.
    #[error("stream '{0}' is closed")]
    ClosedStream(String),

    /// A payload was accessed as (or emitted with) a type that does not match
    /// the stream's resolved type.
    #[error("type mismatch: expected {expected}, found {actual}")]
    TypeMismatch {
        /// The type that was requested or declared.
        expected: String,
        /// The type actually carried by the packet.
        actual: String,
    },

    /// A calculator hook failed.
    #[error("calculator '{node}' failed: {message}")]
    Calculator {
        /// Name of the failing node.
        node: String,
        /// Description of the failure.
        message: String,
    },

    /// Cooperative, calculator-initiated graph shutdown. Not a failure: the
    /// scheduler drains the graph and reports the run as successful.
    #[error("stop requested")]
    StopRequested,
}

impl GraphError {
    /// Builds a [`GraphError::Contract`] error.
    pub fn contract(node: impl Into<String>, message: impl Into<String>) -> Self {
        GraphError::Contract {
            node: node.into(),
            message: message.into(),
        }
    }

    /// Builds a [`GraphError::Wiring`] error.
    pub fn wiring(message: impl Into<String>) -> Self {
        GraphError::Wiring(message.into())
    }

    /// Builds a [`GraphError::Calculator`] error.
    pub fn calculator(node: impl Into<String>, message: impl Into<String>) -> Self {
        GraphError::Calculator {
            node: node.into(),
            message: message.into(),
        }
    }

    /// Returns true for the cooperative stop signal, which is not a failure.
    #[must_use]
    pub fn is_stop_request(&self) -> bool {
        matches!(self, GraphError::StopRequested)
    }
}
