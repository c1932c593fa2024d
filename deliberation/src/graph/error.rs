//! Issue graph error types

use thiserror::Error;

use super::types::NodeKind;

/// Result type alias for graph operations
pub type GraphResult<T> = Result<T, GraphError>;

/// Errors raised by [`IssueGraph`](super::IssueGraph) operations.
///
/// Everything here is an invalid operation: either a human command that must
/// be rejected, or model output that must not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("invalid node id: {0:?}")]
    InvalidNodeId(String),

    #[error("node not found: {0}")]
    NotFound(String),

    #[error("node {id} is a {actual}, expected {expected}")]
    WrongKind {
        id: String,
        expected: NodeKind,
        actual: NodeKind,
    },

    #[error("node {0} is deleted")]
    DeletedNode(String),

    /// Model output tried to reuse the id of a deleted position.
    #[error("generated position {0} targets a deleted position")]
    DeletedTarget(String),

    /// Model output invented an id that does not extend the live sequence.
    #[error("generated position {candidate} does not follow current maximum {current_max}")]
    OutOfOrderId {
        candidate: String,
        current_max: String,
    },

    #[error("corrupted snapshot: {0}")]
    CorruptedSnapshot(String),
}
