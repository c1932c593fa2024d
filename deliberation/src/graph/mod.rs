//! Issue map: Issues → Positions → Arguments.
//!
//! An arena addressed by permanent dotted ids. Nodes are soft-deleted and
//! never renumbered, so ids handed to clients and model prompts stay valid
//! for the whole session.
//!
//! # Cascades
//!
//! ```text
//! delete Issue n      → every position n.m (recursively)
//! delete Position n.m → its arguments, and every Issue sourced from n.m
//!                       (source nulled, then deleted recursively)
//! confirm x           → x, its parent, …, through `source` links to the root
//! ```

mod apply;
pub mod error;
pub mod issue_graph;
pub mod types;

pub use error::{GraphError, GraphResult};
pub use issue_graph::{filter_deleted, IssueGraph, REJECTED_NODE_ID};
pub use types::{Argument, Issue, NodeId, NodeKind, NodeState, Position, Relation};
