//! Node types for the issue map.
//!
//! Nodes are addressed by dotted hierarchical ids (`"3"`, `"3.2"`, `"3.2.1"`).
//! The id shape decides the node kind; [`NodeId`] is the parsed form.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::GraphError;

/// Lifecycle of a node. `Deleted` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Proposed by the model, may still be rewritten by later cycles.
    #[default]
    Unconfirmed,
    /// Touched or accepted by a human; the model must not rewrite it.
    Confirmed,
    /// Soft-deleted; retained so ids stay resolvable.
    Deleted,
}

impl NodeState {
    pub fn is_deleted(self) -> bool {
        self == Self::Deleted
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unconfirmed => write!(f, "unconfirmed"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// Kind of node, decided purely by the shape of its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Issue,
    Position,
    Argument,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Issue => write!(f, "issue"),
            Self::Position => write!(f, "position"),
            Self::Argument => write!(f, "argument"),
        }
    }
}

/// Parsed hierarchical node address. All ordinals are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeId {
    Issue(u32),
    Position(u32, u32),
    Argument(u32, u32, u32),
}

impl NodeId {
    pub fn kind(self) -> NodeKind {
        match self {
            Self::Issue(_) => NodeKind::Issue,
            Self::Position(..) => NodeKind::Position,
            Self::Argument(..) => NodeKind::Argument,
        }
    }

    /// The id of the structural parent, if any.
    ///
    /// Issues have no structural parent; their `source` relation is a
    /// separate, by-value link.
    pub fn parent(self) -> Option<NodeId> {
        match self {
            Self::Issue(_) => None,
            Self::Position(i, _) => Some(Self::Issue(i)),
            Self::Argument(i, p, _) => Some(Self::Position(i, p)),
        }
    }

    /// The last ordinal of the id.
    pub fn ordinal(self) -> u32 {
        match self {
            Self::Issue(i) => i,
            Self::Position(_, p) => p,
            Self::Argument(_, _, a) => a,
        }
    }

    /// The issue ordinal this node lives under (or is).
    pub fn issue(self) -> u32 {
        match self {
            Self::Issue(i) | Self::Position(i, _) | Self::Argument(i, _, _) => i,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Issue(i) => write!(f, "{}", i),
            Self::Position(i, p) => write!(f, "{}.{}", i, p),
            Self::Argument(i, p, a) => write!(f, "{}.{}.{}", i, p, a),
        }
    }
}

impl FromStr for NodeId {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || GraphError::InvalidNodeId(s.to_string());
        let parts = s
            .trim()
            .split('.')
            .map(|seg| match seg.parse::<u32>() {
                Ok(0) | Err(_) => None,
                Ok(n) => Some(n),
            })
            .collect::<Option<Vec<u32>>>()
            .ok_or_else(invalid)?;

        match parts.as_slice() {
            [i] => Ok(Self::Issue(*i)),
            [i, p] => Ok(Self::Position(*i, *p)),
            [i, p, a] => Ok(Self::Argument(*i, *p, *a)),
            _ => Err(invalid()),
        }
    }
}

/// Snapshot of the Position an Issue was split out from.
///
/// Never re-resolved live; `target_content` only changes when the target
/// Position is modified through the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub target_id: String,
    pub target_type: NodeKind,
    pub target_content: String,
    /// Free-text rationale for the split.
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argument {
    pub full_id: String,
    pub content: String,
    #[serde(rename = "type", default)]
    pub state: NodeState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub full_id: String,
    pub content: String,
    #[serde(rename = "type", default)]
    pub state: NodeState,
    #[serde(default)]
    pub pros: Vec<Argument>,
    #[serde(default)]
    pub cons: Vec<Argument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Whether an Issue has already been derived from the current content.
    #[serde(rename = "generated_issue", default)]
    pub generated_issue_flag: bool,
}

impl Position {
    pub fn new(full_id: String, content: impl Into<String>, state: NodeState) -> Self {
        Self {
            full_id,
            content: content.into(),
            state,
            pros: Vec::new(),
            cons: Vec::new(),
            note: None,
            generated_issue_flag: false,
        }
    }

    pub(crate) fn argument_mut(&mut self, full_id: &str) -> Option<&mut Argument> {
        self.pros
            .iter_mut()
            .chain(self.cons.iter_mut())
            .find(|a| a.full_id == full_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub full_id: String,
    pub content: String,
    #[serde(rename = "type", default)]
    pub state: NodeState,
    #[serde(default)]
    pub positions: Vec<Position>,
    #[serde(default)]
    pub source: Option<Relation>,
}

impl Issue {
    pub fn new(full_id: String, content: impl Into<String>, state: NodeState) -> Self {
        Self {
            full_id,
            content: content.into(),
            state,
            positions: Vec::new(),
            source: None,
        }
    }

    /// Highest ordinal among non-deleted positions, if any.
    pub fn max_live_position_ordinal(&self) -> Option<u32> {
        self.positions
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.state.is_deleted())
            .map(|(idx, _)| idx as u32 + 1)
            .max()
    }
}
