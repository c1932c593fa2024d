//! The issue map arena and its cascading mutations.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{GraphError, GraphResult};
use super::types::{Issue, NodeId, NodeKind, NodeState, Position, Relation};

/// Id returned by [`IssueGraph::add_node`] when the node type is not
/// recognized. Callers relay it as a rejected operation.
pub const REJECTED_NODE_ID: &str = "0";

/// Separator used by [`IssueGraph::ancestry_chain`].
const CHAIN_SEPARATOR: &str = " -> ";

/// Arena of issues indexed by ordinal.
///
/// Issue `n` lives at `issues[n - 1]`, position `n.m` at
/// `issues[n - 1].positions[m - 1]`. Nothing is ever physically removed, so
/// the index arithmetic stays valid for the life of the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueGraph {
    issues: Vec<Issue>,
}

impl IssueGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hydrate from a stored tree, checking that every id matches its slot
    /// and that every `source` points backwards at an existing position.
    pub fn from_issues(issues: Vec<Issue>) -> GraphResult<Self> {
        for (idx, issue) in issues.iter().enumerate() {
            let ordinal = idx as u32 + 1;
            if issue.full_id != ordinal.to_string() {
                return Err(GraphError::CorruptedSnapshot(format!(
                    "issue at slot {} has id {}",
                    ordinal, issue.full_id
                )));
            }
            for (pidx, position) in issue.positions.iter().enumerate() {
                let expected = NodeId::Position(ordinal, pidx as u32 + 1).to_string();
                if position.full_id != expected {
                    return Err(GraphError::CorruptedSnapshot(format!(
                        "position at slot {} has id {}",
                        expected, position.full_id
                    )));
                }
                for argument in position.pros.iter().chain(position.cons.iter()) {
                    match argument.full_id.parse::<NodeId>() {
                        Ok(NodeId::Argument(i, p, _)) if i == ordinal && p == pidx as u32 + 1 => {}
                        _ => {
                            return Err(GraphError::CorruptedSnapshot(format!(
                                "argument {} does not belong to {}",
                                argument.full_id, expected
                            )))
                        }
                    }
                }
            }
            if let Some(source) = &issue.source {
                let valid = match source.target_id.parse::<NodeId>() {
                    Ok(NodeId::Position(i, p)) => {
                        i < ordinal && issues[i as usize - 1].positions.len() >= p as usize
                    }
                    _ => false,
                };
                if !valid {
                    return Err(GraphError::CorruptedSnapshot(format!(
                        "issue {} has dangling source {}",
                        ordinal, source.target_id
                    )));
                }
            }
        }
        Ok(Self { issues })
    }

    /// All issues, deleted ones included.
    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn into_issues(self) -> Vec<Issue> {
        self.issues
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Seed the root issue from the session topic.
    ///
    /// Only an empty graph is seeded; a hydrated graph keeps its root.
    pub fn set_first_issue(&mut self, topic: &str) -> String {
        if self.issues.is_empty() {
            self.issues
                .push(Issue::new("1".to_string(), topic, NodeState::Unconfirmed));
        }
        "1".to_string()
    }

    // ── Lookup ──────────────────────────────────────────────────────────

    pub fn issue(&self, ordinal: u32) -> Option<&Issue> {
        ordinal
            .checked_sub(1)
            .and_then(|idx| self.issues.get(idx as usize))
    }

    fn issue_mut(&mut self, ordinal: u32) -> Option<&mut Issue> {
        ordinal
            .checked_sub(1)
            .and_then(move |idx| self.issues.get_mut(idx as usize))
    }

    pub fn position(&self, issue: u32, position: u32) -> Option<&Position> {
        self.issue(issue)?
            .positions
            .get(position.checked_sub(1)? as usize)
    }

    fn position_mut(&mut self, issue: u32, position: u32) -> Option<&mut Position> {
        let idx = position.checked_sub(1)? as usize;
        self.issue_mut(issue)?.positions.get_mut(idx)
    }

    fn state(&self, id: NodeId) -> Option<NodeState> {
        match id {
            NodeId::Issue(i) => self.issue(i).map(|n| n.state),
            NodeId::Position(i, p) => self.position(i, p).map(|n| n.state),
            NodeId::Argument(i, p, _) => {
                let full_id = id.to_string();
                self.position(i, p)?
                    .pros
                    .iter()
                    .chain(self.position(i, p)?.cons.iter())
                    .find(|a| a.full_id == full_id)
                    .map(|a| a.state)
            }
        }
    }

    /// Lifecycle state of a node by its dotted id.
    pub fn state_of(&self, full_id: &str) -> GraphResult<NodeState> {
        let id = full_id.parse::<NodeId>()?;
        self.state(id)
            .ok_or_else(|| GraphError::NotFound(full_id.to_string()))
    }

    /// Parse and check the node exists and is not deleted.
    fn resolve_live(&self, full_id: &str) -> GraphResult<NodeId> {
        let id = full_id.parse::<NodeId>()?;
        match self.state(id) {
            None => Err(GraphError::NotFound(full_id.to_string())),
            Some(NodeState::Deleted) => Err(GraphError::DeletedNode(full_id.to_string())),
            Some(_) => Ok(id),
        }
    }

    fn expect_kind(id: NodeId, expected: NodeKind) -> GraphResult<()> {
        if id.kind() == expected {
            Ok(())
        } else {
            Err(GraphError::WrongKind {
                id: id.to_string(),
                expected,
                actual: id.kind(),
            })
        }
    }

    /// Resolve an existing issue (deleted or not) and return its ordinal.
    pub(crate) fn expect_issue(&self, issue_id: &str) -> GraphResult<u32> {
        let id = issue_id.parse::<NodeId>()?;
        Self::expect_kind(id, NodeKind::Issue)?;
        if self.issue(id.ordinal()).is_none() {
            return Err(GraphError::NotFound(issue_id.to_string()));
        }
        Ok(id.ordinal())
    }

    /// Live issues whose `source` points at `position_id`.
    pub fn sub_issues_of(&self, position_id: &str) -> Vec<&Issue> {
        self.issues
            .iter()
            .filter(|issue| !issue.state.is_deleted())
            .filter(|issue| {
                issue
                    .source
                    .as_ref()
                    .is_some_and(|s| s.target_id == position_id)
            })
            .collect()
    }

    // ── Human commands ──────────────────────────────────────────────────

    /// Append a confirmed node under `parent_id` and return its id.
    ///
    /// `node_type` is `ISSUE` (parent is a position) or `POSITION` (parent is
    /// an issue). Any other type yields [`REJECTED_NODE_ID`].
    pub fn add_node(
        &mut self,
        node_type: &str,
        parent_id: &str,
        content: &str,
    ) -> GraphResult<String> {
        let kind = match node_type.trim().to_ascii_uppercase().as_str() {
            "ISSUE" => NodeKind::Issue,
            "POSITION" => NodeKind::Position,
            _ => return Ok(REJECTED_NODE_ID.to_string()),
        };
        let parent = self.resolve_live(parent_id)?;

        let new_id = match kind {
            NodeKind::Issue => {
                Self::expect_kind(parent, NodeKind::Position)?;
                let target_content = self
                    .position(parent.issue(), parent.ordinal())
                    .map(|p| p.content.clone())
                    .unwrap_or_default();
                let ordinal = self.issues.len() as u32 + 1;
                let mut issue = Issue::new(ordinal.to_string(), content, NodeState::Confirmed);
                issue.source = Some(Relation {
                    target_id: parent.to_string(),
                    target_type: NodeKind::Position,
                    target_content,
                    content: String::new(),
                });
                self.issues.push(issue);
                NodeId::Issue(ordinal)
            }
            _ => {
                Self::expect_kind(parent, NodeKind::Issue)?;
                let issue_ordinal = parent.ordinal();
                let issue = self
                    .issue_mut(issue_ordinal)
                    .ok_or_else(|| GraphError::NotFound(parent_id.to_string()))?;
                let ordinal = issue.positions.len() as u32 + 1;
                let id = NodeId::Position(issue_ordinal, ordinal);
                issue
                    .positions
                    .push(Position::new(id.to_string(), content, NodeState::Confirmed));
                id
            }
        };

        self.confirm_chain(new_id);
        debug!(node = %new_id, parent = parent_id, "Node added");
        Ok(new_id.to_string())
    }

    /// Replace a node's content on behalf of a human and confirm its chain.
    pub fn modify_node(&mut self, full_id: &str, new_content: &str) -> GraphResult<String> {
        let id = self.resolve_live(full_id)?;
        self.set_content(id, new_content);
        self.confirm_chain(id);
        Ok(id.to_string())
    }

    /// Replace content without touching lifecycle state.
    ///
    /// A changed position loses its `generated_issue_flag`, and every issue
    /// split out of it gets the new text in its relation snapshot.
    pub(crate) fn set_content(&mut self, id: NodeId, new_content: &str) {
        match id {
            NodeId::Issue(i) => {
                if let Some(issue) = self.issue_mut(i) {
                    issue.content = new_content.to_string();
                }
            }
            NodeId::Position(i, p) => {
                if let Some(position) = self.position_mut(i, p) {
                    if position.content != new_content {
                        position.generated_issue_flag = false;
                    }
                    position.content = new_content.to_string();
                }
                let full_id = id.to_string();
                for issue in &mut self.issues {
                    if let Some(source) = issue.source.as_mut() {
                        if source.target_id == full_id {
                            source.target_content = new_content.to_string();
                        }
                    }
                }
            }
            NodeId::Argument(i, p, _) => {
                let full_id = id.to_string();
                if let Some(argument) = self
                    .position_mut(i, p)
                    .and_then(|pos| pos.argument_mut(&full_id))
                {
                    argument.content = new_content.to_string();
                }
            }
        }
    }

    /// Soft-delete a node and everything hanging off it. Idempotent.
    pub fn delete_node(&mut self, full_id: &str) -> GraphResult<String> {
        let id = full_id.parse::<NodeId>()?;
        if self.state(id).is_none() {
            return Err(GraphError::NotFound(full_id.to_string()));
        }
        match id {
            NodeId::Issue(i) => self.delete_issue(i),
            NodeId::Position(i, p) => self.delete_position(i, p),
            NodeId::Argument(i, p, _) => {
                if let Some(argument) = self
                    .position_mut(i, p)
                    .and_then(|pos| pos.argument_mut(full_id.trim()))
                {
                    argument.state = NodeState::Deleted;
                }
            }
        }
        debug!(node = %id, "Node deleted");
        Ok(id.to_string())
    }

    fn delete_issue(&mut self, ordinal: u32) {
        let Some(issue) = self.issue_mut(ordinal) else {
            return;
        };
        issue.state = NodeState::Deleted;
        let count = issue.positions.len() as u32;
        for position in 1..=count {
            self.delete_position(ordinal, position);
        }
    }

    fn delete_position(&mut self, issue: u32, ordinal: u32) {
        let Some(position) = self.position_mut(issue, ordinal) else {
            return;
        };
        position.state = NodeState::Deleted;
        for argument in position.pros.iter_mut().chain(position.cons.iter_mut()) {
            argument.state = NodeState::Deleted;
        }

        let full_id = NodeId::Position(issue, ordinal).to_string();
        let derived: Vec<u32> = self
            .issues
            .iter()
            .enumerate()
            .filter(|(_, i)| i.source.as_ref().is_some_and(|s| s.target_id == full_id))
            .map(|(idx, _)| idx as u32 + 1)
            .collect();
        for derived_issue in derived {
            if let Some(i) = self.issue_mut(derived_issue) {
                i.source = None;
            }
            self.delete_issue(derived_issue);
        }
    }

    /// Confirm a node and its whole ancestor chain up to the root.
    pub fn confirm_node_fathers(&mut self, full_id: &str) -> GraphResult<()> {
        let id = full_id.parse::<NodeId>()?;
        if self.state(id).is_none() {
            return Err(GraphError::NotFound(full_id.to_string()));
        }
        self.confirm_chain(id);
        Ok(())
    }

    fn confirm_chain(&mut self, start: NodeId) {
        fn promote(state: &mut NodeState) {
            if *state != NodeState::Deleted {
                *state = NodeState::Confirmed;
            }
        }

        let mut cursor = Some(start);
        while let Some(id) = cursor {
            cursor = match id {
                NodeId::Argument(i, p, _) => {
                    let full_id = id.to_string();
                    if let Some(argument) = self
                        .position_mut(i, p)
                        .and_then(|pos| pos.argument_mut(&full_id))
                    {
                        promote(&mut argument.state);
                    }
                    id.parent()
                }
                NodeId::Position(i, p) => {
                    if let Some(position) = self.position_mut(i, p) {
                        promote(&mut position.state);
                    }
                    id.parent()
                }
                NodeId::Issue(i) => match self.issue_mut(i) {
                    Some(issue) => {
                        promote(&mut issue.state);
                        // Sources always point at an older issue, so the walk ends.
                        match issue.source.as_ref().map(|s| s.target_id.parse::<NodeId>()) {
                            Some(Ok(target @ NodeId::Position(pi, _))) if pi < i => Some(target),
                            _ => None,
                        }
                    }
                    None => None,
                },
            };
        }
    }

    // ── Renderings for the model ────────────────────────────────────────

    /// Render the live positions of an issue with their modifiability, and
    /// return the matching objects for later comparison.
    pub fn get_positions_under_issue(&self, issue_id: &str) -> GraphResult<(String, Vec<Position>)> {
        let ordinal = self.expect_issue(issue_id)?;
        let issue = self
            .issue(ordinal)
            .ok_or_else(|| GraphError::NotFound(issue_id.to_string()))?;

        let mut lines = Vec::new();
        let mut live = Vec::new();
        for position in issue.positions.iter().filter(|p| !p.state.is_deleted()) {
            let mut line = format!("{} position: {}", position.full_id, position.content);
            if position.state == NodeState::Confirmed {
                line.push_str("\n- unmodifiable");
            } else {
                line.push_str("\n- modifiable");
            }
            if let Some(note) = position.note.as_deref().filter(|n| !n.is_empty()) {
                line.push_str("\n// ");
                line.push_str(note);
            }
            lines.push(line);
            live.push(position.clone());
        }
        Ok((lines.join("\n"), live))
    }

    /// Render positions no issue has been derived from yet.
    pub fn get_ungenerated_positions(&self, issue_id: &str) -> GraphResult<String> {
        let ordinal = self.expect_issue(issue_id)?;
        let issue = self
            .issue(ordinal)
            .ok_or_else(|| GraphError::NotFound(issue_id.to_string()))?;

        let mut rendered = String::new();
        for position in &issue.positions {
            if position.state.is_deleted()
                || position.generated_issue_flag
                || !self.sub_issues_of(&position.full_id).is_empty()
            {
                continue;
            }
            rendered.push_str(&format!(
                "{} position: {}\n",
                position.full_id, position.content
            ));
        }
        Ok(rendered)
    }

    /// Root-to-leaf chain of issue and position contents leading to an issue.
    pub fn ancestry_chain(&self, issue_id: &str) -> GraphResult<String> {
        let ordinal = self.expect_issue(issue_id)?;
        let mut current = ordinal;
        let issue = self
            .issue(current)
            .ok_or_else(|| GraphError::NotFound(issue_id.to_string()))?;

        let mut chain = vec![issue.content.clone()];
        let mut source = issue.source.as_ref();
        while let Some(relation) = source {
            let Ok(NodeId::Position(pi, pp)) = relation.target_id.parse::<NodeId>() else {
                break;
            };
            if pi >= current {
                break;
            }
            let Some(father) = self.issue(pi) else { break };
            if father.state.is_deleted() {
                break;
            }
            let Some(position) = self.position(pi, pp) else { break };
            chain.push(position.content.clone());
            chain.push(father.content.clone());
            source = father.source.as_ref();
            current = pi;
        }
        chain.reverse();
        Ok(chain.join(CHAIN_SEPARATOR))
    }

    // ── Observer views ──────────────────────────────────────────────────

    /// Deep copy with every deleted issue, position and argument removed.
    pub fn snapshot_without_deleted(&self) -> Vec<Issue> {
        filter_deleted(&self.issues)
    }

    /// Plain-text view of the live map.
    pub fn render_map(&self) -> String {
        let mut out = Vec::new();
        for issue in self.snapshot_without_deleted() {
            out.push(format!("{} issue: {}", issue.full_id, issue.content));
            for position in &issue.positions {
                out.push(format!("- position {}: {}", position.full_id, position.content));
            }
            match &issue.source {
                Some(source) => {
                    out.push("- from:".to_string());
                    out.push(format!(
                        "  - {} {}: {} <- {}",
                        source.target_id, source.target_type, source.target_content, source.content
                    ));
                }
                None => out.push("- from: None".to_string()),
            }
            out.push(String::new());
        }
        out.join("\n")
    }

    pub(crate) fn push_issue(&mut self, issue: Issue) {
        self.issues.push(issue);
    }

    pub(crate) fn positions_mut(&mut self, issue: u32) -> Option<&mut Vec<Position>> {
        self.issue_mut(issue).map(|i| &mut i.positions)
    }

    pub(crate) fn mark_issue_generated(&mut self, issue: u32, position: u32) {
        if let Some(p) = self.position_mut(issue, position) {
            p.generated_issue_flag = true;
        }
    }
}

/// Remove deleted nodes from a tree. Applying it twice changes nothing.
pub fn filter_deleted(issues: &[Issue]) -> Vec<Issue> {
    issues
        .iter()
        .filter(|issue| !issue.state.is_deleted())
        .map(|issue| {
            let mut issue = issue.clone();
            issue.positions.retain(|p| !p.state.is_deleted());
            for position in &mut issue.positions {
                position.pros.retain(|a| !a.state.is_deleted());
                position.cons.retain(|a| !a.state.is_deleted());
            }
            issue
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> IssueGraph {
        let mut graph = IssueGraph::new();
        graph.set_first_issue("Topic");
        graph
    }

    #[test]
    fn test_first_issue_is_unconfirmed_root() {
        let graph = seeded();
        assert_eq!(graph.issues().len(), 1);
        assert_eq!(graph.issues()[0].full_id, "1");
        assert_eq!(graph.issues()[0].state, NodeState::Unconfirmed);
        assert!(graph.issues()[0].source.is_none());
    }

    #[test]
    fn test_set_first_issue_keeps_existing_root() {
        let mut graph = seeded();
        graph.set_first_issue("Other");
        assert_eq!(graph.issues().len(), 1);
        assert_eq!(graph.issues()[0].content, "Topic");
    }

    #[test]
    fn test_add_position_confirms_root() {
        let mut graph = seeded();
        let id = graph.add_node("POSITION", "1", "Use Rust").unwrap();
        assert_eq!(id, "1.1");
        assert_eq!(graph.state_of("1.1").unwrap(), NodeState::Confirmed);
        assert_eq!(graph.state_of("1").unwrap(), NodeState::Confirmed);
    }

    #[test]
    fn test_add_issue_records_relation_snapshot() {
        let mut graph = seeded();
        graph.add_node("position", "1", "Use Rust").unwrap();
        let id = graph.add_node("issue", "1.1", "Which runtime?").unwrap();
        assert_eq!(id, "2");
        let source = graph.issues()[1].source.clone().unwrap();
        assert_eq!(source.target_id, "1.1");
        assert_eq!(source.target_type, NodeKind::Position);
        assert_eq!(source.target_content, "Use Rust");
    }

    #[test]
    fn test_add_unknown_type_is_rejected() {
        let mut graph = seeded();
        assert_eq!(graph.add_node("ARGUMENT", "1", "x").unwrap(), REJECTED_NODE_ID);
        assert_eq!(graph.add_node("", "1", "x").unwrap(), REJECTED_NODE_ID);
    }

    #[test]
    fn test_add_under_wrong_parent_kind_fails() {
        let mut graph = seeded();
        let err = graph.add_node("ISSUE", "1", "x").unwrap_err();
        assert!(matches!(err, GraphError::WrongKind { .. }));
        let err = graph.add_node("POSITION", "9", "x").unwrap_err();
        assert_eq!(err, GraphError::NotFound("9".into()));
    }

    #[test]
    fn test_add_under_deleted_parent_fails() {
        let mut graph = seeded();
        graph.add_node("POSITION", "1", "a").unwrap();
        graph.delete_node("1.1").unwrap();
        let err = graph.add_node("ISSUE", "1.1", "x").unwrap_err();
        assert_eq!(err, GraphError::DeletedNode("1.1".into()));
    }

    #[test]
    fn test_ids_never_reused_after_delete() {
        let mut graph = seeded();
        graph.add_node("POSITION", "1", "a").unwrap();
        graph.add_node("POSITION", "1", "b").unwrap();
        graph.delete_node("1.2").unwrap();
        let id = graph.add_node("POSITION", "1", "c").unwrap();
        assert_eq!(id, "1.3");
    }

    #[test]
    fn test_modify_position_clears_flag_and_updates_snapshots() {
        let mut graph = seeded();
        graph.add_node("POSITION", "1", "old").unwrap();
        graph.add_node("ISSUE", "1.1", "child").unwrap();
        graph.mark_issue_generated(1, 1);

        graph.modify_node("1.1", "new").unwrap();
        let position = graph.position(1, 1).unwrap();
        assert_eq!(position.content, "new");
        assert!(!position.generated_issue_flag);
        assert_eq!(
            graph.issues()[1].source.as_ref().unwrap().target_content,
            "new"
        );
    }

    #[test]
    fn test_modify_same_content_keeps_flag() {
        let mut graph = seeded();
        graph.add_node("POSITION", "1", "same").unwrap();
        graph.mark_issue_generated(1, 1);
        graph.modify_node("1.1", "same").unwrap();
        assert!(graph.position(1, 1).unwrap().generated_issue_flag);
    }

    #[test]
    fn test_modify_deleted_node_fails() {
        let mut graph = seeded();
        graph.add_node("POSITION", "1", "a").unwrap();
        graph.delete_node("1.1").unwrap();
        assert_eq!(
            graph.modify_node("1.1", "b").unwrap_err(),
            GraphError::DeletedNode("1.1".into())
        );
    }

    #[test]
    fn test_delete_position_cascades_into_derived_issues() {
        let mut graph = seeded();
        graph.add_node("POSITION", "1", "a").unwrap();
        graph.add_node("ISSUE", "1.1", "derived").unwrap();
        graph.add_node("POSITION", "2", "b").unwrap();
        graph.add_node("ISSUE", "2.1", "grandchild").unwrap();

        graph.delete_node("1.1").unwrap();

        assert_eq!(graph.state_of("1.1").unwrap(), NodeState::Deleted);
        assert_eq!(graph.state_of("2").unwrap(), NodeState::Deleted);
        assert!(graph.issues()[1].source.is_none());
        assert_eq!(graph.state_of("2.1").unwrap(), NodeState::Deleted);
        assert_eq!(graph.state_of("3").unwrap(), NodeState::Deleted);
        assert_eq!(graph.state_of("1").unwrap(), NodeState::Confirmed);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let mut graph = seeded();
        graph.add_node("POSITION", "1", "a").unwrap();
        graph.delete_node("1").unwrap();
        let once = graph.clone();
        graph.delete_node("1").unwrap();
        assert_eq!(graph, once);
    }

    #[test]
    fn test_confirm_walks_through_sources_to_root() {
        let mut graph = seeded();
        graph.add_node("POSITION", "1", "a").unwrap();
        graph.add_node("ISSUE", "1.1", "child").unwrap();
        // Reset the chain to unconfirmed to observe the cascade.
        for issue in &mut graph.issues {
            issue.state = NodeState::Unconfirmed;
            for p in &mut issue.positions {
                p.state = NodeState::Unconfirmed;
            }
        }
        graph
            .positions_mut(2)
            .unwrap()
            .push(Position::new("2.1".into(), "leaf", NodeState::Unconfirmed));

        graph.confirm_node_fathers("2.1").unwrap();
        for id in ["2.1", "2", "1.1", "1"] {
            assert_eq!(graph.state_of(id).unwrap(), NodeState::Confirmed, "{}", id);
        }
    }

    #[test]
    fn test_confirm_never_resurrects_deleted() {
        let mut graph = seeded();
        graph.add_node("POSITION", "1", "a").unwrap();
        graph.delete_node("1.1").unwrap();
        graph.confirm_node_fathers("1.1").unwrap();
        assert_eq!(graph.state_of("1.1").unwrap(), NodeState::Deleted);
    }

    #[test]
    fn test_positions_rendering() {
        let mut graph = seeded();
        graph.add_node("POSITION", "1", "confirmed one").unwrap();
        let mut p = Position::new("1.2".into(), "proposed", NodeState::Unconfirmed);
        p.note = Some("needs data".into());
        graph.positions_mut(1).unwrap().push(p);
        graph
            .positions_mut(1)
            .unwrap()
            .push(Position::new("1.3".into(), "gone", NodeState::Deleted));

        let (text, live) = graph.get_positions_under_issue("1").unwrap();
        assert_eq!(
            text,
            "1.1 position: confirmed one\n- unmodifiable\n1.2 position: proposed\n- modifiable\n// needs data"
        );
        assert_eq!(live.len(), 2);
    }

    #[test]
    fn test_ungenerated_positions_skip_flagged_and_split() {
        let mut graph = seeded();
        graph.add_node("POSITION", "1", "a").unwrap();
        graph.add_node("POSITION", "1", "b").unwrap();
        graph.add_node("POSITION", "1", "c").unwrap();
        graph.add_node("ISSUE", "1.1", "split").unwrap();
        graph.mark_issue_generated(1, 2);

        let text = graph.get_ungenerated_positions("1").unwrap();
        assert_eq!(text, "1.3 position: c\n");
    }

    #[test]
    fn test_ancestry_chain_root_to_leaf() {
        let mut graph = seeded();
        graph.add_node("POSITION", "1", "P1").unwrap();
        graph.add_node("ISSUE", "1.1", "Sub").unwrap();
        assert_eq!(graph.ancestry_chain("2").unwrap(), "Topic -> P1 -> Sub");
        assert_eq!(graph.ancestry_chain("1").unwrap(), "Topic");
    }

    #[test]
    fn test_snapshot_without_deleted_is_idempotent() {
        let mut graph = seeded();
        graph.add_node("POSITION", "1", "a").unwrap();
        graph.add_node("POSITION", "1", "b").unwrap();
        graph.add_node("ISSUE", "1.2", "x").unwrap();
        graph.delete_node("1.1").unwrap();

        let once = graph.snapshot_without_deleted();
        let twice = filter_deleted(&once);
        assert_eq!(once, twice);
        assert_eq!(once[0].positions.len(), 1);
        assert_eq!(once.len(), 2);
    }

    #[test]
    fn test_from_issues_rejects_misaligned_ids() {
        let issues = vec![Issue::new("2".into(), "x", NodeState::Confirmed)];
        assert!(matches!(
            IssueGraph::from_issues(issues),
            Err(GraphError::CorruptedSnapshot(_))
        ));
    }

    #[test]
    fn test_from_issues_accepts_own_output() {
        let mut graph = seeded();
        graph.add_node("POSITION", "1", "a").unwrap();
        graph.add_node("ISSUE", "1.1", "x").unwrap();
        graph.delete_node("2").unwrap();
        let restored = IssueGraph::from_issues(graph.issues().to_vec()).unwrap();
        assert_eq!(restored, graph);
    }
}
