//! Reconciling model proposals against the live graph.
//!
//! Generated positions are validated as a whole before anything is written,
//! so a rejected batch leaves the graph exactly as it was.

use tracing::{debug, warn};

use super::error::{GraphError, GraphResult};
use super::issue_graph::IssueGraph;
use super::types::{Issue, NodeId, NodeKind, NodeState, Position, Relation};
use crate::parser::{IssueCandidate, PositionCandidate};

/// Content the model writes when it has nothing to say about a position.
const EMPTY_MARKER: &str = "None";

#[derive(Debug)]
enum PositionStep<'a> {
    Overwrite { position: u32, content: &'a str },
    Append { content: &'a str, note: Option<&'a str> },
}

impl IssueGraph {
    /// Merge generated positions into `issue_id`.
    ///
    /// Returns the ids of positions that were created or rewritten; those
    /// are the ones that still need issue derivation.
    pub fn apply_generated_positions(
        &mut self,
        candidates: &[PositionCandidate],
        issue_id: &str,
    ) -> GraphResult<Vec<String>> {
        let issue_ordinal = self.expect_issue(issue_id)?;
        let steps = self.plan_positions(candidates, issue_ordinal)?;

        let mut touched = Vec::with_capacity(steps.len());
        for step in steps {
            match step {
                PositionStep::Overwrite { position, content } => {
                    let id = NodeId::Position(issue_ordinal, position);
                    self.set_content(id, content);
                    touched.push(id.to_string());
                }
                PositionStep::Append { content, note } => {
                    let positions = self
                        .positions_mut(issue_ordinal)
                        .ok_or_else(|| GraphError::NotFound(issue_id.to_string()))?;
                    let id = NodeId::Position(issue_ordinal, positions.len() as u32 + 1);
                    let mut position =
                        Position::new(id.to_string(), content, NodeState::Unconfirmed);
                    position.note = note.map(str::to_string);
                    positions.push(position);
                    touched.push(id.to_string());
                }
            }
        }
        debug!(issue = issue_id, touched = touched.len(), "Generated positions applied");
        Ok(touched)
    }

    fn plan_positions<'a>(
        &self,
        candidates: &'a [PositionCandidate],
        issue_ordinal: u32,
    ) -> GraphResult<Vec<PositionStep<'a>>> {
        let issue = self
            .issue(issue_ordinal)
            .ok_or_else(|| GraphError::NotFound(issue_ordinal.to_string()))?;
        let max_live = issue.max_live_position_ordinal();

        let mut steps = Vec::new();
        for candidate in candidates {
            let id = candidate.full_id.parse::<NodeId>()?;
            let NodeId::Position(ci, cp) = id else {
                return Err(GraphError::WrongKind {
                    id: candidate.full_id.clone(),
                    expected: NodeKind::Position,
                    actual: id.kind(),
                });
            };

            let existing = (ci == issue_ordinal)
                .then(|| issue.positions.get(cp as usize - 1))
                .flatten();
            match existing {
                Some(position) => match position.state {
                    NodeState::Deleted => {
                        return Err(GraphError::DeletedTarget(candidate.full_id.clone()))
                    }
                    NodeState::Confirmed => continue,
                    NodeState::Unconfirmed => {
                        if position.content != candidate.content
                            && candidate.content != EMPTY_MARKER
                        {
                            steps.push(PositionStep::Overwrite {
                                position: cp,
                                content: &candidate.content,
                            });
                        }
                    }
                },
                None => {
                    if let Some(max) = max_live {
                        if ci != issue_ordinal || cp <= max {
                            return Err(GraphError::OutOfOrderId {
                                candidate: candidate.full_id.clone(),
                                current_max: NodeId::Position(issue_ordinal, max).to_string(),
                            });
                        }
                    }
                    steps.push(PositionStep::Append {
                        content: &candidate.content,
                        note: candidate.note.as_deref(),
                    });
                }
            }
        }
        Ok(steps)
    }

    /// Create issues split out of positions of `issue_id`.
    ///
    /// Candidates pointing at deleted, unknown, or out-of-scope positions are
    /// skipped. Returns the ids of the created issues.
    pub fn apply_generated_issues(
        &mut self,
        candidates: &[IssueCandidate],
        issue_id: &str,
    ) -> GraphResult<Vec<String>> {
        let issue_ordinal = self.expect_issue(issue_id)?;
        let mut created = Vec::new();

        for candidate in candidates {
            let (pi, pp) = match candidate.position_id.parse::<NodeId>() {
                Ok(NodeId::Position(pi, pp)) if pi == issue_ordinal => (pi, pp),
                _ => {
                    warn!(
                        position = %candidate.position_id,
                        issue = issue_id,
                        "Generated issue targets a position outside the focus issue"
                    );
                    continue;
                }
            };
            let Some(position) = self.position(pi, pp) else {
                warn!(position = %candidate.position_id, "Generated issue targets unknown position");
                continue;
            };
            if position.state.is_deleted() || candidate.sub_issues.is_empty() {
                continue;
            }

            let relation = Relation {
                target_id: position.full_id.clone(),
                target_type: NodeKind::Position,
                target_content: position.content.clone(),
                content: String::new(),
            };
            for sub_issue in &candidate.sub_issues {
                let ordinal = self.issues().len() as u32 + 1;
                let mut issue =
                    Issue::new(ordinal.to_string(), sub_issue.as_str(), NodeState::Unconfirmed);
                issue.source = Some(relation.clone());
                self.push_issue(issue);
                created.push(ordinal.to_string());
            }
            self.mark_issue_generated(pi, pp);
        }
        debug!(issue = issue_id, created = created.len(), "Generated issues applied");
        Ok(created)
    }
}
