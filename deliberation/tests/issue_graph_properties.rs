//! Issue map property tests: id stability, cascades and reconciliation
//! across varied edit sequences.
//!
//! Tests verify:
//! - Ids are unique and never reused after deletion
//! - Deleting a position transitively deletes issues sourced from it
//! - Confirming any node confirms the chain up to the root
//! - Generated positions never land on deleted or stale ids
//! - Filtering deleted nodes is idempotent

use std::collections::HashSet;

use deliberation::graph::{GraphError, IssueGraph, NodeState};
use deliberation::parser::{parse_positions, PositionCandidate};

/// Build a map with `issues` child issues hanging off positions of the
/// root, each carrying `positions` positions.
fn build_map(issues: usize, positions: usize) -> IssueGraph {
    let mut graph = IssueGraph::new();
    graph.set_first_issue("Root topic");
    for p in 0..positions {
        graph
            .add_node("POSITION", "1", &format!("root position {}", p))
            .unwrap();
    }
    for i in 0..issues {
        let parent = format!("1.{}", (i % positions) + 1);
        let issue_id = graph
            .add_node("ISSUE", &parent, &format!("sub issue {}", i))
            .unwrap();
        for p in 0..positions {
            graph
                .add_node("POSITION", &issue_id, &format!("answer {} to {}", p, i))
                .unwrap();
        }
    }
    graph
}

fn all_ids(graph: &IssueGraph) -> Vec<String> {
    let mut ids = Vec::new();
    for issue in graph.issues() {
        ids.push(issue.full_id.clone());
        for position in &issue.positions {
            ids.push(position.full_id.clone());
        }
    }
    ids
}

// ── Property: ids are unique and never reused ───────────────────────

#[test]
fn prop_ids_unique_and_never_reused() {
    for (issues, positions) in [(1, 1), (3, 2), (6, 3)] {
        let mut graph = build_map(issues, positions);
        let before: Vec<String> = all_ids(&graph);
        assert_eq!(before.len(), before.iter().collect::<HashSet<_>>().len());

        graph.delete_node("1.1").unwrap();
        let added_position = graph.add_node("POSITION", "1", "late idea").unwrap();
        assert!(!before.contains(&added_position), "{} reused", added_position);

        let added_issue = graph.add_node("ISSUE", &added_position, "late issue").unwrap();
        assert!(!before.contains(&added_issue), "{} reused", added_issue);
    }
}

// ── Property: delete is transitive through sources ──────────────────

#[test]
fn prop_delete_transitively_reaches_sourced_issues() {
    let mut graph = IssueGraph::new();
    graph.set_first_issue("Root");
    graph.add_node("POSITION", "1", "a").unwrap();
    let child = graph.add_node("ISSUE", "1.1", "child").unwrap();
    let child_position = graph.add_node("POSITION", &child, "b").unwrap();
    let grandchild = graph.add_node("ISSUE", &child_position, "grandchild").unwrap();
    graph.add_node("POSITION", &grandchild, "c").unwrap();

    graph.delete_node("1.1").unwrap();

    for id in ["1.1", "2", "2.1", "3", "3.1"] {
        assert_eq!(graph.state_of(id).unwrap(), NodeState::Deleted, "{}", id);
    }
    assert_eq!(graph.state_of("1").unwrap(), NodeState::Confirmed);
    assert!(graph.issue(2).unwrap().source.is_none());
    assert_eq!(graph.snapshot_without_deleted().len(), 1);

    // Idempotent
    let once = graph.clone();
    graph.delete_node("1.1").unwrap();
    assert_eq!(graph, once);
}

// ── Property: confirm reaches the root ──────────────────────────────

#[test]
fn prop_confirm_reaches_root() {
    let mut graph = IssueGraph::new();
    graph.set_first_issue("Root");
    graph
        .apply_generated_positions(&parse_positions("1.1 position: generated"), "1")
        .unwrap();
    assert_eq!(graph.state_of("1").unwrap(), NodeState::Unconfirmed);
    assert_eq!(graph.state_of("1.1").unwrap(), NodeState::Unconfirmed);

    let created = graph
        .apply_generated_issues(
            &deliberation::parser::parse_issues("1.1 position: generated\n- 1 why?"),
            "1",
        )
        .unwrap();
    assert_eq!(created, vec!["2"]);
    graph
        .apply_generated_positions(&parse_positions("2.1 position: because"), "2")
        .unwrap();

    graph.confirm_node_fathers("2.1").unwrap();
    for id in ["2.1", "2", "1.1", "1"] {
        assert_eq!(graph.state_of(id).unwrap(), NodeState::Confirmed, "{}", id);
    }
}

// ── Property: generated positions respect deletion and ordering ─────

#[test]
fn prop_generated_positions_reject_deleted_and_stale_ids() {
    let mut graph = build_map(0, 3);
    graph.delete_node("1.3").unwrap();
    let before = graph.clone();

    let deleted = graph.apply_generated_positions(
        &[PositionCandidate {
            full_id: "1.3".into(),
            content: "resurrect".into(),
            note: None,
        }],
        "1",
    );
    assert_eq!(deleted, Err(GraphError::DeletedTarget("1.3".into())));

    let foreign = graph.apply_generated_positions(
        &[
            PositionCandidate {
                full_id: "1.1".into(),
                content: "ignored, confirmed".into(),
                note: None,
            },
            PositionCandidate {
                full_id: "2.5".into(),
                content: "wrong scope".into(),
                note: None,
            },
        ],
        "1",
    );
    assert!(matches!(foreign, Err(GraphError::OutOfOrderId { .. })));
    assert_eq!(graph, before);

    // A fresh id above the live maximum is appended after the deleted slot.
    let touched = graph
        .apply_generated_positions(
            &[PositionCandidate {
                full_id: "1.7".into(),
                content: "x".into(),
                note: None,
            }],
            "1",
        )
        .unwrap();
    assert_eq!(touched, vec!["1.4"]);
}

#[test]
fn prop_single_position_window_keeps_unconfirmed_overwrite() {
    let mut graph = IssueGraph::new();
    graph.set_first_issue("Root");
    graph
        .apply_generated_positions(&parse_positions("1.1 position: draft one"), "1")
        .unwrap();

    let touched = graph
        .apply_generated_positions(&parse_positions("1.1 position: draft two\n1.2 position: new"), "1")
        .unwrap();
    assert_eq!(touched, vec!["1.1", "1.2"]);
    assert_eq!(graph.position(1, 1).unwrap().content, "draft two");
    assert_eq!(graph.position(1, 2).unwrap().state, NodeState::Unconfirmed);
}

// ── Property: filtering deleted nodes is idempotent ─────────────────

#[test]
fn prop_snapshot_without_deleted_idempotent() {
    for (issues, positions) in [(2, 2), (5, 3)] {
        let mut graph = build_map(issues, positions);
        graph.delete_node("1.2").unwrap();
        graph.delete_node("2.1").unwrap();

        let once = graph.snapshot_without_deleted();
        let twice = deliberation::filter_deleted(&once);
        assert_eq!(once, twice);
        assert!(once
            .iter()
            .all(|i| i.state != NodeState::Deleted
                && i.positions.iter().all(|p| p.state != NodeState::Deleted)));
    }
}
