//! Generation cycle tests against a scripted model.
//!
//! Tests verify:
//! - Human edits made while a model call is in flight win; the output is dropped
//! - Moving or editing the focus mid-call interrupts the cycle
//! - An edit during the issue-phase call keeps the issue watermark in place
//! - A cycle with nothing new since the watermark never calls the model
//! - A timed-out attempt is retried and leaves its own artifact

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use deliberation::events::{CycleOutcome, EventBus, InterruptReason, MeetingNotifier};
use deliberation::graph::{IssueGraph, NodeState};
use deliberation::transcript::AsrSentence;
use deliberation::MeetingLanguage;
use meeting_agents::{AgentConfig, GenerationOrchestrator, ModelClient, ModelError, Phase, PromptVars};
use tokio::sync::Notify;

/// Replays canned answers; optionally holds calls until released.
#[derive(Default)]
struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<Phase>>,
    gated: AtomicBool,
    gate_issues: AtomicBool,
    stall_first: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl ScriptedModel {
    fn with_replies(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            ..Self::default()
        }
    }

    fn gated(self) -> Self {
        self.gated.store(true, Ordering::SeqCst);
        self
    }

    /// Hold only issue-phase calls.
    fn gated_on_issues(self) -> Self {
        self.gate_issues.store(true, Ordering::SeqCst);
        self
    }

    fn stalling_first(self) -> Self {
        self.stall_first.store(true, Ordering::SeqCst);
        self
    }

    fn calls(&self) -> Vec<Phase> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn generate(
        &self,
        phase: Phase,
        _vars: &PromptVars,
        _timeout: Duration,
    ) -> Result<String, ModelError> {
        self.calls.lock().unwrap().push(phase);
        if self.stall_first.swap(false, Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let held = self.gated.load(Ordering::SeqCst)
            || (phase == Phase::Issues && self.gate_issues.load(Ordering::SeqCst));
        if held {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(ModelError::EmptyResponse)
    }
}

fn orchestrator(dir: &Path, model: Arc<ScriptedModel>) -> Arc<GenerationOrchestrator> {
    let config = AgentConfig {
        data_root: dir.to_path_buf(),
        retry_delay_ms: 10,
        english_threshold: 3,
        ..AgentConfig::default()
    };
    let mut graph = IssueGraph::new();
    graph.set_first_issue("Where do we hold the offsite?");
    GenerationOrchestrator::new(
        "m-cycle",
        graph,
        MeetingLanguage::English,
        Arc::new(config),
        model,
        Arc::new(MeetingNotifier::new("m-cycle", EventBus::new().shared())),
    )
    .shared()
}

fn said(speaker: &str, content: &str, start: i64) -> AsrSentence {
    AsrSentence {
        content: content.into(),
        time_range: (start, start + 800),
        speaker_id: speaker.into(),
    }
}

// ── Conflicts ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_focus_deleted_mid_call_discards_output() {
    let dir = tempfile::tempdir().unwrap();
    let model = Arc::new(ScriptedModel::with_replies(&["2.1 position: Book early"]).gated());
    let orch = orchestrator(dir.path(), model.clone());

    orch.add_node("POSITION", "1", "By the lake").await.unwrap();
    let focus = orch.add_node("ISSUE", "1.1", "Which lake?").await.unwrap();
    assert_eq!(focus, "2");
    orch.select_focus(&focus).await.unwrap();
    orch.ingest(&[said("a", "the northern lake is closer", 0)]).await;

    let cycle = tokio::spawn({
        let orch = orch.clone();
        async move { orch.run_cycle("2").await }
    });
    model.entered.notified().await;
    orch.delete_node("2").await.unwrap();
    model.release.notify_one();

    assert_eq!(
        cycle.await.unwrap(),
        CycleOutcome::Interrupted {
            reason: InterruptReason::FocusDeleted
        }
    );
    let graph = orch.graph().await;
    let issue = graph.issue(2).unwrap();
    assert_eq!(issue.state, NodeState::Deleted);
    assert!(issue.positions.is_empty());

    let state = orch.state().await;
    assert_eq!(state.focus, None);
    assert_eq!(state.position_watermark, 0);
    assert!(!state.generating);
}

#[tokio::test]
async fn test_position_edit_mid_call_wins() {
    let dir = tempfile::tempdir().unwrap();
    let model = Arc::new(
        ScriptedModel::with_replies(&["1.1 position: Lake\n1.2 position: Beach"]).gated(),
    );
    let orch = orchestrator(dir.path(), model.clone());

    orch.add_node("POSITION", "1", "Lake").await.unwrap();
    orch.select_focus("1").await.unwrap();
    orch.ingest(&[said("a", "or maybe the beach instead", 0)]).await;
    let before = orch.graph().await;

    let cycle = tokio::spawn({
        let orch = orch.clone();
        async move { orch.run_cycle("1").await }
    });
    model.entered.notified().await;
    orch.modify_node("1.1", "Mountain lake").await.unwrap();
    model.release.notify_one();

    assert_eq!(
        cycle.await.unwrap(),
        CycleOutcome::Interrupted {
            reason: InterruptReason::PositionsChanged
        }
    );
    let graph = orch.graph().await;
    assert_eq!(graph.position(1, 1).unwrap().content, "Mountain lake");
    assert!(graph.position(1, 2).is_none());
    assert_eq!(graph.issues().len(), before.issues().len());
    assert_eq!(orch.state().await.position_watermark, 0);
}

#[tokio::test]
async fn test_focus_edit_mid_call_interrupts() {
    let dir = tempfile::tempdir().unwrap();
    let model = Arc::new(ScriptedModel::with_replies(&["1.1 position: Lake"]).gated());
    let orch = orchestrator(dir.path(), model.clone());

    orch.select_focus("1").await.unwrap();
    orch.ingest(&[said("a", "how about the lake", 0)]).await;

    let cycle = tokio::spawn({
        let orch = orch.clone();
        async move { orch.run_cycle("1").await }
    });
    model.entered.notified().await;
    orch.modify_node("1", "Where and when is the offsite?")
        .await
        .unwrap();
    model.release.notify_one();

    assert_eq!(
        cycle.await.unwrap(),
        CycleOutcome::Interrupted {
            reason: InterruptReason::FocusEdited
        }
    );
    let graph = orch.graph().await;
    assert_eq!(graph.issue(1).unwrap().content, "Where and when is the offsite?");
    assert!(graph.issue(1).unwrap().positions.is_empty());
    let state = orch.state().await;
    assert_eq!(state.focus.as_deref(), Some("1"));
    assert_eq!(state.position_watermark, 0);
}

#[tokio::test]
async fn test_focus_moved_mid_call_interrupts() {
    let dir = tempfile::tempdir().unwrap();
    let model = Arc::new(ScriptedModel::with_replies(&["1.2 position: Beach"]).gated());
    let orch = orchestrator(dir.path(), model.clone());

    orch.add_node("POSITION", "1", "Lake").await.unwrap();
    let other = orch.add_node("ISSUE", "1.1", "Which lake?").await.unwrap();
    orch.select_focus("1").await.unwrap();
    orch.ingest(&[said("a", "or the beach", 0)]).await;

    let cycle = tokio::spawn({
        let orch = orch.clone();
        async move { orch.run_cycle("1").await }
    });
    model.entered.notified().await;
    orch.select_focus(&other).await.unwrap();
    model.release.notify_one();

    assert_eq!(
        cycle.await.unwrap(),
        CycleOutcome::Interrupted {
            reason: InterruptReason::FocusChanged
        }
    );
    let graph = orch.graph().await;
    assert_eq!(graph.issue(1).unwrap().positions.len(), 1);
    assert!(graph.position(1, 2).is_none());
    assert_eq!(orch.state().await.focus.as_deref(), Some(other.as_str()));
}

#[tokio::test]
async fn test_position_edit_during_issue_call_keeps_issue_watermark() {
    let dir = tempfile::tempdir().unwrap();
    let model = Arc::new(
        ScriptedModel::with_replies(&[
            "<position_and_note>1.1 position: Lake</position_and_note>",
            "<sub_issue_list>\n1.1 position: Lake\n- 1 sub_issue: Which lake?\n</sub_issue_list>",
        ])
        .gated_on_issues(),
    );
    let orch = orchestrator(dir.path(), model.clone());
    orch.select_focus("1").await.unwrap();
    orch.ingest(&[said("a", "the lake would be nice", 0)]).await;

    let cycle = tokio::spawn({
        let orch = orch.clone();
        async move { orch.run_cycle("1").await }
    });
    model.entered.notified().await;
    orch.modify_node("1.1", "Mountain lake").await.unwrap();
    model.release.notify_one();

    assert_eq!(
        cycle.await.unwrap(),
        CycleOutcome::Interrupted {
            reason: InterruptReason::PositionsChanged
        }
    );
    assert_eq!(model.calls(), vec![Phase::Positions, Phase::Issues]);

    let graph = orch.graph().await;
    assert_eq!(graph.issues().len(), 1);
    assert_eq!(graph.position(1, 1).unwrap().content, "Mountain lake");
    let state = orch.state().await;
    assert_eq!(state.position_watermark, 1);
    assert_eq!(state.issue_watermark, 0);
}

// ── Watermarks ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_second_cycle_without_new_dialog_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let model = Arc::new(ScriptedModel::with_replies(&[
        "<position_and_note>1.1 position: Lake</position_and_note>",
        "<sub_issue_list>None</sub_issue_list>",
    ]));
    let orch = orchestrator(dir.path(), model.clone());
    orch.select_focus("1").await.unwrap();
    orch.ingest(&[said("a", "the lake would be nice", 0)]).await;

    assert_eq!(
        orch.run_cycle("1").await,
        CycleOutcome::Completed {
            positions_touched: 1,
            issues_created: 0
        }
    );
    let state = orch.state().await;
    assert_eq!(state.position_watermark, 1);
    assert_eq!(state.issue_watermark, 1);

    assert!(matches!(
        orch.run_cycle("1").await,
        CycleOutcome::Skipped { .. }
    ));
    assert_eq!(model.calls(), vec![Phase::Positions, Phase::Issues]);

    let graph = orch.graph().await;
    assert_eq!(graph.issue(1).unwrap().positions.len(), 1);
    assert_eq!(graph.issues().len(), 1);
}

// ── Retry ────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_timed_out_attempt_is_retried() {
    let dir = tempfile::tempdir().unwrap();
    let model = Arc::new(
        ScriptedModel::with_replies(&["1.1 position: Lake", "None"]).stalling_first(),
    );
    let orch = orchestrator(dir.path(), model.clone());
    orch.select_focus("1").await.unwrap();
    orch.ingest(&[said("a", "let us pick the lake", 0)]).await;

    assert_eq!(
        orch.run_cycle("1").await,
        CycleOutcome::Completed {
            positions_touched: 1,
            issues_created: 0
        }
    );
    assert_eq!(
        model.calls(),
        vec![Phase::Positions, Phase::Positions, Phase::Issues]
    );

    let attempts = dir.path().join("m-cycle/online/text_to_position");
    let first: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(attempts.join("t2p_0_result.json")).unwrap(),
    )
    .unwrap();
    assert!(first["error"].as_str().unwrap().contains("timed out"));
    assert!(attempts.join("t2p_0_result_retry_2.json").exists());
}
