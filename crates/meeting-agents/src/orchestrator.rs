//! Generation orchestrator: keeps one meeting's issue map in step with the
//! transcript while humans edit the same map.
//!
//! ## Cycle
//!
//! ```text
//! lock ─ snapshot focus, positions, window ─ unlock
//!          │
//!          ▼
//!     model call (≤ attempts, fixed delay, per-call timeout)
//!          │
//! lock ─ conflict check ─┬─ edited  → discard, watermarks untouched
//!                        └─ clean   → apply positions, advance watermark,
//!                                     publish + persist
//! unlock
//!          │ same again for the issue phase
//!          ▼
//!     reset backlog, clear generating flag
//! ```
//!
//! Human commands take the same lock but never wait for a model call, so an
//! edit made mid-call wins and the in-flight output is dropped.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use deliberation::events::{CycleOutcome, InterruptReason, SharedNotifySink};
use deliberation::graph::{GraphError, Issue, IssueGraph, NodeId, NodeState, Position};
use deliberation::parser::{extract_tagged, is_no_issue_output, parse_issues, parse_positions};
use deliberation::persistence::{PersistenceError, SnapshotStore};
use deliberation::transcript::{AsrSentence, Consumer, TranscriptSession};
use deliberation::MeetingLanguage;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::artifacts::ArtifactWriter;
use crate::config::AgentConfig;
use crate::model::{ModelClient, ModelError, Phase, PromptVars};
use crate::prompts::position_number_limitation;

const POSITION_TAG: &str = "position_and_note";
const ISSUE_TAG: &str = "sub_issue_list";

/// Error type for rejected human commands
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("{0} is not a selectable issue")]
    NotSelectable(String),
}

/// Result type for human commands
pub type CommandResult<T> = Result<T, CommandError>;

/// Per-session generation state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrchestratorState {
    /// Selected issue id, e.g. `"3"`.
    pub focus: Option<String>,
    /// Transcript index the position window starts at.
    pub position_watermark: usize,
    /// Transcript index the issue window starts at.
    pub issue_watermark: usize,
    pub manual_trigger: bool,
    pub generating: bool,
    /// Rendered prior dialog handed to the model.
    pub context: String,
    /// Completed position phases; numbers artifacts.
    pub position_cycles: u32,
    /// Completed issue phases; numbers artifacts.
    pub issue_cycles: u32,
}

struct Workspace {
    graph: IssueGraph,
    transcript: TranscriptSession,
    state: OrchestratorState,
}

/// What the position phase saw before calling the model.
struct PositionSnapshot {
    focus: String,
    focus_content: String,
    rendered: String,
    positions: Vec<Position>,
    last_index: usize,
    cycle: u32,
    vars: PromptVars,
}

/// What the issue phase saw before calling the model.
struct IssueSnapshot {
    focus: String,
    focus_content: String,
    pending: String,
    last_index: usize,
    cycle: u32,
    vars: PromptVars,
}

/// Shared reference to an orchestrator
pub type SharedOrchestrator = Arc<GenerationOrchestrator>;

pub struct GenerationOrchestrator {
    meeting_id: String,
    config: Arc<AgentConfig>,
    model: Arc<dyn ModelClient>,
    notify: SharedNotifySink,
    store: SnapshotStore,
    artifacts: ArtifactWriter,
    workspace: Mutex<Workspace>,
}

impl GenerationOrchestrator {
    pub fn new(
        meeting_id: impl Into<String>,
        graph: IssueGraph,
        language: MeetingLanguage,
        config: Arc<AgentConfig>,
        model: Arc<dyn ModelClient>,
        notify: SharedNotifySink,
    ) -> Self {
        let meeting_id = meeting_id.into();
        let meeting_dir = config.meeting_dir(&meeting_id);
        Self {
            store: SnapshotStore::new(&meeting_dir),
            artifacts: ArtifactWriter::new(&meeting_dir),
            meeting_id,
            config,
            model,
            notify,
            workspace: Mutex::new(Workspace {
                graph,
                transcript: TranscriptSession::new(language),
                state: OrchestratorState::default(),
            }),
        }
    }

    pub fn shared(self) -> SharedOrchestrator {
        Arc::new(self)
    }

    pub fn meeting_id(&self) -> &str {
        &self.meeting_id
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    // ── Observers ───────────────────────────────────────────────────────

    pub async fn snapshot(&self) -> Vec<Issue> {
        self.workspace.lock().await.graph.snapshot_without_deleted()
    }

    pub async fn graph(&self) -> IssueGraph {
        self.workspace.lock().await.graph.clone()
    }

    pub async fn state(&self) -> OrchestratorState {
        self.workspace.lock().await.state.clone()
    }

    pub async fn transcript_len(&self) -> usize {
        self.workspace.lock().await.transcript.len()
    }

    pub async fn set_speaker_name(&self, speaker_id: &str, name: &str) {
        self.workspace
            .lock()
            .await
            .transcript
            .set_speaker_name(speaker_id, name);
    }

    // ── Commands ────────────────────────────────────────────────────────

    /// Append a delivered transcript batch.
    pub async fn ingest(&self, batch: &[AsrSentence]) {
        if batch.is_empty() {
            return;
        }
        let mut ws = self.workspace.lock().await;
        ws.transcript.ingest(batch);
        debug!(meeting = %self.meeting_id, sentences = batch.len(), total = ws.transcript.len(), "Transcript ingested");
    }

    /// Select the issue generation works on. `"none"` or `"-1"` clears it.
    pub async fn select_focus(&self, issue_id: &str) -> CommandResult<Vec<Issue>> {
        let mut ws = self.workspace.lock().await;
        let issue_id = issue_id.trim();

        if issue_id.eq_ignore_ascii_case("none") || issue_id == "-1" {
            if ws.state.focus.take().is_some() {
                info!(meeting = %self.meeting_id, "Focus cleared");
            }
            return Ok(self.publish_locked(&ws));
        }

        match issue_id.parse::<NodeId>() {
            Ok(NodeId::Issue(_)) => {}
            Ok(_) => return Err(CommandError::NotSelectable(issue_id.to_string())),
            Err(e) => return Err(e.into()),
        }
        if ws.graph.state_of(issue_id)? == NodeState::Deleted {
            return Err(CommandError::NotSelectable(issue_id.to_string()));
        }
        if ws.state.focus.as_deref() == Some(issue_id) {
            return Ok(ws.graph.snapshot_without_deleted());
        }

        let len = ws.transcript.len();
        ws.state.focus = Some(issue_id.to_string());
        ws.state.position_watermark = len;
        ws.state.issue_watermark = len;
        ws.transcript.reset_pending(Consumer::IssueMap);
        ws.graph.confirm_node_fathers(issue_id)?;
        self.refresh_context(&mut ws);
        info!(meeting = %self.meeting_id, focus = issue_id, watermark = len, "Focus selected");

        self.persist_locked(&ws);
        Ok(self.publish_locked(&ws))
    }

    pub async fn add_node(
        &self,
        node_type: &str,
        parent_id: &str,
        content: &str,
    ) -> CommandResult<String> {
        let mut ws = self.workspace.lock().await;
        let id = ws.graph.add_node(node_type, parent_id, content)?;
        if id == deliberation::REJECTED_NODE_ID {
            warn!(meeting = %self.meeting_id, node_type, "Unrecognized node type");
            return Ok(id);
        }
        info!(meeting = %self.meeting_id, node = %id, parent = parent_id, "Node added");
        self.persist_locked(&ws);
        self.publish_locked(&ws);
        Ok(id)
    }

    pub async fn modify_node(&self, full_id: &str, content: &str) -> CommandResult<String> {
        let mut ws = self.workspace.lock().await;
        let id = ws.graph.modify_node(full_id, content)?;
        info!(meeting = %self.meeting_id, node = %id, "Node modified");
        self.persist_locked(&ws);
        self.publish_locked(&ws);
        Ok(id)
    }

    /// Delete a node. A focus that ends up deleted is cleared.
    pub async fn delete_node(&self, full_id: &str) -> CommandResult<String> {
        let mut ws = self.workspace.lock().await;
        let id = ws.graph.delete_node(full_id)?;

        let focus_deleted = ws
            .state
            .focus
            .as_deref()
            .map(|f| ws.graph.state_of(f) == Ok(NodeState::Deleted))
            .unwrap_or(false);
        if focus_deleted {
            info!(meeting = %self.meeting_id, focus = ?ws.state.focus, "Focus deleted, clearing");
            ws.state.focus = None;
        }
        ws.transcript.reset_pending(Consumer::IssueMap);
        info!(meeting = %self.meeting_id, node = %id, "Node deleted");

        self.persist_locked(&ws);
        self.publish_locked(&ws);
        Ok(id)
    }

    /// Run a cycle on the next poll regardless of backlog.
    pub async fn trigger_manual_generation(&self) -> Vec<Issue> {
        let mut ws = self.workspace.lock().await;
        ws.state.manual_trigger = true;
        info!(meeting = %self.meeting_id, focus = ?ws.state.focus, "Manual generation requested");
        ws.graph.snapshot_without_deleted()
    }

    // ── Generation loop ─────────────────────────────────────────────────

    /// Poll until cancelled, running a cycle whenever one is due.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(meeting = %self.meeting_id, "Generation loop started");
        loop {
            if cancel.is_cancelled() {
                break;
            }
            match self.poll().await {
                Some(focus) => {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            warn!(meeting = %self.meeting_id, focus = %focus, "Cycle abandoned at shutdown");
                            break;
                        }
                        _ = self.run_cycle(&focus) => {}
                    }
                }
                None => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.config.idle_interval()) => {}
                    }
                }
            }
        }
        info!(meeting = %self.meeting_id, "Generation loop stopped");
    }

    /// Account for new sentences and decide whether a cycle is due.
    ///
    /// Returns the focus to run on, with the generating flag already set.
    pub async fn poll(&self) -> Option<String> {
        let mut ws = self.workspace.lock().await;
        ws.transcript.drain_unseen();

        let threshold = self.config.threshold_for(ws.transcript.language());
        if ws.transcript.pending(Consumer::Context) > threshold {
            self.refresh_context(&mut ws);
        }

        let focus = ws.state.focus.clone()?;
        let due = ws.transcript.pending(Consumer::IssueMap) > threshold || ws.state.manual_trigger;
        if !due {
            return None;
        }
        ws.state.manual_trigger = false;
        ws.state.generating = true;
        self.notify.publish_status(true);
        Some(focus)
    }

    /// One cycle on `focus`. Always ends with the backlog reset and the
    /// generating flag cleared.
    pub async fn run_cycle(&self, focus: &str) -> CycleOutcome {
        let outcome = self.cycle_phases(focus).await;
        match &outcome {
            CycleOutcome::Completed { positions_touched, issues_created } => {
                info!(meeting = %self.meeting_id, focus, positions_touched, issues_created, "Cycle completed")
            }
            CycleOutcome::Interrupted { reason } => {
                warn!(meeting = %self.meeting_id, focus, %reason, "Cycle interrupted, output discarded")
            }
            CycleOutcome::Skipped { reason } => {
                debug!(meeting = %self.meeting_id, focus, reason = %reason, "Cycle skipped")
            }
            CycleOutcome::Failed { error } => {
                warn!(meeting = %self.meeting_id, focus, error = %error, "Cycle failed")
            }
        }

        let mut ws = self.workspace.lock().await;
        ws.transcript.reset_pending(Consumer::IssueMap);
        ws.state.generating = false;
        self.notify.publish_status(false);
        self.notify
            .publish_cycle(Some(focus.to_string()), outcome.clone());
        outcome
    }

    async fn cycle_phases(&self, focus: &str) -> CycleOutcome {
        let snapshot = {
            let ws = self.workspace.lock().await;
            match self.position_snapshot(&ws, focus) {
                Ok(Some(snapshot)) => snapshot,
                Ok(None) => {
                    return CycleOutcome::Skipped {
                        reason: "no new transcript since the last cycle".to_string(),
                    }
                }
                Err(e) => return CycleOutcome::Failed { error: e.to_string() },
            }
        };

        let raw = match self
            .call_with_retry(Phase::Positions, snapshot.cycle, &snapshot.vars)
            .await
        {
            Ok(raw) => raw,
            Err(e) => return CycleOutcome::Failed { error: e.to_string() },
        };

        let positions_touched;
        let issue_snapshot = {
            let mut ws = self.workspace.lock().await;
            if let Some(reason) = Self::position_conflict(&ws, &snapshot) {
                return CycleOutcome::Interrupted { reason };
            }

            let candidates = parse_positions(tagged_or_raw(&raw, POSITION_TAG));
            debug!(meeting = %self.meeting_id, candidates = candidates.len(), "Positions parsed");
            match ws.graph.apply_generated_positions(&candidates, focus) {
                Ok(touched) => positions_touched = touched.len(),
                Err(e) => {
                    return CycleOutcome::Failed {
                        error: format!("generated positions rejected: {}", e),
                    }
                }
            }
            ws.state.position_watermark = snapshot.last_index;
            ws.state.position_cycles += 1;
            self.persist_locked(&ws);
            self.publish_locked(&ws);

            match self.issue_snapshot(&ws, focus, snapshot.last_index) {
                Ok(Some(next)) => next,
                Ok(None) => {
                    return CycleOutcome::Completed {
                        positions_touched,
                        issues_created: 0,
                    }
                }
                Err(e) => return CycleOutcome::Failed { error: e.to_string() },
            }
        };

        let raw = match self
            .call_with_retry(Phase::Issues, issue_snapshot.cycle, &issue_snapshot.vars)
            .await
        {
            Ok(raw) => raw,
            Err(e) => return CycleOutcome::Failed { error: e.to_string() },
        };

        let mut ws = self.workspace.lock().await;
        if let Some(reason) = Self::issue_conflict(&ws, &issue_snapshot) {
            return CycleOutcome::Interrupted { reason };
        }

        let output = tagged_or_raw(&raw, ISSUE_TAG);
        let mut issues_created = 0;
        if is_no_issue_output(output, self.config.min_issue_output_len) {
            debug!(meeting = %self.meeting_id, "No new issues proposed");
        } else {
            let candidates = parse_issues(output);
            match ws.graph.apply_generated_issues(&candidates, focus) {
                Ok(created) => issues_created = created.len(),
                Err(e) => {
                    return CycleOutcome::Failed {
                        error: format!("generated issues rejected: {}", e),
                    }
                }
            }
        }
        ws.state.issue_watermark = issue_snapshot.last_index;
        ws.state.issue_cycles += 1;
        self.persist_locked(&ws);
        self.publish_locked(&ws);

        CycleOutcome::Completed {
            positions_touched,
            issues_created,
        }
    }

    fn position_snapshot(
        &self,
        ws: &Workspace,
        focus: &str,
    ) -> Result<Option<PositionSnapshot>, GraphError> {
        let last_index = ws.transcript.len();
        if ws.state.position_watermark >= last_index {
            return Ok(None);
        }
        let (rendered, positions) = ws.graph.get_positions_under_issue(focus)?;
        let focus_content = focused_issue(&ws.graph, focus)?.content.clone();

        let mut vars = self.base_vars(ws, focus)?;
        vars.insert("current_positions".into(), rendered.clone());
        vars.insert(
            "dialog".into(),
            ws.transcript
                .render_dialog(ws.state.position_watermark..last_index),
        );
        vars.insert(
            "position_number_limitation".into(),
            position_number_limitation(positions.len()).to_string(),
        );

        Ok(Some(PositionSnapshot {
            focus: focus.to_string(),
            focus_content,
            rendered,
            positions,
            last_index,
            cycle: ws.state.position_cycles,
            vars,
        }))
    }

    fn issue_snapshot(
        &self,
        ws: &Workspace,
        focus: &str,
        last_index: usize,
    ) -> Result<Option<IssueSnapshot>, GraphError> {
        if ws.state.issue_watermark >= last_index {
            return Ok(None);
        }
        let pending = ws.graph.get_ungenerated_positions(focus)?;
        if pending.is_empty() {
            return Ok(None);
        }
        let focus_content = focused_issue(&ws.graph, focus)?.content.clone();

        let mut vars = self.base_vars(ws, focus)?;
        vars.insert("positions_list".into(), pending.clone());
        vars.insert(
            "dialog".into(),
            ws.transcript.render_dialog(ws.state.issue_watermark..last_index),
        );

        Ok(Some(IssueSnapshot {
            focus: focus.to_string(),
            focus_content,
            pending,
            last_index,
            cycle: ws.state.issue_cycles,
            vars,
        }))
    }

    fn base_vars(&self, ws: &Workspace, focus: &str) -> Result<PromptVars, GraphError> {
        let mut vars = PromptVars::new();
        vars.insert("issue_chain".into(), ws.graph.ancestry_chain(focus)?);
        vars.insert("context".into(), ws.state.context.clone());
        vars.insert(
            "meeting_language".into(),
            ws.transcript.language().to_string(),
        );
        Ok(vars)
    }

    /// Focus-level edits made while the model was busy.
    fn focus_conflict(ws: &Workspace, focus: &str, focus_content: &str) -> Option<InterruptReason> {
        // Deleting the focus also clears it; report the deletion.
        let issue = match focused_issue(&ws.graph, focus) {
            Ok(issue) if issue.state != NodeState::Deleted => issue,
            _ => return Some(InterruptReason::FocusDeleted),
        };
        if ws.state.focus.as_deref() != Some(focus) {
            Some(InterruptReason::FocusChanged)
        } else if issue.content != focus_content {
            Some(InterruptReason::FocusEdited)
        } else {
            None
        }
    }

    fn position_conflict(ws: &Workspace, snapshot: &PositionSnapshot) -> Option<InterruptReason> {
        Self::focus_conflict(ws, &snapshot.focus, &snapshot.focus_content).or_else(|| {
            match ws.graph.get_positions_under_issue(&snapshot.focus) {
                Ok((rendered, positions))
                    if rendered == snapshot.rendered && positions == snapshot.positions =>
                {
                    None
                }
                _ => Some(InterruptReason::PositionsChanged),
            }
        })
    }

    fn issue_conflict(ws: &Workspace, snapshot: &IssueSnapshot) -> Option<InterruptReason> {
        Self::focus_conflict(ws, &snapshot.focus, &snapshot.focus_content).or_else(|| {
            match ws.graph.get_ungenerated_positions(&snapshot.focus) {
                Ok(pending) if pending == snapshot.pending => None,
                _ => Some(InterruptReason::PositionsChanged),
            }
        })
    }

    /// Bounded retry; every attempt leaves an artifact.
    async fn call_with_retry(
        &self,
        phase: Phase,
        cycle: u32,
        vars: &PromptVars,
    ) -> Result<String, ModelError> {
        let attempts = self.config.attempts.max(1);
        let timeout = self.config.call_timeout();
        let mut last_error = ModelError::EmptyResponse;

        for attempt in 1..=attempts {
            let started_at = Utc::now();
            let result = match tokio::time::timeout(timeout, self.model.generate(phase, vars, timeout)).await {
                Ok(result) => result,
                Err(_) => Err(ModelError::Timeout(timeout.as_millis() as u64)),
            };

            if let Err(e) = self.artifacts.record(
                &self.meeting_id,
                phase,
                cycle,
                attempt,
                vars,
                &result,
                started_at,
            ) {
                warn!(meeting = %self.meeting_id, %phase, "Failed to write attempt artifact: {:#}", e);
            }

            match result {
                Ok(raw) => return Ok(raw),
                Err(e) => {
                    let retriable = e.is_transient() && attempt < attempts;
                    if retriable {
                        warn!(
                            meeting = %self.meeting_id,
                            %phase,
                            attempt,
                            attempts,
                            delay_ms = self.config.retry_delay_ms,
                            "Model call failed, retrying: {}",
                            e
                        );
                        tokio::time::sleep(self.config.retry_delay()).await;
                    }
                    last_error = e;
                    if !retriable {
                        break;
                    }
                }
            }
        }
        Err(last_error)
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    fn refresh_context(&self, ws: &mut Workspace) {
        ws.state.context = ws
            .transcript
            .context_tail(ws.state.position_watermark, self.config.context_sentences);
        ws.transcript.reset_pending(Consumer::Context);
    }

    fn publish_locked(&self, ws: &MutexGuard<'_, Workspace>) -> Vec<Issue> {
        let snapshot = ws.graph.snapshot_without_deleted();
        self.notify
            .publish_graph_snapshot(snapshot.clone(), ws.state.focus.clone());
        snapshot
    }

    fn persist_locked(&self, ws: &MutexGuard<'_, Workspace>) {
        if let Err(e) = self.store.save(&ws.graph) {
            warn!(meeting = %self.meeting_id, "Failed to persist issue map: {}", e);
        }
    }

    /// Write a snapshot now, outside any cycle.
    pub async fn persist_snapshot(&self) -> Result<PathBuf, PersistenceError> {
        let ws = self.workspace.lock().await;
        self.store.save(&ws.graph)
    }
}

fn focused_issue<'a>(graph: &'a IssueGraph, focus: &str) -> Result<&'a Issue, GraphError> {
    match focus.parse::<NodeId>()? {
        NodeId::Issue(ordinal) => graph
            .issue(ordinal)
            .ok_or_else(|| GraphError::NotFound(focus.to_string())),
        _ => Err(GraphError::NotFound(focus.to_string())),
    }
}

/// Tagged section of a model answer, or the whole answer when untagged.
fn tagged_or_raw<'a>(raw: &'a str, tag: &str) -> &'a str {
    let tagged = extract_tagged(raw, tag);
    if tagged.trim().is_empty() && !raw.contains(&format!("<{}>", tag)) {
        raw
    } else {
        tagged
    }
}
