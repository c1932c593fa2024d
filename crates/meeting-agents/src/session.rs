//! One live meeting: a recognizer multiplexer, a generation orchestrator and
//! the loop that moves finalized sentences between them.
//!
//! ```text
//!  AsrSessionMultiplexer ── trigger ──▶ delivery loop ── step() ──▶ TranscriptBatch
//!                                            │
//!                                            ▼
//!                              GenerationOrchestrator::ingest
//!                                            │
//!                         generation loop ◀──┘
//! ```
//!
//! Ending a session cancels both loops, closes recognizer connections within
//! the grace period, delivers what they flushed, then persists the final map
//! and the full transcript.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use deliberation::asr::{AsrConnector, AsrSessionMultiplexer, SharedAsrMultiplexer};
use deliberation::events::{MeetingNotifier, SharedEventBus, SharedNotifySink};
use deliberation::graph::IssueGraph;
use deliberation::MeetingLanguage;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::model::ModelClient;
use crate::orchestrator::{GenerationOrchestrator, SharedOrchestrator};

struct SessionTasks {
    generation: JoinHandle<()>,
    delivery: JoinHandle<()>,
}

/// What a session left behind when it ended.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub meeting_id: String,
    pub sentences: usize,
    pub live_issues: usize,
    pub snapshot_path: PathBuf,
    pub transcript_path: PathBuf,
}

/// Shared reference to a running session
pub type SharedMeetingSession = Arc<MeetingSession>;

pub struct MeetingSession {
    meeting_id: String,
    topic: String,
    config: Arc<AgentConfig>,
    multiplexer: SharedAsrMultiplexer,
    orchestrator: SharedOrchestrator,
    notify: SharedNotifySink,
    cancel: CancellationToken,
    tasks: Mutex<Option<SessionTasks>>,
}

impl MeetingSession {
    /// Wire a session around `graph` and spawn its loops.
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        meeting_id: &str,
        topic: &str,
        graph: IssueGraph,
        language: MeetingLanguage,
        config: Arc<AgentConfig>,
        model: Arc<dyn ModelClient>,
        connector: Arc<dyn AsrConnector>,
        bus: SharedEventBus,
    ) -> SharedMeetingSession {
        let notify: SharedNotifySink = Arc::new(MeetingNotifier::new(meeting_id, bus));
        let multiplexer = AsrSessionMultiplexer::new(connector, language, Utc::now())
            .with_connect_timeout(config.connect_timeout())
            .shared();
        let orchestrator = GenerationOrchestrator::new(
            meeting_id,
            graph,
            language,
            config.clone(),
            model,
            notify.clone(),
        )
        .shared();
        let cancel = CancellationToken::new();

        let generation = tokio::spawn(orchestrator.clone().run(cancel.child_token()));
        let delivery = tokio::spawn(delivery_loop(
            multiplexer.clone(),
            orchestrator.clone(),
            notify.clone(),
            config.clone(),
            cancel.child_token(),
        ));
        info!(meeting = meeting_id, topic, %language, "Meeting session started");

        Arc::new(Self {
            meeting_id: meeting_id.to_string(),
            topic: topic.to_string(),
            config,
            multiplexer,
            orchestrator,
            notify,
            cancel,
            tasks: Mutex::new(Some(SessionTasks {
                generation,
                delivery,
            })),
        })
    }

    pub fn meeting_id(&self) -> &str {
        &self.meeting_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn multiplexer(&self) -> &SharedAsrMultiplexer {
        &self.multiplexer
    }

    pub fn orchestrator(&self) -> &SharedOrchestrator {
        &self.orchestrator
    }

    pub fn is_ended(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Move finalized sentences into the transcript now.
    pub async fn deliver(&self) -> usize {
        deliver(&self.multiplexer, &self.orchestrator, &self.notify).await
    }

    /// Stop the loops and persist the final state.
    pub async fn end(&self) -> Result<SessionSummary> {
        let Some(tasks) = self.tasks.lock().await.take() else {
            bail!("Meeting {} already ended", self.meeting_id);
        };
        info!(meeting = %self.meeting_id, "Ending meeting session");
        self.cancel.cancel();

        let grace = self.config.shutdown_grace();
        for (name, mut handle) in [("generation", tasks.generation), ("delivery", tasks.delivery)] {
            match tokio::time::timeout(grace, &mut handle).await {
                Ok(Ok(())) => debug!(meeting = %self.meeting_id, task = name, "Session task stopped"),
                Ok(Err(e)) => warn!(meeting = %self.meeting_id, task = name, "Session task failed: {}", e),
                Err(_) => {
                    warn!(
                        meeting = %self.meeting_id,
                        task = name,
                        grace_ms = grace.as_millis() as u64,
                        "Session task did not stop in time, abandoning"
                    );
                    handle.abort();
                }
            }
        }

        self.multiplexer.close_all(grace).await;
        let trailing = self.deliver().await;

        let snapshot_path = self
            .orchestrator
            .persist_snapshot()
            .await
            .with_context(|| format!("Failed to persist final issue map for {}", self.meeting_id))?;
        let total = self.multiplexer.get_total();
        let transcript_path = self
            .orchestrator
            .store()
            .save_transcript(&total)
            .with_context(|| format!("Failed to persist transcript for {}", self.meeting_id))?;

        let summary = SessionSummary {
            meeting_id: self.meeting_id.clone(),
            sentences: total.len(),
            live_issues: self.orchestrator.snapshot().await.len(),
            snapshot_path,
            transcript_path,
        };
        info!(
            meeting = %self.meeting_id,
            sentences = summary.sentences,
            trailing,
            snapshot = %summary.snapshot_path.display(),
            "Meeting session ended"
        );
        Ok(summary)
    }
}

async fn deliver(
    multiplexer: &AsrSessionMultiplexer,
    orchestrator: &GenerationOrchestrator,
    notify: &SharedNotifySink,
) -> usize {
    let batch = multiplexer.step();
    if batch.is_empty() {
        return 0;
    }
    notify.publish_transcript(batch.clone());
    orchestrator.ingest(&batch).await;
    batch.len()
}

async fn delivery_loop(
    multiplexer: SharedAsrMultiplexer,
    orchestrator: SharedOrchestrator,
    notify: SharedNotifySink,
    config: Arc<AgentConfig>,
    cancel: CancellationToken,
) {
    let poll = config.delivery_poll();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = multiplexer.wait_for_trigger(poll) => {}
        }
        let delivered = deliver(&multiplexer, &orchestrator, &notify).await;
        if delivered > 0 {
            debug!(meeting = %orchestrator.meeting_id(), delivered, "Transcript batch delivered");
        }
    }
    debug!(meeting = %orchestrator.meeting_id(), "Delivery loop stopped");
}
