//! Running sessions keyed by meeting id.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use deliberation::asr::AsrConnector;
use deliberation::events::{MeetingEvent, SharedEventBus};
use deliberation::graph::IssueGraph;
use deliberation::persistence::SnapshotStore;
use deliberation::MeetingLanguage;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::AgentConfig;
use crate::model::ModelClient;
use crate::session::{MeetingSession, SessionSummary, SharedMeetingSession};

pub struct SessionRegistry {
    config: Arc<AgentConfig>,
    bus: SharedEventBus,
    model: Arc<dyn ModelClient>,
    connector: Arc<dyn AsrConnector>,
    sessions: Mutex<HashMap<String, SharedMeetingSession>>,
}

impl SessionRegistry {
    pub fn new(
        config: Arc<AgentConfig>,
        bus: SharedEventBus,
        model: Arc<dyn ModelClient>,
        connector: Arc<dyn AsrConnector>,
    ) -> Self {
        Self {
            config,
            bus,
            model,
            connector,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn bus(&self) -> &SharedEventBus {
        &self.bus
    }

    /// Start a fresh meeting whose root issue is `topic`.
    pub async fn create(
        &self,
        meeting_id: &str,
        topic: &str,
        language: MeetingLanguage,
    ) -> Result<SharedMeetingSession> {
        let mut graph = IssueGraph::new();
        graph.set_first_issue(topic);
        let session = self
            .start(meeting_id, topic, graph, language, false)
            .await?;
        session
            .orchestrator()
            .persist_snapshot()
            .await
            .with_context(|| format!("Failed to write initial snapshot for {}", meeting_id))?;
        Ok(session)
    }

    /// Continue a stored meeting from its latest snapshot.
    ///
    /// A meeting with no snapshots starts from an `Unknown` root.
    pub async fn resume(
        &self,
        meeting_id: &str,
        language: MeetingLanguage,
    ) -> Result<SharedMeetingSession> {
        let store = SnapshotStore::new(self.config.meeting_dir(meeting_id));
        let (graph, topic) = store
            .load_latest()
            .with_context(|| format!("Failed to load snapshot for {}", meeting_id))?;
        self.start(meeting_id, &topic, graph, language, true).await
    }

    async fn start(
        &self,
        meeting_id: &str,
        topic: &str,
        graph: IssueGraph,
        language: MeetingLanguage,
        resumed: bool,
    ) -> Result<SharedMeetingSession> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(meeting_id) {
            bail!("Meeting {} is already running", meeting_id);
        }
        let session = MeetingSession::start(
            meeting_id,
            topic,
            graph,
            language,
            self.config.clone(),
            self.model.clone(),
            self.connector.clone(),
            self.bus.clone(),
        );
        sessions.insert(meeting_id.to_string(), session.clone());

        self.bus.publish(MeetingEvent::SessionStarted {
            meeting_id: meeting_id.to_string(),
            topic: topic.to_string(),
            resumed,
            timestamp: Utc::now(),
        });
        info!(meeting = meeting_id, resumed, active = sessions.len(), "Meeting registered");
        Ok(session)
    }

    pub async fn get(&self, meeting_id: &str) -> Option<SharedMeetingSession> {
        self.sessions.lock().await.get(meeting_id).cloned()
    }

    pub async fn active(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// End and forget a meeting.
    pub async fn end(&self, meeting_id: &str) -> Result<SessionSummary> {
        let session = self
            .sessions
            .lock()
            .await
            .remove(meeting_id)
            .with_context(|| format!("Meeting {} is not running", meeting_id))?;
        let summary = session.end().await?;

        self.bus.publish(MeetingEvent::SessionEnded {
            meeting_id: meeting_id.to_string(),
            sentences: summary.sentences,
            timestamp: Utc::now(),
        });
        Ok(summary)
    }

    /// End every running meeting; failures are logged and skipped.
    pub async fn end_all(&self) -> Vec<SessionSummary> {
        let mut summaries = Vec::new();
        for meeting_id in self.active().await {
            match self.end(&meeting_id).await {
                Ok(summary) => summaries.push(summary),
                Err(e) => warn!(meeting = %meeting_id, "Failed to end meeting: {:#}", e),
            }
        }
        summaries
    }
}
