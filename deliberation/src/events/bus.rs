//! Event bus for meeting sessions
//!
//! Pub/sub over Tokio broadcast channels. Slow subscribers lag and drop
//! old events rather than blocking publishers.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::debug;

use super::types::{CycleOutcome, MeetingEvent};
use crate::graph::Issue;
use crate::transcript::AsrSentence;

/// Events buffered per subscriber before it starts lagging.
const CHANNEL_CAPACITY: usize = 256;

/// Shared reference to an [`EventBus`]
pub type SharedEventBus = Arc<EventBus>;

/// Broadcast fan-out of [`MeetingEvent`]s to every subscriber.
pub struct EventBus {
    sender: broadcast::Sender<MeetingEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish to whoever is listening and return how many did.
    ///
    /// Nobody listening is not an error; the event is dropped.
    pub fn publish(&self, event: MeetingEvent) -> usize {
        let event_type = event.event_type();
        let meeting = event.meeting_id().to_string();
        match self.sender.send(event) {
            Ok(receivers) => {
                debug!(event_type, meeting = %meeting, receivers, "Meeting event published");
                receivers
            }
            Err(_) => {
                debug!(event_type, meeting = %meeting, "Meeting event dropped, no subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MeetingEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Narrows a subscription to one meeting and/or a set of event types.
/// An empty filter passes everything.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    meeting_id: Option<String>,
    event_types: Option<Vec<String>>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn meeting(mut self, meeting_id: &str) -> Self {
        self.meeting_id = Some(meeting_id.to_string());
        self
    }

    /// Names as returned by [`MeetingEvent::event_type`].
    pub fn types<'a>(mut self, event_types: impl IntoIterator<Item = &'a str>) -> Self {
        self.event_types = Some(event_types.into_iter().map(str::to_string).collect());
        self
    }

    pub fn matches(&self, event: &MeetingEvent) -> bool {
        let meeting_ok = self
            .meeting_id
            .as_deref()
            .is_none_or(|id| id == event.meeting_id());
        let type_ok = self
            .event_types
            .as_ref()
            .is_none_or(|types| types.iter().any(|t| t == event.event_type()));
        meeting_ok && type_ok
    }
}

/// A broadcast receiver that skips events its filter rejects.
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<MeetingEvent>,
    filter: EventFilter,
}

impl FilteredReceiver {
    pub fn new(receiver: broadcast::Receiver<MeetingEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    pub async fn recv(&mut self) -> Result<MeetingEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                break Ok(event);
            }
        }
    }
}

pub trait EventBusExt {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver;
}

impl EventBusExt for EventBus {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }
}

/// Where a running session pushes state changes.
///
/// Implementations must not block; they are called with the session lock
/// held.
pub trait NotifySink: Send + Sync {
    fn publish_graph_snapshot(&self, issue_map: Vec<Issue>, focus: Option<String>);

    fn publish_status(&self, generating: bool);

    fn publish_transcript(&self, sentences: Vec<AsrSentence>);

    fn publish_cycle(&self, focus: Option<String>, outcome: CycleOutcome);
}

/// Shared reference to a notify sink
pub type SharedNotifySink = Arc<dyn NotifySink>;

/// [`NotifySink`] that stamps events with a meeting id and publishes them
/// on a shared bus.
#[derive(Clone)]
pub struct MeetingNotifier {
    meeting_id: String,
    bus: SharedEventBus,
}

impl MeetingNotifier {
    pub fn new(meeting_id: impl Into<String>, bus: SharedEventBus) -> Self {
        Self {
            meeting_id: meeting_id.into(),
            bus,
        }
    }

    fn emit(&self, event: MeetingEvent) {
        self.bus.publish(event);
    }
}

impl NotifySink for MeetingNotifier {
    fn publish_graph_snapshot(&self, issue_map: Vec<Issue>, focus: Option<String>) {
        self.emit(MeetingEvent::GraphSnapshot {
            meeting_id: self.meeting_id.clone(),
            issue_map,
            focus,
            timestamp: Utc::now(),
        });
    }

    fn publish_status(&self, generating: bool) {
        self.emit(MeetingEvent::GenerationStatus {
            meeting_id: self.meeting_id.clone(),
            generating,
            timestamp: Utc::now(),
        });
    }

    fn publish_transcript(&self, sentences: Vec<AsrSentence>) {
        self.emit(MeetingEvent::TranscriptBatch {
            meeting_id: self.meeting_id.clone(),
            sentences,
            timestamp: Utc::now(),
        });
    }

    fn publish_cycle(&self, focus: Option<String>, outcome: CycleOutcome) {
        self.emit(MeetingEvent::CycleFinished {
            meeting_id: self.meeting_id.clone(),
            focus,
            outcome,
            timestamp: Utc::now(),
        });
    }
}
