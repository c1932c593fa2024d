//! Event types published while a meeting runs.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::graph::Issue;
use crate::transcript::AsrSentence;

/// Why a generation cycle's output was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptReason {
    FocusChanged,
    FocusDeleted,
    FocusEdited,
    PositionsChanged,
}

impl fmt::Display for InterruptReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FocusChanged => write!(f, "focus changed"),
            Self::FocusDeleted => write!(f, "focus deleted"),
            Self::FocusEdited => write!(f, "focus edited"),
            Self::PositionsChanged => write!(f, "positions changed"),
        }
    }
}

/// How one generation cycle ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    Completed {
        positions_touched: usize,
        issues_created: usize,
    },
    /// A human edit raced the model call; the output was dropped and will
    /// not be replayed.
    Interrupted { reason: InterruptReason },
    Skipped { reason: String },
    Failed { error: String },
}

/// All meeting events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MeetingEvent {
    SessionStarted {
        meeting_id: String,
        topic: String,
        resumed: bool,
        timestamp: DateTime<Utc>,
    },

    /// The map without deleted nodes, plus the current focus
    GraphSnapshot {
        meeting_id: String,
        issue_map: Vec<Issue>,
        focus: Option<String>,
        timestamp: DateTime<Utc>,
    },

    GenerationStatus {
        meeting_id: String,
        generating: bool,
        timestamp: DateTime<Utc>,
    },

    /// Sentences delivered since the previous batch
    TranscriptBatch {
        meeting_id: String,
        sentences: Vec<AsrSentence>,
        timestamp: DateTime<Utc>,
    },

    CycleFinished {
        meeting_id: String,
        focus: Option<String>,
        outcome: CycleOutcome,
        timestamp: DateTime<Utc>,
    },

    SessionEnded {
        meeting_id: String,
        sentences: usize,
        timestamp: DateTime<Utc>,
    },
}

impl MeetingEvent {
    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            MeetingEvent::SessionStarted { timestamp, .. } => *timestamp,
            MeetingEvent::GraphSnapshot { timestamp, .. } => *timestamp,
            MeetingEvent::GenerationStatus { timestamp, .. } => *timestamp,
            MeetingEvent::TranscriptBatch { timestamp, .. } => *timestamp,
            MeetingEvent::CycleFinished { timestamp, .. } => *timestamp,
            MeetingEvent::SessionEnded { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            MeetingEvent::SessionStarted { .. } => "session_started",
            MeetingEvent::GraphSnapshot { .. } => "graph_snapshot",
            MeetingEvent::GenerationStatus { .. } => "generation_status",
            MeetingEvent::TranscriptBatch { .. } => "transcript_batch",
            MeetingEvent::CycleFinished { .. } => "cycle_finished",
            MeetingEvent::SessionEnded { .. } => "session_ended",
        }
    }

    pub fn meeting_id(&self) -> &str {
        match self {
            MeetingEvent::SessionStarted { meeting_id, .. }
            | MeetingEvent::GraphSnapshot { meeting_id, .. }
            | MeetingEvent::GenerationStatus { meeting_id, .. }
            | MeetingEvent::TranscriptBatch { meeting_id, .. }
            | MeetingEvent::CycleFinished { meeting_id, .. }
            | MeetingEvent::SessionEnded { meeting_id, .. } => meeting_id,
        }
    }
}
