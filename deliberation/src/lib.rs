//! Live deliberation core
//!
//! This library provides:
//! - The issue map (Issues → Positions → Arguments) with cascading soft
//!   delete and confirm operations
//! - Parsing of model output into position and sub-issue candidates
//! - Per-speaker streaming-recognition multiplexing with ordered merge
//! - Transcript accumulation with per-consumer backlog counters
//! - Meeting events over a broadcast bus
//! - Numbered snapshot persistence for resume
//!
//! # Data flow
//!
//! ```text
//! audio ──▶ AsrSessionMultiplexer ──▶ AsrSentence batches ──▶ TranscriptSession
//!                                                                   │
//!                            human edits ──▶ IssueGraph ◀── parsed model output
//!                                                │
//!                                                ▼
//!                                   NotifySink / SnapshotStore
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod asr;
pub mod events;
pub mod graph;
pub mod language;
pub mod parser;
pub mod persistence;
pub mod transcript;

// Re-export key graph types
pub use graph::{
    filter_deleted, GraphError, GraphResult, Issue, IssueGraph, NodeId, NodeKind, NodeState,
    Position, Relation, REJECTED_NODE_ID,
};

// Re-export key transcript types
pub use language::MeetingLanguage;
pub use transcript::{AsrSentence, Consumer, Sentence, TranscriptSession};

// Re-export key ASR types
pub use asr::{
    AsrConnection, AsrConnector, AsrError, AsrResultSink, AsrSessionMultiplexer,
    OfflineConnector, RecognitionResult, SharedAsrMultiplexer,
};

// Re-export key event types
pub use events::{
    CycleOutcome, EventBus, InterruptReason, MeetingEvent, MeetingNotifier, NotifySink,
    SharedEventBus, SharedNotifySink,
};

pub use parser::{IssueCandidate, PositionCandidate};
pub use persistence::{PersistenceError, SnapshotStore};
