//! Transcript records.

use serde::{Deserialize, Serialize};

/// A finalized recognition result, timestamped relative to session start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsrSentence {
    pub content: String,
    /// `[start_ms, end_ms]` relative to session creation.
    pub time_range: (i64, i64),
    pub speaker_id: String,
}

impl AsrSentence {
    pub fn start_ms(&self) -> i64 {
        self.time_range.0
    }
}

/// A sentence as numbered by the transcript session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    pub speaker_id: String,
    /// Position in the session transcript, starting at 0.
    pub sentence_id: usize,
    pub content: String,
}

/// Sort a batch by start time. Stable, so equal starts keep arrival order.
pub fn sort_by_start(sentences: &mut [AsrSentence]) {
    sentences.sort_by_key(AsrSentence::start_ms);
}
