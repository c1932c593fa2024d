//! Recognizer connection seam and the result sink connections report into.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::buffers::TranscriptBuffers;
use super::error::{AsrError, AsrResult};
use crate::language::MeetingLanguage;
use crate::transcript::AsrSentence;

/// One result reported by a streaming recognizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionResult {
    pub text: String,
    /// Partial hypotheses are reported too; only final ones are kept.
    pub is_final: bool,
    /// `[start_ms, end_ms]` relative to the connection start.
    pub time_range_ms: (i64, i64),
}

/// An open streaming-recognition connection for one speaker.
#[async_trait]
pub trait AsrConnection: Send {
    async fn send(&mut self, chunk: &[u8]) -> AsrResult<()>;

    /// Close the stream. Trailing final results are delivered to the sink
    /// before this returns.
    async fn close(&mut self) -> AsrResult<()>;
}

/// Opens recognizer connections.
#[async_trait]
pub trait AsrConnector: Send + Sync {
    async fn connect(
        &self,
        speaker_id: &str,
        sink: AsrResultSink,
    ) -> AsrResult<Box<dyn AsrConnection>>;
}

/// Connector for sessions fed from recorded transcripts.
///
/// Every connect attempt fails, so audio stays buffered.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineConnector;

#[async_trait]
impl AsrConnector for OfflineConnector {
    async fn connect(
        &self,
        speaker_id: &str,
        _sink: AsrResultSink,
    ) -> AsrResult<Box<dyn AsrConnection>> {
        Err(AsrError::Connect(format!(
            "no speech recognizer configured for speaker {}",
            speaker_id
        )))
    }
}

/// Where a connection reports results for its speaker.
///
/// Shifts timestamps by the connection's start offset so every sentence is
/// relative to session creation.
#[derive(Clone)]
pub struct AsrResultSink {
    speaker_id: String,
    offset_ms: i64,
    language: MeetingLanguage,
    buffers: Arc<TranscriptBuffers>,
}

impl AsrResultSink {
    pub fn new(
        speaker_id: impl Into<String>,
        offset_ms: i64,
        language: MeetingLanguage,
        buffers: Arc<TranscriptBuffers>,
    ) -> Self {
        Self {
            speaker_id: speaker_id.into(),
            offset_ms,
            language,
            buffers,
        }
    }

    pub fn speaker_id(&self) -> &str {
        &self.speaker_id
    }

    pub fn offset_ms(&self) -> i64 {
        self.offset_ms
    }

    /// Record a result. Returns whether it was kept.
    pub fn deliver(&self, result: RecognitionResult) -> bool {
        if !result.is_final || result.text.trim().is_empty() {
            return false;
        }
        let (start, end) = result.time_range_ms;
        let sentence = AsrSentence {
            content: self.language.normalize_punctuation(&result.text),
            time_range: (start + self.offset_ms, end + self.offset_ms),
            speaker_id: self.speaker_id.clone(),
        };
        debug!(speaker = %self.speaker_id, start = sentence.time_range.0, "Final result received");
        self.buffers.push(sentence);
        true
    }
}
