//! Per-speaker recognizer connections for one meeting.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::buffers::TranscriptBuffers;
use super::connection::{AsrConnection, AsrConnector, AsrResultSink};
use super::error::{AsrError, AsrResult};
use crate::language::MeetingLanguage;
use crate::transcript::AsrSentence;

#[derive(Default)]
struct SpeakerChannel {
    pending: VecDeque<Vec<u8>>,
    connection: Option<Box<dyn AsrConnection>>,
}

impl SpeakerChannel {
    /// Send buffered chunks in order, stopping at the first failure.
    async fn flush(&mut self, speaker_id: &str) -> usize {
        let Some(connection) = self.connection.as_mut() else {
            return 0;
        };
        let mut sent = 0;
        while let Some(chunk) = self.pending.front() {
            if let Err(e) = connection.send(chunk).await {
                warn!(speaker = speaker_id, remaining = self.pending.len(), "Audio send failed: {}", e);
                break;
            }
            self.pending.pop_front();
            sent += 1;
        }
        sent
    }
}

/// Bound on a single recognizer connect unless overridden.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared reference to a multiplexer
pub type SharedAsrMultiplexer = Arc<AsrSessionMultiplexer>;

/// One streaming-recognition connection per speaker, with outbound
/// buffering and a time-ordered merge of finalized results.
pub struct AsrSessionMultiplexer {
    connector: Arc<dyn AsrConnector>,
    language: MeetingLanguage,
    created_at: DateTime<Utc>,
    connect_timeout: Duration,
    buffers: Arc<TranscriptBuffers>,
    speakers: Mutex<HashMap<String, Arc<tokio::sync::Mutex<SpeakerChannel>>>>,
}

impl AsrSessionMultiplexer {
    pub fn new(
        connector: Arc<dyn AsrConnector>,
        language: MeetingLanguage,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            connector,
            language,
            created_at,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            buffers: Arc::new(TranscriptBuffers::new()),
            speakers: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn shared(self) -> SharedAsrMultiplexer {
        Arc::new(self)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn buffers(&self) -> &Arc<TranscriptBuffers> {
        &self.buffers
    }

    fn channel(&self, speaker_id: &str) -> Arc<tokio::sync::Mutex<SpeakerChannel>> {
        let mut speakers = self.speakers.lock().unwrap_or_else(PoisonError::into_inner);
        speakers.entry(speaker_id.to_string()).or_default().clone()
    }

    /// Sink for results of `speaker_id` starting `offset_ms` into the session.
    pub fn result_sink(&self, speaker_id: &str, offset_ms: i64) -> AsrResultSink {
        AsrResultSink::new(speaker_id, offset_ms, self.language, self.buffers.clone())
    }

    /// Turn a speaker's microphone on or off.
    ///
    /// Any open connection is flushed and closed first. When enabling, the
    /// new connection starts at `receive_ts` relative to session creation; a
    /// failed or timed-out connect leaves audio buffered for the next attempt.
    pub async fn toggle_mic(
        &self,
        speaker_id: &str,
        enable: bool,
        receive_ts: DateTime<Utc>,
    ) -> AsrResult<()> {
        let channel = self.channel(speaker_id);
        let mut channel = channel.lock().await;

        if channel.connection.is_some() {
            channel.flush(speaker_id).await;
            if let Some(mut connection) = channel.connection.take() {
                if let Err(e) = connection.close().await {
                    warn!(speaker = speaker_id, "Failed to close recognizer connection: {}", e);
                }
                info!(speaker = speaker_id, "Recognizer connection closed");
            }
        }

        if enable {
            let offset_ms = (receive_ts - self.created_at).num_milliseconds();
            let sink = self.result_sink(speaker_id, offset_ms);
            let connect = tokio::time::timeout(
                self.connect_timeout,
                self.connector.connect(speaker_id, sink),
            );
            let connected = connect
                .await
                .unwrap_or_else(|_| Err(AsrError::Timeout(self.connect_timeout.as_millis() as u64)));
            match connected {
                Ok(connection) => {
                    channel.connection = Some(connection);
                    let flushed = channel.flush(speaker_id).await;
                    info!(speaker = speaker_id, offset_ms, flushed, "Recognizer connection opened");
                }
                Err(e) => {
                    warn!(speaker = speaker_id, buffered = channel.pending.len(), "Recognizer connect failed: {}", e);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Queue a chunk and flush what the connection will take.
    ///
    /// Returns how many chunks were sent.
    pub async fn send_audio_chunk(&self, speaker_id: &str, chunk: Vec<u8>) -> usize {
        let channel = self.channel(speaker_id);
        let mut channel = channel.lock().await;
        channel.pending.push_back(chunk);
        channel.flush(speaker_id).await
    }

    /// Number of chunks waiting for a connection.
    pub async fn buffered_chunks(&self, speaker_id: &str) -> usize {
        let channel = self.channel(speaker_id);
        let len = channel.lock().await.pending.len();
        len
    }

    /// Close every connection. Each speaker gets `grace` in total for its
    /// lock, final flush and close; laggards are abandoned.
    pub async fn close_all(&self, grace: Duration) {
        let channels: Vec<(String, Arc<tokio::sync::Mutex<SpeakerChannel>>)> = {
            let speakers = self.speakers.lock().unwrap_or_else(PoisonError::into_inner);
            speakers
                .iter()
                .map(|(id, ch)| (id.clone(), ch.clone()))
                .collect()
        };

        let mut closing = JoinSet::new();
        for (speaker_id, channel) in channels {
            closing.spawn(async move {
                let close = async {
                    let mut channel = channel.lock().await;
                    channel.flush(&speaker_id).await;
                    match channel.connection.take() {
                        Some(mut connection) => connection.close().await.map(|()| true),
                        None => Ok(false),
                    }
                };
                match tokio::time::timeout(grace, close).await {
                    Ok(Ok(true)) => debug!(speaker = %speaker_id, "Recognizer connection closed"),
                    Ok(Ok(false)) => {}
                    Ok(Err(e)) => warn!(speaker = %speaker_id, "Close failed: {}", e),
                    Err(_) => warn!(
                        speaker = %speaker_id,
                        grace_ms = grace.as_millis() as u64,
                        "Close exceeded grace period, abandoning connection"
                    ),
                }
            });
        }
        while closing.join_next().await.is_some() {}
    }

    pub fn get_current(&self) -> Vec<AsrSentence> {
        self.buffers.get_current()
    }

    pub fn get_total(&self) -> Vec<AsrSentence> {
        self.buffers.get_total()
    }

    pub fn step(&self) -> Vec<AsrSentence> {
        self.buffers.step()
    }

    pub async fn wait_for_trigger(&self, timeout: Duration) -> bool {
        self.buffers.wait_for_trigger(timeout).await
    }
}
