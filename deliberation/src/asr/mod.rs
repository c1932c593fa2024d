//! Streaming speech recognition, multiplexed per speaker.
//!
//! ```text
//! audio chunk ──▶ speaker buffer ──flush──▶ AsrConnection
//!                                               │ final results
//!                                               ▼
//!                                         AsrResultSink ──▶ current ──step()──▶ total
//!                                                              │
//!                                                              └─ trigger (Notify)
//! ```
//!
//! Each speaker has its own lock, so one slow connection never stalls the
//! others. Sentences are kept sorted by start time relative to session
//! creation.

pub mod buffers;
pub mod connection;
pub mod error;
pub mod multiplexer;

pub use buffers::TranscriptBuffers;
pub use connection::{AsrConnection, AsrConnector, AsrResultSink, OfflineConnector, RecognitionResult};
pub use error::{AsrError, AsrResult};
pub use multiplexer::{AsrSessionMultiplexer, SharedAsrMultiplexer};
