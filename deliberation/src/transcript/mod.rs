//! Transcript records and per-session accumulation.

pub mod sentence;
pub mod session;

pub use sentence::{sort_by_start, AsrSentence, Sentence};
pub use session::{Consumer, TranscriptSession};
