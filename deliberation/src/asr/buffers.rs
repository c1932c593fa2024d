//! Current and total transcript buffers fed by recognizer sinks.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;

use crate::transcript::{sort_by_start, AsrSentence};

/// `current` holds sentences not yet stepped into `total`. Both stay sorted
/// by start time.
///
/// Lock order is `total` then `current`; readers take a single lock.
#[derive(Debug, Default)]
pub struct TranscriptBuffers {
    current: Mutex<Vec<AsrSentence>>,
    total: Mutex<Vec<AsrSentence>>,
    trigger: Notify,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TranscriptBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a finalized sentence and wake the delivery loop.
    pub fn push(&self, sentence: AsrSentence) {
        {
            let mut current = lock(&self.current);
            current.push(sentence);
            sort_by_start(&mut current);
        }
        self.trigger.notify_one();
    }

    pub fn get_current(&self) -> Vec<AsrSentence> {
        lock(&self.current).clone()
    }

    pub fn get_total(&self) -> Vec<AsrSentence> {
        lock(&self.total).clone()
    }

    /// Move `current` into `total` and return what was moved.
    pub fn step(&self) -> Vec<AsrSentence> {
        let mut total = lock(&self.total);
        let mut current = lock(&self.current);
        let moved = std::mem::take(&mut *current);
        total.extend(moved.iter().cloned());
        sort_by_start(&mut total);
        moved
    }

    /// Wait for a new sentence, up to `timeout`. Returns whether one arrived.
    pub async fn wait_for_trigger(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.trigger.notified())
            .await
            .is_ok()
    }
}
