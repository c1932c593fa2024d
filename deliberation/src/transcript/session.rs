//! Per-session transcript accumulation.

use std::collections::{HashMap, VecDeque};
use std::ops::Range;

use super::sentence::{AsrSentence, Sentence};
use crate::language::MeetingLanguage;

/// Independent readers of the transcript, each with its own backlog counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Consumer {
    /// Drives the generation threshold.
    IssueMap,
    /// Drives refreshes of the prior-context tail.
    Context,
}

const CONSUMERS: [Consumer; 2] = [Consumer::IssueMap, Consumer::Context];

/// Ordered sentences of one meeting plus a FIFO of sentences no consumer
/// has accounted for yet.
#[derive(Debug, Clone)]
pub struct TranscriptSession {
    language: MeetingLanguage,
    sentences: Vec<Sentence>,
    unseen: VecDeque<Sentence>,
    pending_units: HashMap<Consumer, usize>,
    speaker_names: HashMap<String, String>,
}

impl TranscriptSession {
    pub fn new(language: MeetingLanguage) -> Self {
        Self {
            language,
            sentences: Vec::new(),
            unseen: VecDeque::new(),
            pending_units: CONSUMERS.iter().map(|c| (*c, 0)).collect(),
            speaker_names: HashMap::new(),
        }
    }

    pub fn language(&self) -> MeetingLanguage {
        self.language
    }

    /// Number of sentences so far; watermarks index into this.
    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    pub fn sentences(&self) -> &[Sentence] {
        &self.sentences
    }

    /// Append a delivered batch, numbering each sentence.
    pub fn ingest(&mut self, batch: &[AsrSentence]) {
        for item in batch {
            let sentence = Sentence {
                speaker_id: item.speaker_id.clone(),
                sentence_id: self.sentences.len(),
                content: item.content.clone(),
            };
            self.sentences.push(sentence.clone());
            self.unseen.push_back(sentence);
        }
    }

    /// Account for every unseen sentence and return the units added.
    pub fn drain_unseen(&mut self) -> usize {
        let mut units = 0;
        while let Some(sentence) = self.unseen.pop_front() {
            units += self.language.count_units(&sentence.content);
        }
        for counter in self.pending_units.values_mut() {
            *counter += units;
        }
        units
    }

    pub fn pending(&self, consumer: Consumer) -> usize {
        self.pending_units.get(&consumer).copied().unwrap_or(0)
    }

    pub fn reset_pending(&mut self, consumer: Consumer) {
        self.pending_units.insert(consumer, 0);
    }

    pub fn set_speaker_name(&mut self, speaker_id: impl Into<String>, name: impl Into<String>) {
        self.speaker_names.insert(speaker_id.into(), name.into());
    }

    fn speaker_name<'a>(&'a self, speaker_id: &'a str) -> &'a str {
        self.speaker_names
            .get(speaker_id)
            .map(String::as_str)
            .unwrap_or(speaker_id)
    }

    /// Render sentences in `range` as numbered dialog lines.
    ///
    /// The range is clamped to the transcript.
    pub fn render_dialog(&self, range: Range<usize>) -> String {
        let end = range.end.min(self.sentences.len());
        let start = range.start.min(end);
        self.sentences[start..end]
            .iter()
            .map(|s| {
                format!(
                    "{}. {}: {}",
                    s.sentence_id,
                    self.speaker_name(&s.speaker_id),
                    s.content
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Up to `max` sentences immediately before `end`, rendered as dialog.
    pub fn context_tail(&self, end: usize, max: usize) -> String {
        let end = end.min(self.sentences.len());
        self.render_dialog(end.saturating_sub(max)..end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asr(speaker: &str, content: &str, start: i64) -> AsrSentence {
        AsrSentence {
            content: content.into(),
            time_range: (start, start + 500),
            speaker_id: speaker.into(),
        }
    }

    #[test]
    fn test_ingest_numbers_sentences() {
        let mut transcript = TranscriptSession::new(MeetingLanguage::English);
        transcript.ingest(&[asr("a", "hello there", 0), asr("b", "hi", 10)]);
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.sentences()[1].sentence_id, 1);
    }

    #[test]
    fn test_drain_feeds_every_consumer_once() {
        let mut transcript = TranscriptSession::new(MeetingLanguage::English);
        transcript.ingest(&[asr("a", "one two three", 0)]);
        assert_eq!(transcript.drain_unseen(), 3);
        assert_eq!(transcript.drain_unseen(), 0);
        assert_eq!(transcript.pending(Consumer::IssueMap), 3);
        assert_eq!(transcript.pending(Consumer::Context), 3);

        transcript.reset_pending(Consumer::IssueMap);
        assert_eq!(transcript.pending(Consumer::IssueMap), 0);
        assert_eq!(transcript.pending(Consumer::Context), 3);
    }

    #[test]
    fn test_chinese_counts_characters() {
        let mut transcript = TranscriptSession::new(MeetingLanguage::Chinese);
        transcript.ingest(&[asr("a", "我们讨论预算", 0)]);
        assert_eq!(transcript.drain_unseen(), 6);
    }

    #[test]
    fn test_render_dialog_uses_speaker_names() {
        let mut transcript = TranscriptSession::new(MeetingLanguage::English);
        transcript.set_speaker_name("u1", "Alice");
        transcript.ingest(&[asr("u1", "first", 0), asr("u2", "second", 5), asr("u1", "third", 9)]);
        assert_eq!(transcript.render_dialog(1..3), "1. u2: second\n2. Alice: third");
        assert_eq!(transcript.render_dialog(2..99), "2. Alice: third");
        assert_eq!(transcript.render_dialog(5..9), "");
        assert_eq!(transcript.context_tail(2, 1), "1. u2: second");
    }
}
