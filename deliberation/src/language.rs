//! Meeting language and the unit counting that depends on it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Spoken language of a meeting.
///
/// Logographic languages are measured in characters, everything else in
/// whitespace-delimited words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MeetingLanguage {
    Chinese,
    #[default]
    English,
}

impl MeetingLanguage {
    pub fn is_logographic(self) -> bool {
        matches!(self, Self::Chinese)
    }

    /// Size of `text` in the unit this language is accumulated in.
    pub fn count_units(self, text: &str) -> usize {
        if self.is_logographic() {
            text.chars().count()
        } else {
            text.split_whitespace().count()
        }
    }

    /// Rewrite full-width punctuation emitted by the recognizer for
    /// non-logographic languages.
    pub fn normalize_punctuation(self, text: &str) -> String {
        if self.is_logographic() {
            text.to_string()
        } else {
            text.replace('，', ",").replace('。', ".")
        }
    }
}

impl fmt::Display for MeetingLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chinese => write!(f, "Chinese"),
            Self::English => write!(f, "English"),
        }
    }
}

impl FromStr for MeetingLanguage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chinese" | "zh" => Ok(Self::Chinese),
            "english" | "en" => Ok(Self::English),
            other => Err(format!("unsupported meeting language: {}", other)),
        }
    }
}
