use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use deliberation::MeetingLanguage;
use serde::Deserialize;

/// OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelEndpoint {
    /// Base URL, e.g. `http://localhost:8000/v1`
    pub url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
}

impl Default for ModelEndpoint {
    fn default() -> Self {
        Self {
            url: std::env::var("MEETING_MODEL_URL")
                .unwrap_or_else(|_| "http://localhost:8000/v1".into()),
            api_key: std::env::var("MEETING_MODEL_API_KEY").ok(),
            model: std::env::var("MEETING_MODEL_NAME").unwrap_or_else(|_| "gpt-4o-mini".into()),
            temperature: 0.3,
        }
    }
}

/// Top-level agent configuration.
///
/// Defaults come from `MEETING_*` environment variables; a TOML file passed
/// with `--config` overrides individual keys.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub model: ModelEndpoint,
    /// Per-call model timeout; a timeout counts as a failed attempt.
    pub call_timeout_secs: u64,
    /// Attempts per model call, first one included.
    pub attempts: u32,
    pub retry_delay_ms: u64,
    /// Sleep between generation-loop polls when nothing is ready.
    pub idle_interval_ms: u64,
    /// Characters of Chinese transcript that trigger a cycle.
    pub chinese_threshold: usize,
    /// Words of non-Chinese transcript that trigger a cycle.
    pub english_threshold: usize,
    /// Issue-phase outputs shorter than this mean "no new issue".
    pub min_issue_output_len: usize,
    /// Sentences of prior dialog handed to the model as context.
    pub context_sentences: usize,
    pub data_root: PathBuf,
    /// Bound on each join and connection close at session end.
    pub shutdown_grace_ms: u64,
    /// Bound on opening one recognizer connection.
    pub connect_timeout_ms: u64,
    /// Fallback poll of the transcript delivery loop.
    pub delivery_poll_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: ModelEndpoint::default(),
            call_timeout_secs: u64_from_env("MEETING_CALL_TIMEOUT_SECS", 20),
            attempts: u64_from_env("MEETING_ATTEMPTS", 3) as u32,
            retry_delay_ms: u64_from_env("MEETING_RETRY_DELAY_MS", 1000),
            idle_interval_ms: u64_from_env("MEETING_IDLE_INTERVAL_MS", 1000),
            chinese_threshold: u64_from_env("MEETING_CHINESE_THRESHOLD", 50) as usize,
            english_threshold: u64_from_env("MEETING_ENGLISH_THRESHOLD", 100) as usize,
            min_issue_output_len: u64_from_env("MEETING_MIN_ISSUE_OUTPUT_LEN", 5) as usize,
            context_sentences: u64_from_env("MEETING_CONTEXT_SENTENCES", 20) as usize,
            data_root: std::env::var("MEETING_DATA_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data")),
            shutdown_grace_ms: u64_from_env("MEETING_SHUTDOWN_GRACE_MS", 5000),
            connect_timeout_ms: u64_from_env("MEETING_CONNECT_TIMEOUT_MS", 10_000),
            delivery_poll_ms: u64_from_env("MEETING_DELIVERY_POLL_MS", 1000),
        }
    }
}

impl AgentConfig {
    /// Environment defaults, overlaid by `path` when given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                Self::from_toml(&raw)
                    .with_context(|| format!("Failed to parse config {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Backlog size that makes a cycle due.
    pub fn threshold_for(&self, language: MeetingLanguage) -> usize {
        if language.is_logographic() {
            self.chinese_threshold
        } else {
            self.english_threshold
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn delivery_poll(&self) -> Duration {
        Duration::from_millis(self.delivery_poll_ms)
    }

    pub fn meeting_dir(&self, meeting_id: &str) -> PathBuf {
        self.data_root.join(meeting_id)
    }
}

fn u64_from_env(var: &str, default: u64) -> u64 {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}
