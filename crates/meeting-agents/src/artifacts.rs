//! Per-attempt records of model calls.
//!
//! ```text
//! {meeting_dir}/online/text_to_position/t2p_{n}_result.json          first attempt
//! {meeting_dir}/online/text_to_position/t2p_{n}_result_retry_2.json  second attempt
//! {meeting_dir}/online/text_to_issue/t2i_{n}_result.json
//! ```
//!
//! Existing files are never overwritten; the retry suffix is bumped until a
//! free path is found.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{ModelError, Phase, PromptVars};
use crate::prompts::PROMPT_VERSION;

/// What is written for one attempt.
#[derive(Debug, Serialize)]
pub struct AttemptRecord<'a> {
    pub meeting_id: &'a str,
    pub phase: Phase,
    pub cycle: u32,
    /// 1-based
    pub attempt: u32,
    pub prompt_version: &'static str,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub vars: &'a PromptVars,
    pub output: Option<&'a str>,
    pub error: Option<String>,
}

/// Writes attempt records under one meeting's `online/` directory.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    root: PathBuf,
}

impl ArtifactWriter {
    pub fn new(meeting_dir: &Path) -> Self {
        Self {
            root: meeting_dir.join("online"),
        }
    }

    /// First free path for `attempt` (1-based) of `cycle`.
    pub fn attempt_path(&self, phase: Phase, cycle: u32, attempt: u32) -> PathBuf {
        let dir = self.root.join(phase.dir_name());
        let base = format!("{}_{}_result", phase.file_prefix(), cycle);
        let first = dir.join(format!("{}.json", base));
        if !first.exists() {
            return first;
        }
        let mut retry = attempt.max(1);
        loop {
            let candidate = dir.join(format!("{}_retry_{}.json", base, retry));
            if !candidate.exists() {
                return candidate;
            }
            retry += 1;
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &self,
        meeting_id: &str,
        phase: Phase,
        cycle: u32,
        attempt: u32,
        vars: &PromptVars,
        outcome: &Result<String, ModelError>,
        started_at: DateTime<Utc>,
    ) -> Result<PathBuf> {
        let path = self.attempt_path(phase, cycle, attempt);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let record = AttemptRecord {
            meeting_id,
            phase,
            cycle,
            attempt,
            prompt_version: PROMPT_VERSION,
            started_at,
            finished_at: Utc::now(),
            vars,
            output: outcome.as_ref().ok().map(String::as_str),
            error: outcome.as_ref().err().map(ToString::to_string),
        };
        let json = serde_json::to_string_pretty(&record)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempts_never_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path());
        let vars = PromptVars::new();

        let first = writer
            .record("m", Phase::Positions, 0, 1, &vars, &Err(ModelError::Timeout(10)), Utc::now())
            .unwrap();
        let second = writer
            .record("m", Phase::Positions, 0, 2, &vars, &Ok("1.1 position: x".into()), Utc::now())
            .unwrap();
        let again = writer
            .record("m", Phase::Positions, 0, 2, &vars, &Ok("later".into()), Utc::now())
            .unwrap();

        assert!(first.ends_with("online/text_to_position/t2p_0_result.json"));
        assert!(second.ends_with("online/text_to_position/t2p_0_result_retry_2.json"));
        assert!(again.ends_with("online/text_to_position/t2p_0_result_retry_3.json"));

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&first).unwrap()).unwrap();
        assert_eq!(written["phase"], "positions");
        assert_eq!(written["error"], "Model call timed out after 10ms");
        assert!(written["output"].is_null());
    }

    #[test]
    fn test_issue_phase_directory() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path());
        let path = writer.attempt_path(Phase::Issues, 4, 1);
        assert!(path.ends_with("online/text_to_issue/t2i_4_result.json"));
    }
}
