//! Snapshot persistence for resuming a meeting.
//!
//! ```text
//! {meeting_dir}/
//! ├── issue_map/
//! │   ├── issue_map-1.json      {"issue_map": [Issue, ...]}
//! │   └── issue_map-2.json      highest number = latest
//! └── total_asr.json            [AsrSentence, ...]
//! ```
//!
//! Snapshots keep deleted nodes so ids stay stable across a resume.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::graph::{GraphError, Issue, IssueGraph};
use crate::transcript::AsrSentence;

/// Topic used when nothing can be resumed.
pub const UNKNOWN_TOPIC: &str = "Unknown";

const SNAPSHOT_DIR: &str = "issue_map";
const SNAPSHOT_PREFIX: &str = "issue_map-";
const TRANSCRIPT_FILE: &str = "total_asr.json";

/// Error during persistence operations.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Failed to deserialize {path}: {source}")]
    Deserialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Snapshot rejected: {0}")]
    Graph(#[from] GraphError),
}

/// Result type for persistence operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    issue_map: Vec<Issue>,
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> PersistenceError + '_ {
    move |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Numbered issue-map snapshots and the transcript dump of one meeting.
///
/// The snapshot directory is scanned once, on the first save; later saves
/// number from a counter shared by clones of the store.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    meeting_dir: PathBuf,
    last_saved: Arc<Mutex<Option<u64>>>,
}

impl SnapshotStore {
    pub fn new(meeting_dir: impl Into<PathBuf>) -> Self {
        Self {
            meeting_dir: meeting_dir.into(),
            last_saved: Arc::new(Mutex::new(None)),
        }
    }

    pub fn meeting_dir(&self) -> &Path {
        &self.meeting_dir
    }

    fn snapshot_dir(&self) -> PathBuf {
        self.meeting_dir.join(SNAPSHOT_DIR)
    }

    /// Highest snapshot number on disk with its path.
    fn latest_entry(&self) -> PersistenceResult<Option<(u64, PathBuf)>> {
        let dir = self.snapshot_dir();
        if !dir.exists() {
            return Ok(None);
        }
        let mut latest: Option<(u64, PathBuf)> = None;
        for entry in fs::read_dir(&dir).map_err(io_err(&dir))? {
            let path = entry.map_err(io_err(&dir))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let number = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.strip_prefix(SNAPSHOT_PREFIX))
                .and_then(|n| n.parse::<u64>().ok());
            let Some(number) = number else {
                continue;
            };
            if latest.as_ref().map_or(true, |(max, _)| number > *max) {
                latest = Some((number, path));
            }
        }
        Ok(latest)
    }

    /// Write the full map (deleted nodes included) as the next snapshot.
    ///
    /// Returns the path written.
    pub fn save(&self, graph: &IssueGraph) -> PersistenceResult<PathBuf> {
        let dir = self.snapshot_dir();
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;
        let next = {
            let mut last_saved = self.last_saved.lock().unwrap_or_else(PoisonError::into_inner);
            let last = match *last_saved {
                Some(n) => n,
                None => self.latest_entry()?.map_or(0, |(n, _)| n),
            };
            *last_saved = Some(last + 1);
            last + 1
        };
        let path = dir.join(format!("{}{}.json", SNAPSHOT_PREFIX, next));

        let file = SnapshotFile {
            issue_map: graph.issues().to_vec(),
        };
        let json = serde_json::to_string_pretty(&file).map_err(PersistenceError::Serialize)?;
        fs::write(&path, json).map_err(io_err(&path))?;
        debug!(path = %path.display(), "Issue map snapshot saved");
        Ok(path)
    }

    /// Load the latest snapshot and its topic.
    ///
    /// A missing or empty store yields a single unconfirmed root issue with
    /// the topic `"Unknown"`.
    pub fn load_latest(&self) -> PersistenceResult<(IssueGraph, String)> {
        let Some((number, path)) = self.latest_entry()? else {
            warn!(dir = %self.snapshot_dir().display(), "No issue map snapshot found");
            return Ok(Self::unknown_graph());
        };
        let raw = fs::read_to_string(&path).map_err(io_err(&path))?;
        let file: SnapshotFile =
            serde_json::from_str(&raw).map_err(|source| PersistenceError::Deserialize {
                path: path.clone(),
                source,
            })?;
        if file.issue_map.is_empty() {
            return Ok(Self::unknown_graph());
        }

        let graph = IssueGraph::from_issues(file.issue_map)?;
        let topic = graph
            .issue(1)
            .map(|i| i.content.clone())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| UNKNOWN_TOPIC.to_string());
        info!(snapshot = number, issues = graph.issues().len(), "Issue map resumed");
        Ok((graph, topic))
    }

    fn unknown_graph() -> (IssueGraph, String) {
        let mut graph = IssueGraph::new();
        graph.set_first_issue(UNKNOWN_TOPIC);
        (graph, UNKNOWN_TOPIC.to_string())
    }

    /// Write the whole meeting transcript, replacing any previous dump.
    pub fn save_transcript(&self, sentences: &[AsrSentence]) -> PersistenceResult<PathBuf> {
        fs::create_dir_all(&self.meeting_dir).map_err(io_err(&self.meeting_dir))?;
        let path = self.meeting_dir.join(TRANSCRIPT_FILE);
        let json = serde_json::to_string_pretty(sentences).map_err(PersistenceError::Serialize)?;
        fs::write(&path, json).map_err(io_err(&path))?;
        info!(path = %path.display(), sentences = sentences.len(), "Transcript saved");
        Ok(path)
    }

    pub fn load_transcript(&self) -> PersistenceResult<Vec<AsrSentence>> {
        let path = self.meeting_dir.join(TRANSCRIPT_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&path).map_err(io_err(&path))?;
        serde_json::from_str(&raw).map_err(|source| PersistenceError::Deserialize { path, source })
    }
}
