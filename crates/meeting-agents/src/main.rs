//! Meeting agents CLI
//!
//! ```bash
//! # Replay a recorded transcript against the configured model endpoint
//! MEETING_MODEL_URL=http://localhost:8000/v1 \
//!   meeting-agents replay --transcript total_asr.json --topic "Q3 budget"
//!
//! # Print the latest stored map of a meeting
//! meeting-agents show --meeting-id replay-20260101-120000
//! ```

#![allow(clippy::uninlined_format_args)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use deliberation::asr::{OfflineConnector, RecognitionResult};
use deliberation::events::{CycleOutcome, EventBus, EventBusExt, EventFilter, MeetingEvent};
use deliberation::persistence::SnapshotStore;
use deliberation::transcript::{sort_by_start, AsrSentence};
use deliberation::MeetingLanguage;
use meeting_agents::{AgentConfig, ModelClient, OpenAiModelClient, SessionRegistry};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Feed a recorded transcript through a live session
    Replay(ReplayArgs),
    /// Print the latest stored issue map of a meeting
    Show(ShowArgs),
}

#[derive(Args, Debug)]
struct ReplayArgs {
    /// JSON array of `{speaker_id, content, time_range}` sentences
    #[arg(long)]
    transcript: PathBuf,

    /// Root issue of the meeting
    #[arg(long)]
    topic: String,

    #[arg(long, default_value = "english")]
    language: MeetingLanguage,

    /// Defaults to `replay-<timestamp>`
    #[arg(long)]
    meeting_id: Option<String>,

    /// TOML overrides for the environment configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Delay between replayed sentences
    #[arg(long, default_value_t = 0)]
    pace_ms: u64,
}

#[derive(Args, Debug)]
struct ShowArgs {
    #[arg(long)]
    meeting_id: String,

    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    match Cli::parse().command {
        Command::Replay(args) => replay(args).await,
        Command::Show(args) => show(args),
    }
}

async fn replay(args: ReplayArgs) -> Result<()> {
    let config = Arc::new(AgentConfig::load(args.config.as_deref())?);
    let raw = std::fs::read_to_string(&args.transcript)
        .with_context(|| format!("Failed to read {}", args.transcript.display()))?;
    let mut sentences: Vec<AsrSentence> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", args.transcript.display()))?;
    sort_by_start(&mut sentences);

    let meeting_id = args
        .meeting_id
        .unwrap_or_else(|| format!("replay-{}", Utc::now().format("%Y%m%d-%H%M%S")));
    info!(
        meeting = %meeting_id,
        model = %config.model.model,
        endpoint = %config.model.url,
        sentences = sentences.len(),
        "Replay starting"
    );

    let bus = EventBus::new().shared();
    let model: Arc<dyn ModelClient> = Arc::new(OpenAiModelClient::new(config.model.clone()));
    let registry = SessionRegistry::new(
        config.clone(),
        bus.clone(),
        model,
        Arc::new(OfflineConnector),
    );
    let session = registry
        .create(&meeting_id, &args.topic, args.language)
        .await?;
    session.orchestrator().select_focus("1").await?;

    for sentence in &sentences {
        if args.pace_ms > 0 {
            tokio::time::sleep(Duration::from_millis(args.pace_ms)).await;
        }
        let sink = session.multiplexer().result_sink(&sentence.speaker_id, 0);
        sink.deliver(RecognitionResult {
            text: sentence.content.clone(),
            is_final: true,
            time_range_ms: sentence.time_range,
        });
    }
    session.deliver().await;

    // One last cycle over whatever the threshold did not pick up.
    let mut cycles = bus.subscribe_filtered(
        EventFilter::new()
            .meeting(&meeting_id)
            .types(vec!["cycle_finished"]),
    );
    session.orchestrator().trigger_manual_generation().await;
    let wait = (config.call_timeout() + config.retry_delay()) * config.attempts.max(1) * 2
        + Duration::from_secs(5);
    let last = tokio::time::timeout(wait, async {
        loop {
            match cycles.recv().await {
                Ok(MeetingEvent::CycleFinished { outcome, .. }) => {
                    let state = session.orchestrator().state().await;
                    if !state.manual_trigger && !state.generating {
                        return Some(outcome);
                    }
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .await;
    match last {
        Ok(Some(CycleOutcome::Completed {
            positions_touched,
            issues_created,
        })) => info!(positions_touched, issues_created, "Final cycle completed"),
        Ok(Some(outcome)) => warn!(?outcome, "Final cycle did not complete"),
        Ok(None) => warn!("Event bus closed before the final cycle finished"),
        Err(_) => warn!(wait_secs = wait.as_secs(), "Gave up waiting for the final cycle"),
    }

    let summary = registry.end(&meeting_id).await?;
    println!("{}", session.orchestrator().graph().await.render_map());
    info!(
        meeting = %summary.meeting_id,
        sentences = summary.sentences,
        live_issues = summary.live_issues,
        snapshot = %summary.snapshot_path.display(),
        "Replay finished"
    );
    Ok(())
}

fn show(args: ShowArgs) -> Result<()> {
    let config = AgentConfig::load(args.config.as_deref())?;
    let store = SnapshotStore::new(config.meeting_dir(&args.meeting_id));
    let (graph, topic) = store
        .load_latest()
        .with_context(|| format!("Failed to load meeting {}", args.meeting_id))?;
    let transcript = store.load_transcript()?;

    println!("# {}", topic);
    println!("{} sentences", transcript.len());
    println!();
    println!("{}", graph.render_map());
    Ok(())
}
