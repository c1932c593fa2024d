//! Meeting agents
//!
//! This library provides:
//! - The generation orchestrator that turns transcript windows into issue-map
//!   updates while humans edit the same map
//! - An OpenAI-compatible model client behind the `ModelClient` trait
//! - Prompt templates and per-attempt artifacts
//! - Meeting sessions and a registry keyed by meeting id
//!
//! # Usage
//!
//! ```bash
//! # Replay a recorded transcript through a live session
//! meeting-agents replay --transcript total_asr.json --topic "Q3 budget"
//!
//! # Print the latest stored map of a meeting
//! meeting-agents show --meeting-id m-42
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod artifacts;
pub mod config;
pub mod model;
pub mod orchestrator;
pub mod prompts;
pub mod registry;
pub mod session;

pub use config::{AgentConfig, ModelEndpoint};
pub use model::{ModelClient, ModelError, OpenAiModelClient, Phase, PromptVars};
pub use orchestrator::{
    CommandError, CommandResult, GenerationOrchestrator, OrchestratorState, SharedOrchestrator,
};
pub use registry::SessionRegistry;
pub use session::{MeetingSession, SessionSummary, SharedMeetingSession};
