//! Generative model seam and an OpenAI-compatible client.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ModelEndpoint;
use crate::prompts;

/// Named inputs for one model call.
///
/// Keys: `issue_chain`, `context`, `current_positions` or `positions_list`,
/// `dialog`, `meeting_language`, `position_number_limitation`.
pub type PromptVars = BTreeMap<String, String>;

/// Which half of a generation cycle a call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Transcript → positions under the focus issue
    Positions,
    /// Positions → sub-issues
    Issues,
}

impl Phase {
    /// Artifact directory for this phase.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Positions => "text_to_position",
            Self::Issues => "text_to_issue",
        }
    }

    /// Artifact file prefix for this phase.
    pub fn file_prefix(self) -> &'static str {
        match self {
            Self::Positions => "t2p",
            Self::Issues => "t2i",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Error type for model calls
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("Model call timed out after {0}ms")]
    Timeout(u64),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Model endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Model returned an empty response")]
    EmptyResponse,
}

impl ModelError {
    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Http(_) | Self::EmptyResponse => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

/// A generative model that turns prompt variables into raw text.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(
        &self,
        phase: Phase,
        vars: &PromptVars,
        timeout: Duration,
    ) -> Result<String, ModelError>;
}

/// Chat completions client for OpenAI-compatible servers.
pub struct OpenAiModelClient {
    client: reqwest::Client,
    endpoint: ModelEndpoint,
}

impl OpenAiModelClient {
    pub fn new(endpoint: ModelEndpoint) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.endpoint.url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ModelClient for OpenAiModelClient {
    async fn generate(
        &self,
        phase: Phase,
        vars: &PromptVars,
        timeout: Duration,
    ) -> Result<String, ModelError> {
        let (system_prompt, user_prompt) = prompts::messages(phase, vars);
        let request_body = serde_json::json!({
            "model": self.endpoint.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt}
            ],
            "temperature": self.endpoint.temperature
        });

        let mut request = self
            .client
            .post(self.completions_url())
            .timeout(timeout)
            .json(&request_body);
        if let Some(key) = &self.endpoint.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ModelError::Timeout(timeout.as_millis() as u64)
            } else {
                ModelError::Http(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Status { status, body });
        }

        let resp_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ModelError::Http(e.to_string()))?;
        let content = resp_json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();
        if content.trim().is_empty() {
            return Err(ModelError::EmptyResponse);
        }
        debug!(%phase, chars = content.len(), model = %self.endpoint.model, "Model responded");
        Ok(content)
    }
}
