//! AI reflection on chat messages.
//!
//! Sends a single user turn to an OpenAI-style chat-completion endpoint and
//! hands back the reply. Failures never propagate: the caller always gets a
//! [`Reply`] it can turn into a message.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use chatdrop_shared::constants::AI_FALLBACK_REPLY;

use crate::config::ServerConfig;

/// Outcome of an AI request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Answer(String),
    /// The endpoint was unavailable or returned nothing usable.
    Fallback,
}

impl Reply {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Reply::Fallback)
    }

    pub fn into_text(self) -> String {
        match self {
            Reply::Answer(text) => text,
            Reply::Fallback => AI_FALLBACK_REPLY.to_string(),
        }
    }
}

#[derive(Debug, Error)]
enum AiError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Completion endpoint returned {0}")]
    Status(reqwest::StatusCode),

    #[error("Completion response carried no reply")]
    EmptyReply,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [ChatTurn<'a>; 1],
    stream: bool,
}

#[derive(Serialize)]
struct ChatTurn<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AiResponder {
    client: reqwest::Client,
    endpoint: Option<String>,
    model: String,
    api_key: Option<String>,
}

impl AiResponder {
    /// A responder without an endpoint always answers with [`Reply::Fallback`].
    pub fn new(endpoint: Option<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("chatdrop/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });

        Self {
            client,
            endpoint,
            model: model.into(),
            api_key,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            config.ai_api_url.clone(),
            config.ai_model.clone(),
            config.ai_api_key.clone(),
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some()
    }

    pub async fn respond(&self, text: &str) -> Reply {
        let Some(endpoint) = self.endpoint.as_deref() else {
            debug!("AI responder disabled, using fallback reply");
            return Reply::Fallback;
        };

        match self.complete(endpoint, text).await {
            Ok(answer) => {
                debug!(chars = answer.chars().count(), "AI reply received");
                Reply::Answer(answer)
            }
            Err(e) => {
                warn!(endpoint, error = %e, "AI request failed");
                Reply::Fallback
            }
        }
    }

    async fn complete(&self, endpoint: &str, text: &str) -> Result<String, AiError> {
        let body = CompletionRequest {
            model: &self.model,
            messages: [ChatTurn {
                role: "user",
                content: text,
            }],
            stream: false,
        };

        let mut request = self.client.post(endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AiError::Status(status));
        }

        let parsed: CompletionResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(AiError::EmptyReply)
    }
}
