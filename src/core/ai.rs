//! Chat backend abstraction and conversations.
//!
//! The text-generation service is stateless: every query resends the whole
//! history. A [`Conversation`] owns that history together with its own backend
//! client, and applies the timeout and retry policy to each query.

use crate::{
    config::AiConfig,
    errors::{Error, Result},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions
    System,
    /// The user
    User,
    /// The model
    Assistant,
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who said it
    pub role: Role,
    /// What was said
    pub content: String,
}

impl ChatMessage {
    /// System message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// User message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Failure of a single backend call.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Request never completed
    #[error("transport error: {0}")]
    Transport(String),
    /// Service answered with an error status
    #[error("API error {status}: {body}")]
    Api {
        /// HTTP status
        status: u16,
        /// Response body
        body: String,
    },
    /// Response could not be understood
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// A text-generation service.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Returns the model's reply to the full message history.
    async fn complete(&self, messages: &[ChatMessage]) -> std::result::Result<String, BackendError>;
}

/// Creates one backend client per conversation.
pub trait BackendFactory: Send + Sync {
    /// Builds a new, unshared backend client.
    fn create(&self) -> Box<dyn ChatBackend>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat completions client.
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_key: String,
    api_url: String,
    model: String,
}

impl OpenAiBackend {
    /// Creates a client with its own connection pool.
    #[must_use]
    pub fn new(api_key: String, api_url: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            api_url,
            model,
        }
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    async fn complete(&self, messages: &[ChatMessage]) -> std::result::Result<String, BackendError> {
        let request = ChatRequest {
            model: &self.model,
            messages,
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| BackendError::Malformed("empty choices".to_string()))
    }
}

/// Builds [`OpenAiBackend`] clients from shared settings.
#[derive(Debug, Clone)]
pub struct OpenAiFactory {
    api_key: String,
    api_url: String,
    model: String,
}

impl OpenAiFactory {
    /// Reads `LLM_API_KEY` from the environment. `LLM_API_URL` and `LLM_MODEL`
    /// override the configured endpoint and model when set.
    ///
    /// # Errors
    /// Returns [`Error::EnvVar`] if `LLM_API_KEY` is not set.
    pub fn from_env(config: &AiConfig) -> Result<Self> {
        let api_key = std::env::var("LLM_API_KEY")?;
        let api_url = std::env::var("LLM_API_URL").unwrap_or_else(|_| config.api_url.clone());
        let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| config.model.clone());
        Ok(Self {
            api_key,
            api_url,
            model,
        })
    }
}

impl BackendFactory for OpenAiFactory {
    fn create(&self) -> Box<dyn ChatBackend> {
        Box::new(OpenAiBackend::new(
            self.api_key.clone(),
            self.api_url.clone(),
            self.model.clone(),
        ))
    }
}

/// Timeout and retry behaviour for queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryPolicy {
    /// Deadline for one backend call
    pub timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry, doubled after each
    pub initial_backoff: Duration,
    /// Shorter replies (trimmed) are treated as failures
    pub min_reply_chars: usize,
}

impl From<&AiConfig> for QueryPolicy {
    fn from(config: &AiConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
            initial_backoff: Duration::from_secs(config.initial_backoff_secs),
            min_reply_chars: config.min_reply_chars,
        }
    }
}

impl Default for QueryPolicy {
    fn default() -> Self {
        Self::from(&AiConfig::default())
    }
}

enum AttemptFailure {
    Timeout,
    Degenerate(String),
    Backend(BackendError),
}

/// A turn-by-turn exchange with the text-generation service.
///
/// The backend client is owned exclusively. Dropping the conversation drops the
/// client and any in-flight request with it.
pub struct Conversation {
    id: Uuid,
    history: Vec<ChatMessage>,
    backend: Box<dyn ChatBackend>,
    policy: QueryPolicy,
}

impl Conversation {
    /// Starts a conversation seeded with a system prompt.
    pub fn new(system_prompt: &str, backend: Box<dyn ChatBackend>, policy: QueryPolicy) -> Self {
        Self {
            id: Uuid::new_v4(),
            history: vec![ChatMessage::system(system_prompt)],
            backend,
            policy,
        }
    }

    /// Identity of this conversation; fresh for every new one.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Messages exchanged so far, system prompt first.
    #[must_use]
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Sends `prompt` with the full history and returns the reply.
    ///
    /// On success both the prompt and the reply are appended. On failure the
    /// history is left as it was.
    ///
    /// # Errors
    /// Returns [`Error::AiTimeout`] if every attempt timed out on the last try,
    /// or [`Error::Ai`] for transport failures and degenerate replies.
    #[tracing::instrument(skip(self, prompt), fields(conversation = %self.id))]
    pub async fn query(&mut self, prompt: &str) -> Result<String> {
        if prompt.trim().is_empty() {
            return Err(Error::Ai {
                message: "Cannot process empty prompt".to_string(),
            });
        }

        self.history.push(ChatMessage::user(prompt));
        match self.query_with_retry().await {
            Ok(reply) => {
                self.history.push(ChatMessage::assistant(reply.clone()));
                Ok(reply)
            }
            Err(e) => {
                self.history.pop();
                Err(e)
            }
        }
    }

    async fn query_with_retry(&self) -> Result<String> {
        let attempts = self.policy.max_retries + 1;
        let mut backoff = self.policy.initial_backoff;
        let mut last = AttemptFailure::Timeout;

        for attempt in 1..=attempts {
            // Timing out drops the request future, which cancels it.
            let outcome =
                tokio::time::timeout(self.policy.timeout, self.backend.complete(&self.history))
                    .await;

            last = match outcome {
                Ok(Ok(reply)) if reply.trim().chars().count() >= self.policy.min_reply_chars => {
                    tracing::debug!(attempt, "AI reply received");
                    return Ok(reply);
                }
                Ok(Ok(reply)) => AttemptFailure::Degenerate(reply),
                Ok(Err(e)) => AttemptFailure::Backend(e),
                Err(_) => AttemptFailure::Timeout,
            };

            match &last {
                AttemptFailure::Timeout => {
                    tracing::warn!(attempt, attempts, "AI query timed out");
                }
                AttemptFailure::Degenerate(reply) => {
                    tracing::warn!(attempt, attempts, "AI returned very short response: '{reply}'");
                }
                AttemptFailure::Backend(e) => {
                    tracing::warn!(attempt, attempts, "AI query failed: {e}");
                }
            }

            if attempt < attempts {
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }

        Err(match last {
            AttemptFailure::Timeout => Error::AiTimeout {
                seconds: self.policy.timeout.as_secs(),
            },
            AttemptFailure::Degenerate(_) => Error::Ai {
                message: "The AI model returned an unusually short response".to_string(),
            },
            AttemptFailure::Backend(e) => Error::Ai {
                message: e.to_string(),
            },
        })
    }
}
