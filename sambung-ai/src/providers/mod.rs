pub mod anthropic;
pub mod base_url;
pub mod compatible;
#[cfg(feature = "google")]
pub mod google;
pub mod instrument;
pub mod sanitize;
pub mod sse;
#[cfg(test)]
pub(crate) mod testing;

use crate::types::{ChatMessage, CompletionResult, FinishReason, GenerationSettings, ProviderKind, Usage};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Errors from provider operations.
///
/// These stay inside the crate boundary; [`crate::ErrorTranslator`] turns
/// them into [`crate::AppError`] before they reach a caller.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Authentication required: {0}")]
    AuthRequired(String),

    #[error("Rate limited (429): {body}")]
    RateLimited {
        retry_after_ms: Option<u64>,
        body: String,
    },

    /// The provider reported a failure inside an already-open stream.
    #[error("Stream error: {0}")]
    Stream(String),

    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    /// HTTP status carried by the error, when the transport reported one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Http { status, .. } => Some(*status),
            ProviderError::RateLimited { .. } => Some(429),
            ProviderError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// One request as seen by a provider adapter: already validated settings
/// plus the ordered conversation.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub settings: GenerationSettings,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>, settings: GenerationSettings) -> Self {
        Self { messages, settings }
    }

    /// System messages joined by blank lines, for APIs that take the
    /// system prompt out of band.
    pub(crate) fn system_prompt(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == crate::types::Role::System)
            .map(|m| m.content.as_str())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }
}

/// Raw output of a provider stream, before normalization into
/// [`crate::StreamEvent`]s.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderChunk {
    Delta(String),
    Finish(FinishReason),
    Usage(Usage),
}

/// Trait for AI provider implementations.
///
/// One instance is bound to one model and one endpoint; it is built per
/// request by [`crate::ProviderFactory`] and dropped afterwards.
#[async_trait]
pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn model_id(&self) -> &str;

    /// Stream a chat completion. Nothing is sent until the stream is polled.
    fn stream(&self, request: &ChatRequest) -> BoxStream<'static, Result<ProviderChunk, ProviderError>>;

    /// Execute a chat completion (non-streaming).
    async fn chat(&self, request: &ChatRequest) -> Result<CompletionResult, ProviderError>;
}
