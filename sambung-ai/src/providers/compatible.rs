//! OpenAI-compatible `/chat/completions` client.
//!
//! Serves OpenAI itself plus every backend that speaks the same wire
//! format: Groq, Ollama, OpenRouter and custom endpoints.

use super::base_url::join_endpoint;
use super::{ChatRequest, Provider, ProviderChunk, ProviderError, sanitize, sse};
use crate::types::*;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub struct OpenAiCompatibleProvider {
    kind: ProviderKind,
    model_id: String,
    base_url: String,
    /// Sent as a bearer token when present. Local servers run without one.
    api_key: Option<String>,
    client: Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        kind: ProviderKind,
        model_id: &str,
        base_url: &str,
        api_key: Option<&str>,
        client: Client,
    ) -> Self {
        Self {
            kind,
            model_id: model_id.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(String::from),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn chat_completions_url(&self) -> String {
        join_endpoint(&self.base_url, &["chat", "completions"], &[])
    }

    fn post(&self, body: &WireRequest<'_>) -> reqwest::RequestBuilder {
        let req = self.client.post(self.chat_completions_url()).json(body);
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    fn supports_top_k(&self) -> bool {
        matches!(self.kind, ProviderKind::Ollama | ProviderKind::OpenRouter)
    }

    fn build_body<'a>(&'a self, request: &'a ChatRequest, stream: bool) -> WireRequest<'a> {
        let s = &request.settings;
        WireRequest {
            model: &self.model_id,
            messages: request
                .messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            temperature: s.temperature,
            max_tokens: s.max_tokens,
            top_p: s.top_p,
            top_k: s.top_k.filter(|_| self.supports_top_k()),
            frequency_penalty: s.frequency_penalty,
            presence_penalty: s.presence_penalty,
            stream,
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
        }
    }
}

// ---- Request/response types (OpenAI wire format) ----
#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f64>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<UsageResp>,
    /// Groq reports streamed usage here instead of the top level.
    x_groq: Option<GroqExtra>,
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct GroqExtra {
    usage: Option<UsageResp>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: Option<DeltaContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct DeltaContent {
    content: Option<String>,
}

#[derive(Deserialize)]
struct UsageResp {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl From<UsageResp> for Usage {
    fn from(u: UsageResp) -> Self {
        Usage::new(u.prompt_tokens, u.completion_tokens)
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<UsageResp>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResp,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatMessageResp {
    content: Option<String>,
}

/// Decode one `data:` payload of a streaming response.
///
/// Malformed payloads are skipped. An `error` object sent mid-stream is
/// surfaced as [`ProviderError::Stream`].
pub(crate) fn decode_stream_event(data: &str) -> Result<Vec<ProviderChunk>, ProviderError> {
    let Ok(chunk) = serde_json::from_str::<StreamChunk>(data) else {
        tracing::trace!(data, "skipping unparseable stream payload");
        return Ok(Vec::new());
    };
    if let Some(err) = chunk.error {
        let message = err.message.unwrap_or_else(|| "provider reported an error".into());
        return Err(ProviderError::Stream(sanitize::sanitize_api_error(&message)));
    }

    let mut out = Vec::new();
    for choice in chunk.choices {
        if let Some(text) = choice.delta.and_then(|d| d.content).filter(|t| !t.is_empty()) {
            out.push(ProviderChunk::Delta(text));
        }
        if let Some(reason) = choice.finish_reason {
            out.push(ProviderChunk::Finish(FinishReason::from_provider(&reason)));
        }
    }
    if let Some(usage) = chunk.usage.or(chunk.x_groq.and_then(|x| x.usage)) {
        out.push(ProviderChunk::Usage(usage.into()));
    }
    Ok(out)
}

fn parse_chat_response(resp: ChatResponse) -> Result<CompletionResult, ProviderError> {
    let usage = resp.usage.map(Usage::from).unwrap_or_default();
    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Other("Empty response".into()))?;
    Ok(CompletionResult {
        text: choice.message.content.unwrap_or_default(),
        finish_reason: choice
            .finish_reason
            .as_deref()
            .map(FinishReason::from_provider)
            .unwrap_or_default(),
        usage,
    })
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn stream(&self, request: &ChatRequest) -> BoxStream<'static, Result<ProviderChunk, ProviderError>> {
        let req = self.post(&self.build_body(request, true));

        let s = async_stream::stream! {
            let resp = match req.send().await {
                Ok(r) => r,
                Err(e) => { yield Err(ProviderError::Network(e)); return; }
            };
            if !resp.status().is_success() {
                yield Err(sanitize::read_error(resp).await);
                return;
            }

            let mut events = sse::events(resp);
            while let Some(event) = events.next().await {
                let event = match event {
                    Ok(ev) => ev,
                    Err(e) => { yield Err(e); return; }
                };
                match decode_stream_event(&event.data) {
                    Ok(chunks) => {
                        for chunk in chunks {
                            yield Ok(chunk);
                        }
                    }
                    Err(e) => { yield Err(e); return; }
                }
            }
        };
        Box::pin(s)
    }

    async fn chat(&self, request: &ChatRequest) -> Result<CompletionResult, ProviderError> {
        let resp = self.post(&self.build_body(request, false)).send().await?;
        if !resp.status().is_success() {
            return Err(sanitize::read_error(resp).await);
        }
        let chat_resp: ChatResponse = resp.json().await?;
        parse_chat_response(chat_resp)
    }
}
