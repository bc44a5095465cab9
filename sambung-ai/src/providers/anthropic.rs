use super::base_url::join_endpoint;
use super::{ChatRequest, Provider, ProviderChunk, ProviderError, sanitize, sse};
use crate::types::*;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};

const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The Messages API requires `max_tokens`; used when the caller sets none.
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicProvider {
    model_id: String,
    base_url: String,
    api_key: String,
    client: Client,
}

impl AnthropicProvider {
    pub fn new(model_id: &str, base_url: &str, api_key: &str, client: Client) -> Self {
        Self {
            model_id: model_id.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
        }
    }

    fn post(&self, body: &MessagesRequest<'_>) -> reqwest::RequestBuilder {
        self.client
            .post(join_endpoint(&self.base_url, &["messages"], &[]))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
    }

    fn build_body<'a>(&'a self, request: &'a ChatRequest, stream: bool) -> MessagesRequest<'a> {
        let s = &request.settings;
        MessagesRequest {
            model: &self.model_id,
            messages: request
                .messages
                .iter()
                .filter(|m| m.role != Role::System)
                .map(|m| AnthropicMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            max_tokens: s.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system: request.system_prompt(),
            temperature: s.temperature,
            top_p: s.top_p,
            top_k: s.top_k,
            stream,
        }
    }
}

// Frequency/presence penalties have no Messages API counterpart and are
// not sent.
#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    stream: bool,
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct StreamEventData {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    delta: Option<DeltaData>,
    #[serde(default)]
    message: Option<MessageData>,
    #[serde(default)]
    usage: Option<UsageData>,
    #[serde(default)]
    error: Option<ErrorData>,
}

#[derive(Deserialize)]
struct DeltaData {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct MessageData {
    #[serde(default)]
    usage: Option<UsageData>,
}

#[derive(Deserialize)]
struct UsageData {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Deserialize)]
struct ErrorData {
    #[serde(rename = "type", default)]
    error_type: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentResp>,
    stop_reason: Option<String>,
    usage: Option<UsageData>,
}

#[derive(Deserialize)]
struct ContentResp {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

/// Incremental decoder for Messages API stream events.
///
/// Input tokens arrive in `message_start`, output tokens and the stop
/// reason in `message_delta`, so the decoder carries the former forward.
#[derive(Debug, Default)]
pub(crate) struct StreamDecoder {
    input_tokens: u64,
}

impl StreamDecoder {
    pub(crate) fn decode(&mut self, data: &str) -> Result<Vec<ProviderChunk>, ProviderError> {
        let Ok(evt) = serde_json::from_str::<StreamEventData>(data) else {
            tracing::trace!(data, "skipping unparseable anthropic event");
            return Ok(Vec::new());
        };

        let mut out = Vec::new();
        match evt.event_type.as_str() {
            "message_start" => {
                if let Some(u) = evt.message.and_then(|m| m.usage) {
                    self.input_tokens = u.input_tokens;
                }
            }
            "content_block_delta" => {
                if let Some(text) = evt.delta.and_then(|d| d.text).filter(|t| !t.is_empty()) {
                    out.push(ProviderChunk::Delta(text));
                }
            }
            "message_delta" => {
                if let Some(reason) = evt.delta.and_then(|d| d.stop_reason) {
                    out.push(ProviderChunk::Finish(FinishReason::from_provider(&reason)));
                }
                if let Some(u) = evt.usage {
                    out.push(ProviderChunk::Usage(Usage::new(self.input_tokens, u.output_tokens)));
                }
            }
            "error" => {
                let err = evt.error.unwrap_or(ErrorData {
                    error_type: None,
                    message: None,
                });
                let message = match (err.error_type, err.message) {
                    (Some(t), Some(m)) => format!("{t}: {m}"),
                    (None, Some(m)) => m,
                    (Some(t), None) => t,
                    (None, None) => "provider reported an error".into(),
                };
                return Err(ProviderError::Stream(sanitize::sanitize_api_error(&message)));
            }
            // ping, content_block_start/stop, message_stop
            _ => {}
        }
        Ok(out)
    }
}

fn parse_messages_response(resp: MessagesResponse) -> CompletionResult {
    let text = resp
        .content
        .into_iter()
        .filter(|b| b.block_type == "text")
        .filter_map(|b| b.text)
        .collect::<String>();
    let usage = resp
        .usage
        .map(|u| Usage::new(u.input_tokens, u.output_tokens))
        .unwrap_or_default();
    CompletionResult {
        text,
        finish_reason: resp
            .stop_reason
            .as_deref()
            .map(FinishReason::from_provider)
            .unwrap_or_default(),
        usage,
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
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

            let mut decoder = StreamDecoder::default();
            let mut events = sse::events(resp);
            while let Some(event) = events.next().await {
                let event = match event {
                    Ok(ev) => ev,
                    Err(e) => { yield Err(e); return; }
                };
                match decoder.decode(&event.data) {
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
        let body: MessagesResponse = resp.json().await?;
        Ok(parse_messages_response(body))
    }
}
