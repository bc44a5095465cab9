//! Gemini API (`generativelanguage.googleapis.com`) client.
//!
//! Only compiled with the `google` feature.

use super::base_url::join_endpoint;
use super::{ChatRequest, Provider, ProviderChunk, ProviderError, sanitize, sse};
use crate::types::*;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub struct GoogleProvider {
    model_id: String,
    base_url: String,
    api_key: String,
    client: Client,
}

impl GoogleProvider {
    pub fn new(model_id: &str, base_url: &str, api_key: &str, client: Client) -> Self {
        Self {
            model_id: model_id.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
        }
    }

    fn url(&self, stream: bool) -> String {
        let model = self.model_id.strip_prefix("models/").unwrap_or(&self.model_id);
        if stream {
            let action = format!("{model}:streamGenerateContent");
            join_endpoint(&self.base_url, &["models", action.as_str()], &[("alt", "sse")])
        } else {
            let action = format!("{model}:generateContent");
            join_endpoint(&self.base_url, &["models", action.as_str()], &[])
        }
    }

    fn post(&self, request: &ChatRequest, stream: bool) -> reqwest::RequestBuilder {
        self.client
            .post(self.url(stream))
            .header("x-goog-api-key", &self.api_key)
            .json(&build_body(request))
    }
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<TextPart<'a>>,
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct SystemInstruction {
    parts: Vec<OwnedTextPart>,
}

#[derive(Serialize)]
struct OwnedTextPart {
    text: String,
}

#[derive(Serialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f64>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    prompt_feedback: Option<PromptFeedback>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
    /// Thought summaries from thinking models are not part of the answer.
    #[serde(default)]
    thought: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    #[serde(default)]
    thoughts_token_count: u64,
}

impl From<UsageMetadata> for Usage {
    fn from(u: UsageMetadata) -> Self {
        Usage::new(u.prompt_token_count, u.candidates_token_count + u.thoughts_token_count)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: Option<String>,
}

fn build_body(request: &ChatRequest) -> GenerateContentRequest<'_> {
    let contents = request
        .messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| Content {
            role: if m.role == Role::Assistant { "model" } else { "user" },
            parts: vec![TextPart { text: &m.content }],
        })
        .collect();
    let s = &request.settings;
    let config = GenerationConfig {
        temperature: s.temperature,
        max_output_tokens: s.max_tokens,
        top_p: s.top_p,
        top_k: s.top_k,
        frequency_penalty: s.frequency_penalty,
        presence_penalty: s.presence_penalty,
    };
    GenerateContentRequest {
        contents,
        system_instruction: request.system_prompt().map(|text| SystemInstruction {
            parts: vec![OwnedTextPart { text }],
        }),
        generation_config: (config != GenerationConfig::default()).then_some(config),
    }
}

fn candidate_text(candidate: &mut Candidate) -> String {
    candidate
        .content
        .take()
        .map(|c| {
            c.parts
                .into_iter()
                .filter(|p| !p.thought)
                .filter_map(|p| p.text)
                .collect()
        })
        .unwrap_or_default()
}

fn api_error(err: ApiError) -> ProviderError {
    let message = sanitize::sanitize_api_error(err.message.as_deref().unwrap_or("provider reported an error"));
    match err.code {
        Some(429) => ProviderError::RateLimited {
            retry_after_ms: None,
            body: message,
        },
        Some(status) => ProviderError::Http { status, body: message },
        None => ProviderError::Stream(message),
    }
}

/// Decode one streamed `GenerateContentResponse`.
pub(crate) fn decode_stream_event(data: &str) -> Result<Vec<ProviderChunk>, ProviderError> {
    let Ok(resp) = serde_json::from_str::<GenerateContentResponse>(data) else {
        tracing::trace!(data, "skipping unparseable gemini payload");
        return Ok(Vec::new());
    };
    if let Some(err) = resp.error {
        return Err(api_error(err));
    }

    let mut out = Vec::new();
    for mut candidate in resp.candidates {
        let text = candidate_text(&mut candidate);
        if !text.is_empty() {
            out.push(ProviderChunk::Delta(text));
        }
        if let Some(reason) = candidate.finish_reason {
            out.push(ProviderChunk::Finish(FinishReason::from_provider(&reason)));
        }
    }
    if resp.prompt_feedback.and_then(|f| f.block_reason).is_some() {
        out.push(ProviderChunk::Finish(FinishReason::ContentFilter));
    }
    // Gemini reports cumulative usage on every chunk; the last one wins.
    if let Some(u) = resp.usage_metadata {
        out.push(ProviderChunk::Usage(u.into()));
    }
    Ok(out)
}

fn parse_response(resp: GenerateContentResponse) -> Result<CompletionResult, ProviderError> {
    if let Some(err) = resp.error {
        return Err(api_error(err));
    }
    let blocked = resp.prompt_feedback.and_then(|f| f.block_reason).is_some();
    let usage = resp.usage_metadata.map(Usage::from).unwrap_or_default();
    let Some(mut candidate) = resp.candidates.into_iter().next() else {
        if blocked {
            return Ok(CompletionResult {
                text: String::new(),
                finish_reason: FinishReason::ContentFilter,
                usage,
            });
        }
        return Err(ProviderError::Other("Empty response".into()));
    };
    Ok(CompletionResult {
        text: candidate_text(&mut candidate),
        finish_reason: candidate
            .finish_reason
            .as_deref()
            .map(FinishReason::from_provider)
            .unwrap_or_default(),
        usage,
    })
}

#[async_trait]
impl Provider for GoogleProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn stream(&self, request: &ChatRequest) -> BoxStream<'static, Result<ProviderChunk, ProviderError>> {
        let req = self.post(request, true);

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
        let resp = self.post(request, false).send().await?;
        if !resp.status().is_success() {
            return Err(sanitize::read_error(resp).await);
        }
        let body: GenerateContentResponse = resp.json().await?;
        parse_response(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> GoogleProvider {
        GoogleProvider::new(
            "gemini-2.5-flash",
            "https://generativelanguage.googleapis.com/v1beta/",
            "AIza-test",
            Client::new(),
        )
    }

    #[test]
    fn urls_and_auth_header() {
        let p = provider();
        assert_eq!(
            p.url(true),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:streamGenerateContent?alt=sse"
        );
        let req = ChatRequest::new(vec![ChatMessage::user("hi")], GenerationSettings::default());
        let built = p.post(&req, false).build().unwrap();
        assert!(built.url().as_str().ends_with("gemini-2.5-flash:generateContent"));
        assert_eq!(built.headers()["x-goog-api-key"], "AIza-test");
    }

    #[test]
    fn body_maps_roles_and_generation_config() {
        let req = ChatRequest::new(
            vec![
                ChatMessage::system("sys"),
                ChatMessage::user("q"),
                ChatMessage::assistant("a"),
            ],
            GenerationSettings {
                max_tokens: Some(100),
                top_k: Some(5),
                ..Default::default()
            },
        );
        let body = serde_json::to_value(build_body(&req)).unwrap();
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "sys");
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 100);
        assert_eq!(body["generationConfig"]["topK"], 5);

        let bare = ChatRequest::new(vec![ChatMessage::user("q")], GenerationSettings::default());
        let body = serde_json::to_value(build_body(&bare)).unwrap();
        assert!(body.get("generationConfig").is_none());
        assert!(body.get("systemInstruction").is_none());
    }

    #[test]
    fn decode_skips_thoughts_and_maps_finish() {
        let chunks = decode_stream_event(
            r#"{"candidates":[{"content":{"parts":[{"text":"hmm","thought":true},{"text":"Hi"}],"role":"model"},
                "finishReason":"MAX_TOKENS"}],
                "usageMetadata":{"promptTokenCount":3,"candidatesTokenCount":5,"totalTokenCount":8}}"#,
        )
        .unwrap();
        assert_eq!(
            chunks,
            vec![
                ProviderChunk::Delta("Hi".into()),
                ProviderChunk::Finish(FinishReason::Length),
                ProviderChunk::Usage(Usage::new(3, 5)),
            ]
        );
    }

    #[test]
    fn blocked_prompt_finishes_with_content_filter() {
        let chunks = decode_stream_event(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        assert_eq!(chunks, vec![ProviderChunk::Finish(FinishReason::ContentFilter)]);
    }

    #[test]
    fn error_payload_keeps_status() {
        let err = decode_stream_event(r#"{"error":{"code":429,"message":"Resource exhausted","status":"RESOURCE_EXHAUSTED"}}"#)
            .unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited { .. }));
    }

    #[test]
    fn empty_candidates_is_an_error() {
        let resp: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert!(parse_response(resp).is_err());
    }
}
