//! Streaming completions as an ordered, finite sequence of [`StreamEvent`]s.

use crate::factory::ResolvedClient;
use crate::providers::ProviderChunk;
use crate::translate::ErrorTranslator;
use crate::types::{ChatMessage, StreamEvent};
use futures::stream::{BoxStream, FusedStream, Stream, StreamExt};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Lifecycle of a [`ChatStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Created, nothing requested yet.
    Idle,
    Streaming,
    Finished,
    Errored,
}

impl StreamState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamState::Finished | StreamState::Errored)
    }
}

pin_project! {
    /// Events of one streamed completion.
    ///
    /// Ends with exactly one `finish` or `error` event and yields nothing
    /// afterwards. Dropping it aborts the underlying HTTP request.
    pub struct ChatStream {
        #[pin]
        events: BoxStream<'static, StreamEvent>,
        state: StreamState,
    }
}

impl ChatStream {
    pub fn new(events: BoxStream<'static, StreamEvent>) -> Self {
        Self {
            events,
            state: StreamState::Idle,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }
}

impl std::fmt::Debug for ChatStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatStream").field("state", &self.state).finish_non_exhaustive()
    }
}

impl Stream for ChatStream {
    type Item = StreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<StreamEvent>> {
        let this = self.project();
        if this.state.is_terminal() {
            return Poll::Ready(None);
        }
        if *this.state == StreamState::Idle {
            *this.state = StreamState::Streaming;
        }
        match this.events.poll_next(cx) {
            Poll::Ready(Some(event)) => {
                *this.state = match &event {
                    StreamEvent::Delta { .. } => StreamState::Streaming,
                    StreamEvent::Finish { .. } => StreamState::Finished,
                    StreamEvent::Error { .. } => StreamState::Errored,
                };
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                *this.state = StreamState::Finished;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl FusedStream for ChatStream {
    fn is_terminated(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Stream a completion from `client`.
///
/// Nothing is sent until the first poll. Provider chunks become `delta`
/// events in arrival order; finish reason and usage are collected along
/// the way and emitted once the transport ends, with defaults when the
/// provider never sent them. A transport or provider failure becomes a
/// single translated `error` event. No retries.
pub fn stream(client: ResolvedClient, messages: Vec<ChatMessage>) -> ChatStream {
    let events = async_stream::stream! {
        let translator = ErrorTranslator::new(client.kind(), client.model_id());
        let request = client.request(messages);
        let mut chunks = client.provider().stream(&request);

        let mut finish_reason = None;
        let mut usage = None;
        while let Some(item) = chunks.next().await {
            match item {
                Ok(ProviderChunk::Delta(text)) => {
                    if !text.is_empty() {
                        yield StreamEvent::Delta { text };
                    }
                }
                Ok(ProviderChunk::Finish(reason)) => finish_reason = Some(reason),
                Ok(ProviderChunk::Usage(u)) => usage = Some(u),
                Err(e) => {
                    let error = translator.translate(&e);
                    tracing::warn!(
                        provider = %client.kind(),
                        model = client.model_id(),
                        kind = ?error.kind,
                        cause = %e,
                        "stream failed"
                    );
                    yield StreamEvent::Error { error };
                    return;
                }
            }
        }

        if finish_reason.is_none() || usage.is_none() {
            tracing::debug!(
                has_finish_reason = finish_reason.is_some(),
                has_usage = usage.is_some(),
                "stream ended without full metadata, using defaults"
            );
        }
        yield StreamEvent::Finish {
            finish_reason: finish_reason.unwrap_or_default(),
            usage: usage.unwrap_or_default(),
        };
    };
    ChatStream::new(events.boxed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::providers::ProviderError;
    use crate::providers::testing::ScriptedProvider;
    use crate::types::{FinishReason, GenerationSettings, ProviderKind, Usage};
    use std::sync::atomic::Ordering;

    fn client(provider: ScriptedProvider) -> ResolvedClient {
        ResolvedClient::new(Box::new(provider), "http://test", GenerationSettings::default())
    }

    fn delta(t: &str) -> Result<ProviderChunk, ProviderError> {
        Ok(ProviderChunk::Delta(t.into()))
    }

    #[tokio::test]
    async fn deltas_keep_order_then_finish() {
        let provider = ScriptedProvider::new(
            ProviderKind::OpenAi,
            vec![
                delta("Hel"),
                delta(""),
                delta("lo"),
                delta("lo"),
                Ok(ProviderChunk::Finish(FinishReason::Stop)),
                Ok(ProviderChunk::Usage(Usage::new(5, 3))),
            ],
        );
        let events: Vec<_> = stream(client(provider), vec![ChatMessage::user("hi")]).collect().await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Delta { text: "Hel".into() },
                StreamEvent::Delta { text: "lo".into() },
                StreamEvent::Delta { text: "lo".into() },
                StreamEvent::Finish {
                    finish_reason: FinishReason::Stop,
                    usage: Usage::new(5, 3),
                },
            ]
        );
    }

    #[tokio::test]
    async fn missing_metadata_still_finishes() {
        let provider = ScriptedProvider::new(ProviderKind::Ollama, vec![delta("x")]);
        let events: Vec<_> = stream(client(provider), vec![ChatMessage::user("hi")]).collect().await;
        assert_eq!(
            events.last(),
            Some(&StreamEvent::Finish {
                finish_reason: FinishReason::Stop,
                usage: Usage::default(),
            })
        );
    }

    #[tokio::test]
    async fn error_is_terminal_and_exclusive() {
        let provider = ScriptedProvider::new(
            ProviderKind::Anthropic,
            vec![
                delta("partial"),
                Err(ProviderError::Http {
                    status: 401,
                    body: "invalid x-api-key".into(),
                }),
                delta("never"),
            ],
        );
        let mut s = stream(client(provider), vec![ChatMessage::user("hi")]);
        assert_eq!(s.state(), StreamState::Idle);

        assert_eq!(s.next().await, Some(StreamEvent::Delta { text: "partial".into() }));
        assert_eq!(s.state(), StreamState::Streaming);

        match s.next().await {
            Some(StreamEvent::Error { error }) => assert_eq!(error.kind, ErrorKind::AuthenticationFailed),
            other => panic!("expected error event, got {other:?}"),
        }
        assert_eq!(s.state(), StreamState::Errored);
        assert!(s.is_terminated());
        assert_eq!(s.next().await, None);
    }

    #[tokio::test]
    async fn exactly_one_terminal_event() {
        for script in [
            vec![delta("a"), Ok(ProviderChunk::Finish(FinishReason::Length))],
            vec![Err(ProviderError::Other("boom".into()))],
            vec![],
        ] {
            let provider = ScriptedProvider::new(ProviderKind::Groq, script);
            let events: Vec<_> = stream(client(provider), vec![ChatMessage::user("hi")]).collect().await;
            let terminals = events.iter().filter(|e| e.is_terminal()).count();
            assert_eq!(terminals, 1, "{events:?}");
            assert!(events.last().unwrap().is_terminal());
        }
    }

    #[tokio::test]
    async fn rate_limits_are_not_retried() {
        let provider = ScriptedProvider::new(
            ProviderKind::OpenAi,
            vec![Err(ProviderError::RateLimited {
                retry_after_ms: Some(3_000),
                body: String::new(),
            })],
        );
        let calls = provider.calls.clone();
        let events: Vec<_> = stream(client(provider), vec![ChatMessage::user("hi")]).collect().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        match &events[..] {
            [StreamEvent::Error { error }] => {
                assert_eq!(error.kind, ErrorKind::RateLimited);
                assert_eq!(error.details.as_ref().unwrap().retry_after_seconds, Some(3));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn request_is_lazy() {
        let provider = ScriptedProvider::new(ProviderKind::OpenAi, vec![]);
        let calls = provider.calls.clone();
        let s = stream(client(provider), vec![ChatMessage::user("hi")]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        drop(s);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dropping_the_stream_releases_the_transport() {
        let provider = ScriptedProvider::new(ProviderKind::OpenAi, vec![delta("first")]).hanging();
        let dropped = provider.dropped.clone();
        let mut s = stream(client(provider), vec![ChatMessage::user("hi")]);
        assert_eq!(s.next().await, Some(StreamEvent::Delta { text: "first".into() }));
        assert!(!dropped.load(Ordering::SeqCst));
        drop(s);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn settings_reach_the_provider() {
        let provider = ScriptedProvider::new(ProviderKind::OpenAi, vec![]);
        let seen = provider.last_request.clone();
        let settings = GenerationSettings {
            max_tokens: Some(64),
            ..Default::default()
        };
        let client = ResolvedClient::new(Box::new(provider), "http://test", settings.clone());
        let _: Vec<_> = stream(client, vec![ChatMessage::user("hi")]).collect().await;
        let req = seen.lock().unwrap().clone().unwrap();
        assert_eq!(req.settings, settings);
        assert_eq!(req.messages, vec![ChatMessage::user("hi")]);
    }
}
