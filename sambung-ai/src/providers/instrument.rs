use super::{ChatRequest, Provider, ProviderChunk, ProviderError};
use crate::types::{CompletionResult, ProviderKind};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::time::Instant;
use tracing::{Instrument, Span};

/// Wraps a provider so every request runs under a span carrying the
/// provider, model and a fresh request id.
pub struct Instrumented {
    inner: Box<dyn Provider>,
}

impl Instrumented {
    pub fn new(inner: Box<dyn Provider>) -> Self {
        Self { inner }
    }

    fn span(&self, op: &'static str) -> Span {
        tracing::debug_span!(
            "provider_request",
            op,
            provider = %self.inner.kind(),
            model = %self.inner.model_id(),
            request_id = %uuid::Uuid::new_v4(),
        )
    }
}

#[async_trait]
impl Provider for Instrumented {
    fn kind(&self) -> ProviderKind {
        self.inner.kind()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn stream(&self, request: &ChatRequest) -> BoxStream<'static, Result<ProviderChunk, ProviderError>> {
        let span = self.span("stream");
        let mut inner = span.in_scope(|| self.inner.stream(request));

        let s = async_stream::stream! {
            let started = Instant::now();
            let mut chunks = 0usize;
            while let Some(item) = inner.next().instrument(span.clone()).await {
                span.in_scope(|| match &item {
                    Ok(chunk) => {
                        chunks += 1;
                        tracing::trace!(?chunk, "chunk");
                    }
                    Err(e) => tracing::debug!(error = %e, "stream failed"),
                });
                yield item;
            }
            span.in_scope(|| {
                tracing::debug!(chunks, elapsed_ms = started.elapsed().as_millis() as u64, "stream ended")
            });
        };
        Box::pin(s)
    }

    async fn chat(&self, request: &ChatRequest) -> Result<CompletionResult, ProviderError> {
        let span = self.span("chat");
        async {
            let started = Instant::now();
            let result = self.inner.chat(request).await;
            match &result {
                Ok(r) => tracing::debug!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    total_tokens = r.usage.total_tokens,
                    "completion finished"
                ),
                Err(e) => tracing::debug!(error = %e, "completion failed"),
            }
            result
        }
        .instrument(span)
        .await
    }
}
