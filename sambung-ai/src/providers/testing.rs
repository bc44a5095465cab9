//! Scripted [`Provider`] doubles for exercising the services offline.

use super::{ChatRequest, Provider, ProviderChunk, ProviderError};
use crate::types::{CompletionResult, ProviderKind};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type Script = Vec<Result<ProviderChunk, ProviderError>>;

/// Replays a fixed chunk script once, counting calls.
pub(crate) struct ScriptedProvider {
    kind: ProviderKind,
    script: Mutex<Option<Script>>,
    chat_result: Mutex<Option<Result<CompletionResult, ProviderError>>>,
    /// Hang after the script instead of ending, to test cancellation.
    hang: bool,
    pub calls: Arc<AtomicUsize>,
    pub dropped: Arc<AtomicBool>,
    pub last_request: Arc<Mutex<Option<ChatRequest>>>,
}

impl ScriptedProvider {
    pub(crate) fn new(kind: ProviderKind, script: Script) -> Self {
        Self {
            kind,
            script: Mutex::new(Some(script)),
            chat_result: Mutex::new(None),
            hang: false,
            calls: Arc::default(),
            dropped: Arc::default(),
            last_request: Arc::default(),
        }
    }

    pub(crate) fn with_chat(self, result: Result<CompletionResult, ProviderError>) -> Self {
        *self.chat_result.lock().unwrap() = Some(result);
        self
    }

    pub(crate) fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn model_id(&self) -> &str {
        "scripted-model"
    }

    fn stream(&self, request: &ChatRequest) -> BoxStream<'static, Result<ProviderChunk, ProviderError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        let script = self.script.lock().unwrap().take().unwrap_or_default();
        let guard = DropFlag(self.dropped.clone());
        let hang = self.hang;
        let s = async_stream::stream! {
            let _guard = guard;
            for item in script {
                yield item;
            }
            if hang {
                futures::future::pending::<()>().await;
            }
        };
        Box::pin(s)
    }

    async fn chat(&self, request: &ChatRequest) -> Result<CompletionResult, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        self.chat_result
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(ProviderError::Other("no scripted result".into())))
    }
}
