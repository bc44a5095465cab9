use crate::auth::sniff::ProviderDefaults;
use crate::auth::store::{CredentialStore, NoCredentials};
use crate::error::AppError;
use crate::factory::{ProviderFactory, ResolvedClient};
use crate::models::ModelRegistry;
use crate::stream::{self, ChatStream};
use crate::translate::ErrorTranslator;
use crate::types::*;
use crate::validate::ParameterValidator;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Run one non-streaming completion.
///
/// Either the full result or a translated error; partial text never leaks
/// on failure. No retries.
pub async fn complete(client: &ResolvedClient, messages: Vec<ChatMessage>) -> Result<CompletionResult, AppError> {
    let request = client.request(messages);
    client.provider().chat(&request).await.map_err(|e| {
        let error = ErrorTranslator::new(client.kind(), client.model_id()).translate(&e);
        tracing::warn!(
            provider = %client.kind(),
            model = client.model_id(),
            kind = ?error.kind,
            cause = %e,
            "completion failed"
        );
        error
    })
}

/// Answer of [`ChatClient::validate_model`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelValidation {
    /// The provider has usable credentials for this user.
    pub configured: bool,
    /// Catalogue entry, if the model is known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<ModelInfo>,
}

/// Request-facing entry point: validates input, resolves per-user
/// credentials and dispatches to a fresh [`ResolvedClient`] per call.
#[derive(Clone)]
pub struct ChatClient {
    factory: ProviderFactory,
    store: Arc<dyn CredentialStore>,
}

impl ChatClient {
    pub fn builder() -> ChatClientBuilder {
        ChatClientBuilder::new()
    }

    pub fn factory(&self) -> &ProviderFactory {
        &self.factory
    }

    async fn stored_key(&self, user_id: &str, provider: ProviderKind) -> Result<Option<String>, AppError> {
        let key = self.store.api_key(user_id, provider).await?;
        Ok(key.filter(|k| !k.trim().is_empty()))
    }

    /// Validate and resolve everything needed for one request. Fails before
    /// any network I/O.
    pub async fn prepare(
        &self,
        user_id: &str,
        config: &ProviderConfig,
        messages: &[ChatMessage],
    ) -> Result<ResolvedClient, AppError> {
        ParameterValidator::validate_messages(messages)?;
        let mut config = config.clone();
        if let Some(settings) = &config.settings {
            config.settings = Some(ParameterValidator::validate(config.provider, settings)?);
        }
        let has_explicit_key = config.api_key.as_deref().is_some_and(|k| !k.trim().is_empty());
        if !has_explicit_key {
            config.api_key = self.stored_key(user_id, config.provider).await?;
        }
        self.factory.create(&config)
    }

    pub async fn complete(
        &self,
        user_id: &str,
        config: &ProviderConfig,
        messages: Vec<ChatMessage>,
    ) -> Result<CompletionResult, AppError> {
        let client = self.prepare(user_id, config, &messages).await?;
        complete(&client, messages).await
    }

    /// Validation and configuration errors are returned directly; anything
    /// after that arrives as an `error` event on the stream.
    pub async fn stream(
        &self,
        user_id: &str,
        config: &ProviderConfig,
        messages: Vec<ChatMessage>,
    ) -> Result<ChatStream, AppError> {
        let client = self.prepare(user_id, config, &messages).await?;
        Ok(stream::stream(client, messages))
    }

    /// Catalogue for one provider, or for all of them.
    pub fn list_models(&self, provider: Option<ProviderKind>) -> Vec<ModelInfo> {
        match provider {
            Some(kind) => ModelRegistry::list_for(kind),
            None => ModelRegistry::all(),
        }
    }

    /// Whether `provider` has usable credentials for `user_id`.
    ///
    /// Ollama, OpenRouter and custom endpoints always count as configured:
    /// their keys are optional or supplied per request.
    pub async fn is_provider_configured(&self, user_id: &str, provider: ProviderKind) -> Result<bool, AppError> {
        if matches!(
            provider,
            ProviderKind::Ollama | ProviderKind::OpenRouter | ProviderKind::Custom
        ) {
            return Ok(true);
        }
        if self.factory.defaults().api_key(provider).is_some() {
            return Ok(true);
        }
        Ok(self.stored_key(user_id, provider).await?.is_some())
    }

    pub async fn configured_providers(&self, user_id: &str) -> Result<Vec<ProviderKind>, AppError> {
        let mut out = Vec::new();
        for kind in ProviderKind::ALL {
            if self.is_provider_configured(user_id, kind).await? {
                out.push(kind);
            }
        }
        Ok(out)
    }

    /// Unknown models are not an error: `info` is simply absent.
    pub async fn validate_model(
        &self,
        user_id: &str,
        provider: ProviderKind,
        model_id: &str,
    ) -> Result<ModelValidation, AppError> {
        Ok(ModelValidation {
            configured: self.is_provider_configured(user_id, provider).await?,
            info: ModelRegistry::lookup(provider, model_id),
        })
    }
}

pub struct ChatClientBuilder {
    defaults: Option<ProviderDefaults>,
    store: Arc<dyn CredentialStore>,
    http: Option<reqwest::Client>,
}

impl ChatClientBuilder {
    pub fn new() -> Self {
        Self {
            defaults: None,
            store: Arc::new(NoCredentials),
            http: None,
        }
    }

    /// Process-wide fallbacks. Read from the environment when not set.
    pub fn with_defaults(mut self, defaults: ProviderDefaults) -> Self {
        self.defaults = Some(defaults);
        self
    }

    pub fn with_credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn build(self) -> ChatClient {
        let defaults = self.defaults.unwrap_or_else(ProviderDefaults::from_env);
        let mut factory = ProviderFactory::new(defaults);
        if let Some(http) = self.http {
            factory = factory.with_http_client(http);
        }
        ChatClient {
            factory,
            store: self.store,
        }
    }
}

impl Default for ChatClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::MemoryCredentialStore;
    use crate::error::ErrorKind;
    use crate::providers::ProviderError;
    use crate::providers::testing::ScriptedProvider;
    use std::sync::atomic::Ordering;

    fn chat_client(store: MemoryCredentialStore) -> ChatClient {
        ChatClient::builder()
            .with_defaults(ProviderDefaults::default())
            .with_credential_store(Arc::new(store))
            .build()
    }

    fn hi() -> Vec<ChatMessage> {
        vec![ChatMessage::user("hi")]
    }

    #[tokio::test]
    async fn complete_returns_full_result() {
        let result = CompletionResult {
            text: "Hello".into(),
            finish_reason: FinishReason::Stop,
            usage: Usage::new(2, 1),
        };
        let provider = ScriptedProvider::new(ProviderKind::OpenAi, vec![]).with_chat(Ok(result.clone()));
        let client = ResolvedClient::new(Box::new(provider), "http://test", GenerationSettings::default());
        assert_eq!(complete(&client, hi()).await.unwrap(), result);
    }

    #[tokio::test]
    async fn complete_translates_errors_without_retrying() {
        let provider = ScriptedProvider::new(ProviderKind::Groq, vec![]).with_chat(Err(ProviderError::RateLimited {
            retry_after_ms: None,
            body: "Too Many Requests".into(),
        }));
        let calls = provider.calls.clone();
        let client = ResolvedClient::new(Box::new(provider), "http://test", GenerationSettings::default());
        let err = complete(&client, hi()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::RateLimited);
        assert_eq!(err.details.unwrap().retry_after_seconds, Some(60));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_settings_fail_before_resolution() {
        let client = chat_client(MemoryCredentialStore::new());
        let config = ProviderConfig::new(ProviderKind::Anthropic, "claude-3-5-sonnet-20241022").with_settings(
            GenerationSettings {
                temperature: Some(1.5),
                ..Default::default()
            },
        );
        // Validation runs before the missing-key check.
        let err = client.prepare("u1", &config, &hi()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParameter);
    }

    #[tokio::test]
    async fn empty_messages_are_rejected() {
        let client = chat_client(MemoryCredentialStore::new());
        let config = ProviderConfig::new(ProviderKind::Ollama, "llama3.2");
        let err = client.stream("u1", &config, vec![]).await.unwrap_err();
        assert_eq!(err.details.unwrap().parameter.as_deref(), Some("messages"));
    }

    #[tokio::test]
    async fn stored_key_resolves_anthropic() {
        let config = ProviderConfig::new(ProviderKind::Anthropic, "claude-3-5-sonnet-20241022");

        let without = chat_client(MemoryCredentialStore::new());
        let err = without.prepare("u1", &config, &hi()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);

        let with = chat_client(MemoryCredentialStore::new().with_key("u1", ProviderKind::Anthropic, "sk-ant"));
        let resolved = with.prepare("u1", &config, &hi()).await.unwrap();
        assert_eq!(resolved.kind(), ProviderKind::Anthropic);
        // Keys are per user.
        assert!(with.prepare("u2", &config, &hi()).await.is_err());
    }

    #[tokio::test]
    async fn configured_providers_follow_keys() {
        let client = ChatClient::builder()
            .with_defaults(ProviderDefaults::default().with_api_key(ProviderKind::Groq, "gsk"))
            .with_credential_store(Arc::new(
                MemoryCredentialStore::new().with_key("u1", ProviderKind::OpenAi, "sk-1"),
            ))
            .build();
        let configured = client.configured_providers("u1").await.unwrap();
        assert_eq!(
            configured,
            vec![
                ProviderKind::OpenAi,
                ProviderKind::Groq,
                ProviderKind::Ollama,
                ProviderKind::OpenRouter,
                ProviderKind::Custom,
            ]
        );
        assert!(!client.is_provider_configured("u2", ProviderKind::OpenAi).await.unwrap());
    }

    #[tokio::test]
    async fn validate_model_reports_catalogue_entry() {
        let client = chat_client(MemoryCredentialStore::new());
        let v = client
            .validate_model("u1", ProviderKind::Anthropic, "claude-3-opus-20240229")
            .await
            .unwrap();
        assert!(!v.configured);
        assert_eq!(v.info.unwrap().context_window, 200_000);

        let v = client.validate_model("u1", ProviderKind::Ollama, "brand-new").await.unwrap();
        assert!(v.configured);
        assert!(v.info.is_none());
    }

    #[test]
    fn list_models_filters_by_provider() {
        let client = chat_client(MemoryCredentialStore::new());
        let groq = client.list_models(Some(ProviderKind::Groq));
        assert!(groq.iter().all(|m| m.provider == ProviderKind::Groq));
        assert!(client.list_models(None).len() > groq.len());
    }
}
