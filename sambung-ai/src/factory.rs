//! Build request-scoped provider clients from a [`ProviderConfig`].

use crate::auth::sniff::ProviderDefaults;
use crate::error::AppError;
use crate::models::ModelRegistry;
use crate::providers::anthropic::AnthropicProvider;
use crate::providers::base_url::sanitize_base_url;
use crate::providers::compatible::OpenAiCompatibleProvider;
use crate::providers::instrument::Instrumented;
use crate::providers::{ChatRequest, Provider};
use crate::types::{ChatMessage, GenerationSettings, ProviderConfig, ProviderKind};

/// A provider bound to one model, endpoint and credential.
///
/// Built fresh for every request and never reused: credentials may change
/// between calls.
pub struct ResolvedClient {
    provider: Box<dyn Provider>,
    base_url: String,
    settings: GenerationSettings,
}

impl ResolvedClient {
    /// Wrap an already-built provider, e.g. a test double.
    pub fn new(provider: Box<dyn Provider>, base_url: impl Into<String>, settings: GenerationSettings) -> Self {
        Self {
            provider,
            base_url: base_url.into(),
            settings,
        }
    }

    pub fn kind(&self) -> ProviderKind {
        self.provider.kind()
    }

    pub fn model_id(&self) -> &str {
        self.provider.model_id()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    pub(crate) fn provider(&self) -> &dyn Provider {
        self.provider.as_ref()
    }

    pub(crate) fn request(&self, messages: Vec<ChatMessage>) -> ChatRequest {
        ChatRequest::new(messages, self.settings.clone())
    }
}

impl std::fmt::Debug for ResolvedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedClient")
            .field("provider", &self.kind())
            .field("model_id", &self.model_id())
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Turns configurations into [`ResolvedClient`]s.
///
/// Performs no I/O: every failure here is a cheap configuration error
/// raised before any request leaves the process.
#[derive(Debug, Clone, Default)]
pub struct ProviderFactory {
    defaults: ProviderDefaults,
    http: reqwest::Client,
}

impl ProviderFactory {
    pub fn new(defaults: ProviderDefaults) -> Self {
        Self {
            defaults,
            http: reqwest::Client::new(),
        }
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn defaults(&self) -> &ProviderDefaults {
        &self.defaults
    }

    /// Explicit key wins over the process default; blank keys count as absent.
    ///
    /// The process default key is only attached when the request goes to the
    /// process default endpoint. A caller-chosen base URL gets no key unless
    /// the caller supplies one.
    pub fn resolve_api_key(&self, config: &ProviderConfig) -> Option<String> {
        if let Some(key) = config.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            return Some(key.to_string());
        }
        let default_key = self.defaults.api_key(config.provider)?;
        match sanitize_base_url(config.base_url.as_deref()) {
            Some(url) if url != self.default_base_url(config.provider) => {
                tracing::debug!(provider = %config.provider, base_url = %url, "not sending default key to custom endpoint");
                None
            }
            _ => Some(default_key.to_string()),
        }
    }

    /// Explicit base URL, then the process default, then the provider's
    /// public endpoint. Both configured values are sanitized.
    pub fn resolve_base_url(&self, config: &ProviderConfig) -> String {
        sanitize_base_url(config.base_url.as_deref()).unwrap_or_else(|| self.default_base_url(config.provider))
    }

    fn default_base_url(&self, kind: ProviderKind) -> String {
        sanitize_base_url(self.defaults.base_url(kind)).unwrap_or_else(|| kind.default_base_url().to_string())
    }

    pub fn create(&self, config: &ProviderConfig) -> Result<ResolvedClient, AppError> {
        let kind = config.provider;
        let model_id = match config.model_id.trim() {
            "" => ModelRegistry::default_model(kind),
            id => id,
        };
        let api_key = self.resolve_api_key(config);
        let base_url = self.resolve_base_url(config);

        let provider: Box<dyn Provider> = match kind {
            ProviderKind::OpenAi
            | ProviderKind::Groq
            | ProviderKind::Ollama
            | ProviderKind::OpenRouter
            | ProviderKind::Custom => Box::new(OpenAiCompatibleProvider::new(
                kind,
                model_id,
                &base_url,
                api_key.as_deref(),
                self.http.clone(),
            )),
            ProviderKind::Anthropic => {
                let key = api_key.ok_or_else(|| {
                    AppError::configuration(
                        "Anthropic API key is required. Set ANTHROPIC_API_KEY environment variable \
                         or provide apiKey in config.",
                    )
                })?;
                Box::new(AnthropicProvider::new(model_id, &base_url, &key, self.http.clone()))
            }
            ProviderKind::Google => self.google(model_id, &base_url, api_key)?,
        };

        tracing::debug!(provider = %kind, model = model_id, base_url = %base_url, "resolved client");
        Ok(ResolvedClient::new(
            Box::new(Instrumented::new(provider)),
            base_url,
            config.settings.clone().unwrap_or_default(),
        ))
    }

    #[cfg(feature = "google")]
    fn google(&self, model_id: &str, base_url: &str, api_key: Option<String>) -> Result<Box<dyn Provider>, AppError> {
        use crate::providers::google::GoogleProvider;

        let key = api_key.ok_or_else(|| {
            AppError::configuration(
                "Google API key is required. Set GOOGLE_GENERATIVE_AI_API_KEY environment variable \
                 or provide apiKey in config.",
            )
        })?;
        Ok(Box::new(GoogleProvider::new(model_id, base_url, &key, self.http.clone())))
    }

    #[cfg(not(feature = "google"))]
    fn google(&self, _model_id: &str, _base_url: &str, _api_key: Option<String>) -> Result<Box<dyn Provider>, AppError> {
        Err(google_unavailable())
    }
}

#[cfg_attr(feature = "google", allow(dead_code))]
fn google_unavailable() -> AppError {
    AppError::unavailable("Google provider support is not compiled in. Rebuild with the `google` feature enabled.")
}
