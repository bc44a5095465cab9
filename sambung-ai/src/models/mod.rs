pub mod static_models;

use crate::types::{ModelInfo, ProviderKind};

pub use static_models::{all_static_models, static_models_for_provider};

/// Read-only catalogue of known models per provider.
///
/// Populated from the static tables in [`static_models`]. A miss in
/// [`ModelRegistry::lookup`] is a soft signal only: providers ship models
/// faster than this table is updated, so unknown ids are never rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelRegistry;

impl ModelRegistry {
    pub fn lookup(provider: ProviderKind, model_id: &str) -> Option<ModelInfo> {
        static_models_for_provider(provider)
            .into_iter()
            .find(|m| m.id == model_id)
    }

    pub fn list_for(provider: ProviderKind) -> Vec<ModelInfo> {
        static_models_for_provider(provider)
    }

    pub fn all() -> Vec<ModelInfo> {
        all_static_models()
    }

    /// Ids of the supported models, used as `availableModels` hints.
    ///
    /// Custom endpoints have no catalogue of their own; they speak the
    /// OpenAI protocol, so the OpenAI ids are offered instead.
    pub fn available_ids(provider: ProviderKind) -> Vec<String> {
        let catalogue = match provider {
            ProviderKind::Custom => static_models_for_provider(ProviderKind::OpenAi),
            other => static_models_for_provider(other),
        };
        let ids: Vec<String> = catalogue.into_iter().filter(|m| m.supported).map(|m| m.id).collect();
        if ids.is_empty() {
            vec![Self::default_model(provider).to_string()]
        } else {
            ids
        }
    }

    pub fn default_model(provider: ProviderKind) -> &'static str {
        match provider {
            ProviderKind::OpenAi => "gpt-4o-mini",
            ProviderKind::Anthropic => "claude-3-5-sonnet-20241022",
            ProviderKind::Google => "gemini-2.5-flash",
            ProviderKind::Groq => "llama-3.3-70b-versatile",
            ProviderKind::Ollama => "llama3.2",
            ProviderKind::OpenRouter => "openai/gpt-4o-mini",
            ProviderKind::Custom => "custom-model",
        }
    }

    /// Context window used when the model itself is not catalogued.
    pub fn default_context_window(provider: ProviderKind) -> u64 {
        match provider {
            ProviderKind::Anthropic => 200_000,
            ProviderKind::Google => 1_048_576,
            ProviderKind::Groq => 131_072,
            ProviderKind::Ollama => 8_192,
            ProviderKind::OpenAi | ProviderKind::OpenRouter | ProviderKind::Custom => 128_000,
        }
    }

    /// Context window of `model_id`, falling back to the provider default.
    pub fn context_window(provider: ProviderKind, model_id: &str) -> u64 {
        Self::lookup(provider, model_id)
            .map(|m| m.context_window)
            .unwrap_or_else(|| Self::default_context_window(provider))
    }
}
