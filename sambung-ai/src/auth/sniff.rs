use crate::types::ProviderKind;
use std::collections::HashMap;

/// Optional fallback credentials and endpoint for one provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderDefault {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

/// Environment variables read per provider: API key candidates in
/// priority order, then the base URL variable.
fn provider_env_candidates(kind: ProviderKind) -> (&'static [&'static str], Option<&'static str>) {
    match kind {
        ProviderKind::OpenAi => (&["OPENAI_API_KEY"], Some("OPENAI_BASE_URL")),
        ProviderKind::Anthropic => (&["ANTHROPIC_API_KEY"], Some("ANTHROPIC_BASE_URL")),
        ProviderKind::Google => (&["GOOGLE_GENERATIVE_AI_API_KEY", "GOOGLE_API_KEY"], None),
        ProviderKind::Groq => (&["GROQ_API_KEY"], Some("GROQ_BASE_URL")),
        ProviderKind::Ollama => (&[], Some("OLLAMA_BASE_URL")),
        ProviderKind::OpenRouter => (&["OPENROUTER_API_KEY"], Some("OPENROUTER_BASE_URL")),
        // Custom endpoints borrow the OpenAI defaults, see `ProviderDefaults::get`.
        ProviderKind::Custom => (&[], None),
    }
}

/// Process-wide fallback API keys and base URLs, read once at startup.
///
/// Values that are empty after trimming count as absent.
#[derive(Debug, Clone, Default)]
pub struct ProviderDefaults {
    entries: HashMap<ProviderKind, ProviderDefault>,
}

impl ProviderDefaults {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the table from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut entries = HashMap::new();
        for kind in ProviderKind::ALL {
            let (key_vars, base_var) = provider_env_candidates(kind);
            let entry = ProviderDefault {
                api_key: key_vars.iter().find_map(|v| read(v)),
                base_url: base_var.and_then(read),
            };
            if entry != ProviderDefault::default() {
                tracing::debug!(
                    provider = %kind,
                    has_key = entry.api_key.is_some(),
                    has_base_url = entry.base_url.is_some(),
                    "found environment defaults"
                );
                entries.insert(kind, entry);
            }
        }
        Self { entries }
    }

    pub fn with_api_key(mut self, kind: ProviderKind, key: impl Into<String>) -> Self {
        self.entries.entry(kind).or_default().api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, kind: ProviderKind, url: impl Into<String>) -> Self {
        self.entries.entry(kind).or_default().base_url = Some(url.into());
        self
    }

    /// Defaults for `kind`; `custom` resolves to the OpenAI entry.
    pub fn get(&self, kind: ProviderKind) -> Option<&ProviderDefault> {
        let kind = match kind {
            ProviderKind::Custom => ProviderKind::OpenAi,
            other => other,
        };
        self.entries.get(&kind)
    }

    pub fn api_key(&self, kind: ProviderKind) -> Option<&str> {
        self.get(kind).and_then(|d| d.api_key.as_deref())
    }

    pub fn base_url(&self, kind: ProviderKind) -> Option<&str> {
        self.get(kind).and_then(|d| d.base_url.as_deref())
    }
}
