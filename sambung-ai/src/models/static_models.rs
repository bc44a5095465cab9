use crate::types::{CostTier, ModelInfo, ProviderKind};

pub fn all_static_models() -> Vec<ModelInfo> {
    ProviderKind::ALL
        .into_iter()
        .flat_map(static_models_for_provider)
        .collect()
}

pub fn static_models_for_provider(provider: ProviderKind) -> Vec<ModelInfo> {
    match provider {
        ProviderKind::OpenAi => static_openai_models(),
        ProviderKind::Anthropic => static_anthropic_models(),
        ProviderKind::Google => static_google_models(),
        ProviderKind::Groq => static_groq_models(),
        ProviderKind::Ollama => static_ollama_models(),
        ProviderKind::OpenRouter => static_openrouter_models(),
        // Custom endpoints serve whatever the operator deployed.
        ProviderKind::Custom => Vec::new(),
    }
}

fn model(
    provider: ProviderKind,
    id: &str,
    name: &str,
    ctx: u64,
    cost_tier: CostTier,
    best_for: &str,
) -> ModelInfo {
    ModelInfo {
        id: id.into(),
        provider,
        display_name: name.into(),
        context_window: ctx,
        cost_tier,
        best_for: best_for.into(),
        supported: true,
    }
}

/// Still answered by lookups, never offered as a suggestion.
fn retired(info: ModelInfo) -> ModelInfo {
    ModelInfo { supported: false, ..info }
}

pub fn static_openai_models() -> Vec<ModelInfo> {
    let p = ProviderKind::OpenAi;
    vec![
        model(p, "gpt-4o-mini", "GPT-4o Mini", 128_000, CostTier::Low, "General chat, fast responses"),
        model(p, "gpt-4o", "GPT-4o", 128_000, CostTier::Medium, "Complex reasoning, vision, multimodal"),
        model(p, "o1-mini", "o1 Mini", 128_000, CostTier::Medium, "Code, math, logic"),
        retired(model(p, "o1-preview", "o1 Preview", 128_000, CostTier::High, "Complex problem-solving")),
        model(p, "gpt-4-turbo", "GPT-4 Turbo", 128_000, CostTier::Medium, "Legacy GPT-4 tasks"),
        model(p, "gpt-3.5-turbo", "GPT-3.5 Turbo", 16_385, CostTier::Low, "Simple tasks, legacy support"),
    ]
}

pub fn static_anthropic_models() -> Vec<ModelInfo> {
    let p = ProviderKind::Anthropic;
    vec![
        model(p, "claude-3-5-sonnet-20241022", "Claude 3.5 Sonnet", 200_000, CostTier::Medium, "Writing, analysis, code"),
        model(p, "claude-3-5-haiku-20241022", "Claude 3.5 Haiku", 200_000, CostTier::Low, "Fast responses, high volume"),
        model(p, "claude-3-opus-20240229", "Claude 3 Opus", 200_000, CostTier::High, "Deep reasoning, long documents"),
        retired(model(p, "claude-3-sonnet-20240229", "Claude 3 Sonnet", 200_000, CostTier::Medium, "Balanced everyday tasks")),
        model(p, "claude-3-haiku-20240307", "Claude 3 Haiku", 200_000, CostTier::Low, "Simple tasks, low latency"),
    ]
}

pub fn static_google_models() -> Vec<ModelInfo> {
    let p = ProviderKind::Google;
    vec![
        model(p, "gemini-2.5-flash", "Gemini 2.5 Flash", 1_048_576, CostTier::Low, "General chat, long context"),
        model(p, "gemini-2.5-pro", "Gemini 2.5 Pro", 1_048_576, CostTier::High, "Complex reasoning, code"),
        model(p, "gemini-2.0-flash", "Gemini 2.0 Flash", 1_048_576, CostTier::Low, "Fast multimodal tasks"),
        retired(model(p, "gemini-1.5-pro", "Gemini 1.5 Pro", 2_097_152, CostTier::Medium, "Very long documents")),
    ]
}

pub fn static_groq_models() -> Vec<ModelInfo> {
    let p = ProviderKind::Groq;
    vec![
        model(p, "llama-3.3-70b-versatile", "Llama 3.3 70B", 131_072, CostTier::Low, "Fast general chat"),
        model(p, "llama-3.1-8b-instant", "Llama 3.1 8B Instant", 131_072, CostTier::Low, "Lowest latency, simple tasks"),
        retired(model(p, "mixtral-8x7b-32768", "Mixtral 8x7B", 32_768, CostTier::Low, "Multilingual chat")),
    ]
}

pub fn static_ollama_models() -> Vec<ModelInfo> {
    let p = ProviderKind::Ollama;
    vec![
        model(p, "llama3.2", "Llama 3.2", 8_192, CostTier::Free, "Local, private chat"),
        model(p, "qwen2.5-coder", "Qwen 2.5 Coder", 32_768, CostTier::Free, "Local code assistance"),
        model(p, "mistral", "Mistral 7B", 8_192, CostTier::Free, "Local general tasks"),
    ]
}

pub fn static_openrouter_models() -> Vec<ModelInfo> {
    let p = ProviderKind::OpenRouter;
    vec![
        model(p, "openai/gpt-4o-mini", "GPT-4o Mini (OpenRouter)", 128_000, CostTier::Low, "General chat, fast responses"),
        model(p, "anthropic/claude-3.5-sonnet", "Claude 3.5 Sonnet (OpenRouter)", 200_000, CostTier::Medium, "Writing, analysis, code"),
        model(p, "meta-llama/llama-3.3-70b-instruct", "Llama 3.3 70B (OpenRouter)", 131_072, CostTier::Low, "Open-weight general chat"),
    ]
}
