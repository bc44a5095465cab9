use crate::error::{AppError, ErrorDetails, ErrorKind};
use crate::types::{ChatMessage, GenerationSettings, ProviderKind};

/// Inclusive bounds for one numeric setting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

const fn bounds(min: f64, max: f64) -> Bounds {
    Bounds { min, max }
}

/// Accepted ranges for every generation setting of one provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterRanges {
    pub temperature: Bounds,
    pub max_tokens: Bounds,
    pub top_p: Bounds,
    pub top_k: Bounds,
    pub frequency_penalty: Bounds,
    pub presence_penalty: Bounds,
}

const ANTHROPIC_RANGES: ParameterRanges = ParameterRanges {
    temperature: bounds(0.0, 1.0),
    max_tokens: bounds(1.0, 8192.0),
    top_p: bounds(0.0, 1.0),
    top_k: bounds(0.0, 40.0),
    frequency_penalty: bounds(-2.0, 2.0),
    presence_penalty: bounds(-2.0, 2.0),
};

const GOOGLE_RANGES: ParameterRanges = ParameterRanges {
    temperature: bounds(0.0, 2.0),
    max_tokens: bounds(1.0, 65536.0),
    top_p: bounds(0.0, 1.0),
    top_k: bounds(1.0, 40.0),
    frequency_penalty: bounds(-2.0, 2.0),
    presence_penalty: bounds(-2.0, 2.0),
};

const DEFAULT_RANGES: ParameterRanges = ParameterRanges {
    temperature: bounds(0.0, 2.0),
    max_tokens: bounds(1.0, 128_000.0),
    top_p: bounds(0.0, 1.0),
    top_k: bounds(0.0, 100.0),
    frequency_penalty: bounds(-2.0, 2.0),
    presence_penalty: bounds(-2.0, 2.0),
};

/// Checks generation settings against per-provider ranges before dispatch.
///
/// Validation is fail-fast: the first out-of-range field is reported and the
/// remaining fields are not inspected. Absent fields are never validated.
pub struct ParameterValidator;

impl ParameterValidator {
    pub fn ranges(provider: ProviderKind) -> &'static ParameterRanges {
        match provider {
            ProviderKind::Anthropic => &ANTHROPIC_RANGES,
            ProviderKind::Google => &GOOGLE_RANGES,
            ProviderKind::OpenAi
            | ProviderKind::Groq
            | ProviderKind::Ollama
            | ProviderKind::OpenRouter
            | ProviderKind::Custom => &DEFAULT_RANGES,
        }
    }

    pub fn validate(
        provider: ProviderKind,
        settings: &GenerationSettings,
    ) -> Result<GenerationSettings, AppError> {
        let ranges = Self::ranges(provider);
        let checks = [
            ("temperature", settings.temperature, ranges.temperature),
            ("maxTokens", settings.max_tokens.map(f64::from), ranges.max_tokens),
            ("topP", settings.top_p, ranges.top_p),
            ("topK", settings.top_k.map(f64::from), ranges.top_k),
            ("frequencyPenalty", settings.frequency_penalty, ranges.frequency_penalty),
            ("presencePenalty", settings.presence_penalty, ranges.presence_penalty),
        ];

        for (name, value, range) in checks {
            let Some(value) = value else { continue };
            if !value.is_finite() || value < range.min || value > range.max {
                return Err(AppError::invalid_parameter(name, range.min, range.max, value)
                    .with_provider(provider));
            }
        }

        Ok(settings.clone())
    }

    /// A request needs at least one message.
    pub fn validate_messages(messages: &[ChatMessage]) -> Result<(), AppError> {
        if messages.is_empty() {
            return Err(AppError::new(
                ErrorKind::InvalidParameter,
                "At least one message is required",
            )
            .with_details(ErrorDetails {
                parameter: Some("messages".into()),
                min: Some(1.0),
                provided: Some(0.0),
                ..Default::default()
            }));
        }
        Ok(())
    }
}
