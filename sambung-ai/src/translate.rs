//! Classify provider failures into the closed [`ErrorKind`] taxonomy.

use crate::error::{AppError, ErrorDetails, ErrorKind};
use crate::models::ModelRegistry;
use crate::providers::ProviderError;
use crate::types::ProviderKind;

pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

const TROUBLESHOOTING: [&str; 4] = [
    "Check your API key configuration in Settings",
    "Verify your network connection",
    "Try selecting a different model",
    "Contact support if the issue persists",
];

/// Maps [`ProviderError`]s for one provider/model pair onto [`AppError`]s.
///
/// Rules are evaluated top to bottom and the first match wins:
/// authentication, rate limit, model not found, context exceeded,
/// content policy, then a generic fallback. Structured HTTP statuses are
/// preferred; without one, standalone status codes in the message text
/// are used instead.
#[derive(Debug, Clone)]
pub struct ErrorTranslator {
    provider: ProviderKind,
    model_id: String,
}

impl ErrorTranslator {
    pub fn new(provider: ProviderKind, model_id: impl Into<String>) -> Self {
        Self {
            provider,
            model_id: model_id.into(),
        }
    }

    pub fn translate(&self, err: &ProviderError) -> AppError {
        let message = err.to_string().to_lowercase();
        let codes = match err.status() {
            Some(status) => vec![status],
            None => status_codes_in(&message),
        };
        let has_code = |c: u16| codes.contains(&c);
        let has_any = |words: &[&str]| words.iter().any(|w| message.contains(w));
        let name = self.provider.display_name();

        let app = if has_code(401)
            || has_code(403)
            || matches!(err, ProviderError::AuthRequired(_))
            || has_any(&[
                "authentication",
                "unauthorized",
                "invalid api key",
                "invalid_api_key",
                "invalid x-api-key",
                "api key not valid",
                "api_key_invalid",
            ])
        {
            AppError::new(
                ErrorKind::AuthenticationFailed,
                format!("Authentication failed. Please check your {name} API key configuration."),
            )
        } else if has_code(429) || has_any(&["rate limit", "rate_limit", "too many requests"]) {
            let secs = retry_after_secs(err).unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            AppError::new(
                ErrorKind::RateLimited,
                format!("Rate limit exceeded. Please wait {secs} seconds before retrying."),
            )
            .with_details(ErrorDetails {
                retry_after_seconds: Some(secs),
                ..Default::default()
            })
        } else if has_code(404) || has_any(&["model not found", "unknown model", "model_not_found"]) {
            AppError::new(
                ErrorKind::ModelNotFound,
                format!(
                    "Model '{}' was not found for {name}. Please choose one of the available models.",
                    self.model_id
                ),
            )
            .with_details(ErrorDetails {
                available_models: Some(ModelRegistry::available_ids(self.provider)),
                ..Default::default()
            })
        } else if is_context_exceeded(&message) {
            let max = ModelRegistry::context_window(self.provider, &self.model_id);
            AppError::new(
                ErrorKind::ContextExceeded,
                format!(
                    "Message too long. The conversation exceeds the {max} token context window. \
                     Please shorten it and try again."
                ),
            )
            .with_details(ErrorDetails {
                max_tokens: Some(max),
                ..Default::default()
            })
        } else if is_content_policy(&message) {
            AppError::new(
                ErrorKind::ContentPolicyViolation,
                format!(
                    "Content policy violation. The request content was flagged by {name} content filters. \
                     Please modify your message and try again."
                ),
            )
        } else {
            AppError::new(
                ErrorKind::Unknown,
                "An error occurred while processing your request. Please try again. If it keeps \
                 happening, check your API key configuration, verify your network connection, try a \
                 different model, or contact support.",
            )
            .with_details(ErrorDetails {
                troubleshooting: Some(TROUBLESHOOTING.iter().map(|s| s.to_string()).collect()),
                ..Default::default()
            })
        };

        app.with_provider(self.provider)
    }
}

/// Standalone 3-digit numbers in the 400..600 range, in order of appearance.
fn status_codes_in(message: &str) -> Vec<u16> {
    message
        .split(|c: char| !c.is_ascii_digit())
        .filter(|w| w.len() == 3)
        .filter_map(|w| w.parse::<u16>().ok())
        .filter(|c| (400..600).contains(c))
        .collect()
}

fn is_context_exceeded(message: &str) -> bool {
    if message.contains("context_length_exceeded") {
        return true;
    }
    message.contains("token")
        && (message.contains("context") || message.contains("too long") || message.contains("exceed"))
}

fn is_content_policy(message: &str) -> bool {
    (message.contains("content") && message.contains("policy"))
        || message.contains("content_filter")
        || message.contains("content filter")
        || message.contains("safety")
}

/// Provider retry hint in whole seconds, rounded up.
///
/// Prefers the `Retry-After` header captured on [`ProviderError::RateLimited`],
/// then hints embedded in the error text (`retry-after: 3`,
/// `Please try again in 1.5s`, `retry in 200ms`).
pub fn retry_after_secs(err: &ProviderError) -> Option<u64> {
    if let ProviderError::RateLimited {
        retry_after_ms: Some(ms),
        ..
    } = err
    {
        return Some(ms.div_ceil(1000).max(1));
    }
    parse_retry_after_ms(&err.to_string()).map(|ms| ms.div_ceil(1000).max(1))
}

/// Extract a retry delay in milliseconds from free-form error text.
///
/// Understands bare seconds (`retry-after: 3`) and unit suffixes, including
/// compounds such as `1m30s` or `1 minute 30 seconds`.
pub fn parse_retry_after_ms(message: &str) -> Option<u64> {
    let lower = message.to_lowercase();
    for prefix in [
        "retry-after:",
        "retry_after:",
        "retry-after ",
        "retry_after ",
        "try again in ",
        "retry in ",
    ] {
        let Some(pos) = lower.find(prefix) else {
            continue;
        };
        if let Some(ms) = parse_duration_ms(lower[pos + prefix.len()..].trim_start()) {
            return Some(ms);
        }
    }
    None
}

fn unit_ms(unit: &str) -> Option<f64> {
    match unit {
        "ms" => Some(1.0),
        "" | "s" | "sec" | "secs" | "second" | "seconds" => Some(1_000.0),
        "m" | "min" | "mins" | "minute" | "minutes" => Some(60_000.0),
        "h" | "hr" | "hrs" | "hour" | "hours" => Some(3_600_000.0),
        _ => None,
    }
}

/// `<number><unit>` components back to back; a bare number is seconds.
fn parse_duration_ms(text: &str) -> Option<u64> {
    let mut rest = text;
    let mut total = 0.0;
    let mut parsed_any = false;
    loop {
        let num_len = rest.find(|c: char| !(c.is_ascii_digit() || c == '.')).unwrap_or(rest.len());
        let Ok(value) = rest[..num_len].parse::<f64>() else {
            break;
        };
        if !value.is_finite() || value < 0.0 {
            break;
        }
        let after = rest[num_len..].trim_start();
        let unit_len = after.find(|c: char| !c.is_ascii_alphabetic()).unwrap_or(after.len());
        parsed_any = true;
        match unit_ms(&after[..unit_len]) {
            Some(scale) if unit_len > 0 => {
                total += value * scale;
                rest = &after[unit_len..];
            }
            // Bare number, or a word that is not a unit: seconds, and stop.
            _ => {
                total += value * 1_000.0;
                break;
            }
        }
        rest = rest.trim_start();
        if !rest.starts_with(|c: char| c.is_ascii_digit()) {
            break;
        }
    }
    parsed_any.then(|| total.ceil() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16, body: &str) -> ProviderError {
        ProviderError::Http {
            status,
            body: body.into(),
        }
    }

    fn anthropic() -> ErrorTranslator {
        ErrorTranslator::new(ProviderKind::Anthropic, "claude-3-5-sonnet-20241022")
    }

    #[test]
    fn auth_by_status_and_keyword() {
        for err in [
            http(401, "{}"),
            http(403, "forbidden"),
            ProviderError::Other("Unauthorized request".into()),
            ProviderError::AuthRequired("no key".into()),
            ProviderError::Stream("authentication_error: invalid x-api-key".into()),
        ] {
            let app = anthropic().translate(&err);
            assert_eq!(app.kind, ErrorKind::AuthenticationFailed, "{err}");
            assert!(app.message.contains("API key"));
            assert_eq!(app.details.unwrap().provider, Some(ProviderKind::Anthropic));
        }
    }

    #[test]
    fn rate_limit_defaults_to_sixty_seconds() {
        let app = anthropic().translate(&ProviderError::RateLimited {
            retry_after_ms: None,
            body: "slow down".into(),
        });
        assert_eq!(app.kind, ErrorKind::RateLimited);
        assert_eq!(app.details.unwrap().retry_after_seconds, Some(60));
    }

    #[test]
    fn rate_limit_uses_header_then_body_hint() {
        let app = anthropic().translate(&ProviderError::RateLimited {
            retry_after_ms: Some(1_500),
            body: "Please try again in 30s".into(),
        });
        assert_eq!(app.details.unwrap().retry_after_seconds, Some(2));

        let app = anthropic().translate(&ProviderError::RateLimited {
            retry_after_ms: None,
            body: "Rate limit reached. Please try again in 7.2s.".into(),
        });
        assert_eq!(app.details.unwrap().retry_after_seconds, Some(8));

        let app = anthropic().translate(&ProviderError::Stream("Rate limit reached".into()));
        assert_eq!(app.kind, ErrorKind::RateLimited);
    }

    #[test]
    fn model_not_found_lists_available_models() {
        let app = anthropic().translate(&http(404, "not_found_error: model: claude-9"));
        assert_eq!(app.kind, ErrorKind::ModelNotFound);
        let models = app.details.unwrap().available_models.unwrap();
        assert!(models.len() >= 5);
        assert!(models.iter().any(|m| m == "claude-3-haiku-20240307"));
    }

    #[test]
    fn context_exceeded_reports_window() {
        let app = anthropic().translate(&http(
            400,
            "invalid_request_error: prompt is too long: 210000 tokens > 200000 maximum",
        ));
        assert_eq!(app.kind, ErrorKind::ContextExceeded);
        assert_eq!(app.details.unwrap().max_tokens, Some(200_000));

        let openai = ErrorTranslator::new(ProviderKind::OpenAi, "gpt-3.5-turbo");
        let app = openai.translate(&http(400, r#"{"error":{"code":"context_length_exceeded"}}"#));
        assert_eq!(app.details.unwrap().max_tokens, Some(16_385));
    }

    #[test]
    fn unknown_model_context_falls_back_to_provider_default() {
        let t = ErrorTranslator::new(ProviderKind::Ollama, "my-local-model");
        let app = t.translate(&ProviderError::Other("input exceeds context window of 8192 tokens".into()));
        assert_eq!(app.details.unwrap().max_tokens, Some(8_192));
    }

    #[test]
    fn content_policy_names_provider_filters() {
        let app = anthropic().translate(&http(400, "Output blocked by content filtering policy"));
        assert_eq!(app.kind, ErrorKind::ContentPolicyViolation);
        assert!(app.message.contains("Anthropic content filters"));
    }

    #[test]
    fn first_rule_wins_on_overlap() {
        // 404 mentioning context and tokens is still a missing model.
        let app = anthropic().translate(&http(404, "model context tokens"));
        assert_eq!(app.kind, ErrorKind::ModelNotFound);
        // 401 mentioning rate limits is still an auth failure.
        let app = anthropic().translate(&http(401, "rate limit"));
        assert_eq!(app.kind, ErrorKind::AuthenticationFailed);
    }

    #[test]
    fn status_scan_only_without_structured_status() {
        let app = anthropic().translate(&ProviderError::Other("upstream returned 429".into()));
        assert_eq!(app.kind, ErrorKind::RateLimited);
        // A 500 whose body mentions "401" is not an auth failure.
        let app = anthropic().translate(&http(500, "see docs section 401"));
        assert_eq!(app.kind, ErrorKind::Unknown);
    }

    #[test]
    fn fallback_has_troubleshooting_and_no_raw_text() {
        let app = anthropic().translate(&http(500, "panicked at src/main.rs:10"));
        assert_eq!(app.kind, ErrorKind::Unknown);
        assert!(!app.message.contains("panicked"));
        assert_eq!(app.details.unwrap().troubleshooting.unwrap().len(), 4);
    }

    #[test]
    fn parse_retry_after_variants() {
        assert_eq!(parse_retry_after_ms("Retry-After: 3"), Some(3_000));
        assert_eq!(parse_retry_after_ms("retry_after 0.5"), Some(500));
        assert_eq!(parse_retry_after_ms("Please retry in 200ms"), Some(200));
        assert_eq!(parse_retry_after_ms("no hint here"), None);
        assert_eq!(parse_retry_after_ms("try again in a moment"), None);
    }

    #[test]
    fn parse_retry_after_compound_durations() {
        assert_eq!(parse_retry_after_ms("Please try again in 1m30s."), Some(90_000));
        assert_eq!(parse_retry_after_ms("try again in 2h5m"), Some(7_500_000));
        assert_eq!(parse_retry_after_ms("try again in 1 minute 30 seconds"), Some(90_000));
        assert_eq!(parse_retry_after_ms("retry in 2 minutes"), Some(120_000));
        assert_eq!(parse_retry_after_ms("try again in 1.5s"), Some(1_500));
        assert_eq!(
            retry_after_secs(&ProviderError::Other("Rate limit reached. Please try again in 1m30s.".into())),
            Some(90)
        );
    }

    #[test]
    fn gemini_invalid_key_is_an_auth_failure() {
        let google = ErrorTranslator::new(ProviderKind::Google, "gemini-2.5-flash");
        for body in [
            "API key not valid. Please pass a valid API key.",
            r#"{"error":{"status":"INVALID_ARGUMENT","details":[{"reason":"API_KEY_INVALID"}]}}"#,
        ] {
            let app = google.translate(&http(400, body));
            assert_eq!(app.kind, ErrorKind::AuthenticationFailed, "{body}");
        }
    }

    #[test]
    fn custom_model_not_found_still_suggests_models() {
        let custom = ErrorTranslator::new(ProviderKind::Custom, "my-model");
        let app = custom.translate(&http(404, "The model `my-model` does not exist"));
        assert_eq!(app.kind, ErrorKind::ModelNotFound);
        let models = app.details.unwrap().available_models.unwrap();
        assert!(!models.is_empty());
        assert!(models.iter().any(|m| m == "gpt-4o-mini"));
    }

    #[test]
    fn status_codes_are_standalone_numbers() {
        assert_eq!(status_codes_in("error 404: not found"), vec![404]);
        assert!(status_codes_in("id 4041 and 12 and 200").is_empty());
    }
}
