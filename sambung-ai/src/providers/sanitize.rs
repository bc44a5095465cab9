//! Turn failed HTTP responses into [`ProviderError`]s without leaking
//! secrets: known key prefixes are redacted and bodies are truncated.

use super::ProviderError;
use reqwest::header::RETRY_AFTER;
use std::time::Duration;

const MAX_API_ERROR_CHARS: usize = 200;
const SECRET_PREFIXES: [&str; 3] = ["sk-", "xoxb-", "xoxp-"];
const REDACTED: &str = "[REDACTED]";

fn is_secret_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')
}

/// Redact tokens that start with a known API key prefix.
pub fn scrub_secret_patterns(input: &str) -> String {
    let mut scrubbed = input.to_string();

    for prefix in SECRET_PREFIXES {
        let mut from = 0;
        while let Some(rel) = scrubbed[from..].find(prefix) {
            let start = from + rel;
            let body_start = start + prefix.len();
            let body_len: usize = scrubbed[body_start..]
                .chars()
                .take_while(|c| is_secret_char(*c))
                .map(char::len_utf8)
                .sum();

            // A bare prefix ("sk-" followed by a space) is not a key.
            if body_len == 0 {
                from = body_start;
                continue;
            }

            scrubbed.replace_range(start..body_start + body_len, REDACTED);
            from = start + REDACTED.len();
        }
    }

    scrubbed
}

/// Scrub secrets, then truncate to a bounded length on a char boundary.
pub fn sanitize_api_error(input: &str) -> String {
    let scrubbed = scrub_secret_patterns(input);
    match scrubbed.char_indices().nth(MAX_API_ERROR_CHARS) {
        Some((cut, _)) => format!("{}...", &scrubbed[..cut]),
        None => scrubbed,
    }
}

/// Parse a `Retry-After` header given in (possibly fractional) seconds.
///
/// HTTP-date values are ignored; callers fall back to a default delay.
pub fn parse_retry_after_header(value: &str) -> Option<u64> {
    let secs: f64 = value.trim().parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    u64::try_from(Duration::from_secs_f64(secs).as_millis()).ok()
}

/// Build a sanitized provider error from a failed HTTP response.
pub fn api_error_body(status: u16, body: &str, retry_after_ms: Option<u64>) -> ProviderError {
    let body = sanitize_api_error(body);
    if status == 429 {
        ProviderError::RateLimited {
            retry_after_ms,
            body,
        }
    } else {
        ProviderError::Http { status, body }
    }
}

/// Consume a non-2xx response and produce the matching error.
pub async fn read_error(resp: reqwest::Response) -> ProviderError {
    let status = resp.status().as_u16();
    let retry_after_ms = resp
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after_header);
    let body = resp.text().await.unwrap_or_default();
    api_error_body(status, &body, retry_after_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_known_key_prefixes() {
        let out = scrub_secret_patterns("Incorrect API key provided: sk-proj-abc123. See docs");
        assert_eq!(out, "Incorrect API key provided: [REDACTED] See docs");
        let out = scrub_secret_patterns("token xoxb-1-2-3 and xoxp-9");
        assert_eq!(out, "token [REDACTED] and [REDACTED]");
    }

    #[test]
    fn bare_prefix_is_left_alone() {
        assert_eq!(scrub_secret_patterns("prefix sk- only"), "prefix sk- only");
    }

    #[test]
    fn long_bodies_are_truncated_on_char_boundary() {
        let input = "é".repeat(300);
        let out = sanitize_api_error(&input);
        assert!(out.ends_with("..."));
        assert_eq!(out.chars().count(), MAX_API_ERROR_CHARS + 3);
        assert_eq!(sanitize_api_error("short"), "short");
    }

    #[test]
    fn retry_after_header_parsing() {
        assert_eq!(parse_retry_after_header("30"), Some(30_000));
        assert_eq!(parse_retry_after_header(" 1.5 "), Some(1_500));
        assert_eq!(parse_retry_after_header("Wed, 21 Oct 2015 07:28:00 GMT"), None);
        assert_eq!(parse_retry_after_header("-1"), None);
    }

    #[test]
    fn status_429_becomes_rate_limited() {
        match api_error_body(429, "slow down", Some(2_000)) {
            ProviderError::RateLimited {
                retry_after_ms,
                body,
            } => {
                assert_eq!(retry_after_ms, Some(2_000));
                assert_eq!(body, "slow down");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            api_error_body(401, "bad key sk-live-1", None),
            ProviderError::Http { status: 401, ref body } if body == "bad key [REDACTED]"
        ));
    }
}
