//! The closed error taxonomy surfaced to callers.
//!
//! Every failure that leaves this crate through [`crate::ChatClient`],
//! [`crate::complete`] or [`crate::stream`] is an [`AppError`]: a kind, a
//! user-facing message, and optional structured remediation details.

use crate::types::ProviderKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Missing/invalid credentials or unsupported provider. Not retryable.
    Configuration,
    /// Out-of-range generation setting. The caller must correct its input.
    InvalidParameter,
    /// Bad or missing API key.
    AuthenticationFailed,
    /// Transient; retry after `details.retry_after_seconds`.
    RateLimited,
    /// Pick one of `details.available_models`.
    ModelNotFound,
    /// Conversation is longer than the model accepts.
    ContextExceeded,
    /// Flagged by the provider's content filter.
    ContentPolicyViolation,
    /// Optional provider support is not compiled in.
    Unavailable,
    Unknown,
}

impl ErrorKind {
    /// HTTP-like status code for relaying the error.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::Configuration
            | ErrorKind::InvalidParameter
            | ErrorKind::ContextExceeded
            | ErrorKind::ContentPolicyViolation => 400,
            ErrorKind::AuthenticationFailed => 401,
            ErrorKind::ModelNotFound => 404,
            ErrorKind::RateLimited => 429,
            ErrorKind::Unknown => 500,
            ErrorKind::Unavailable => 503,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::RateLimited)
    }
}

/// Structured remediation data. Which fields are set depends on the kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provided: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_models: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub troubleshooting: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = Some(details);
        self
    }

    pub(crate) fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.details.get_or_insert_with(ErrorDetails::default).provider = Some(provider);
        self
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    /// An out-of-range (or non-finite) generation parameter.
    pub fn invalid_parameter(parameter: &str, min: f64, max: f64, provided: f64) -> Self {
        Self::new(
            ErrorKind::InvalidParameter,
            format!("Invalid {parameter}: must be between {min} and {max}, got {provided}"),
        )
        .with_details(ErrorDetails {
            parameter: Some(parameter.to_string()),
            min: Some(min),
            max: Some(max),
            provided: Some(provided),
            ..Default::default()
        })
    }

    pub fn status_code(&self) -> u16 {
        self.kind.status_code()
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}
