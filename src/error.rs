use std::time::Duration;

use thiserror::Error;

/// Every failure mode surfaced by the Tornado client.
///
/// Vendor error payloads are classified into the most specific variant so that
/// callers can decide whether to wait (`RateLimit`), shrink the prompt
/// (`TokenLimitExceeded`) or fall back to another handle. The crate never retries
/// on its own.
#[derive(Debug, Error)]
pub enum TornadoError {
    /// Networking or HTTP client failures.
    #[error("transport error: {message}")]
    Transport { message: String },
    /// Invalid, missing or rejected credentials.
    #[error("auth failure: {message}")]
    Auth { message: String },
    /// The vendor throttled the request.
    #[error("rate limited: {message}")]
    RateLimit {
        message: String,
        /// Wait suggested by the `Retry-After` header, if any.
        retry_after: Option<Duration>,
    },
    /// Prompt or completion exceeds the model context window.
    #[error("token limit exceeded: {message}")]
    TokenLimitExceeded { message: String },
    /// The request payload is invalid for the selected vendor.
    #[error("invalid request: {message}")]
    Validation { message: String },
    /// The selected vendor cannot express a requested feature.
    #[error("feature unsupported by {provider}: {feature}")]
    UnsupportedFeature {
        provider: &'static str,
        feature: &'static str,
    },
    /// The requested model or deployment does not exist.
    #[error("model not found: {message}")]
    ModelNotFound {
        /// Model identifier extracted from the vendor message when present.
        model: Option<String>,
        message: String,
    },
    /// Configuration could not be loaded or validated.
    #[error("invalid configuration for {field}: {reason}")]
    InvalidConfig { field: String, reason: String },
    /// An SSE channel ended before its terminal marker.
    #[error("stream closed unexpectedly: {message}")]
    StreamClosed { message: String },
    /// Vendor-defined errors that cannot be normalized further.
    #[error("provider {provider} error: {message}")]
    Provider {
        provider: &'static str,
        message: String,
    },
    /// Local persistence failures in document or vector stores.
    #[error("storage error: {message}")]
    Storage { message: String },
}

impl TornadoError {
    /// Creates a [`TornadoError::Transport`].
    ///
    /// ```
    /// use tornado_llm::error::TornadoError;
    ///
    /// let err = TornadoError::transport("dns lookup failed");
    /// assert!(matches!(err, TornadoError::Transport { .. }));
    /// ```
    pub fn transport<T: Into<String>>(message: T) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a [`TornadoError::Provider`] tagged with the provider name.
    ///
    /// ```
    /// use tornado_llm::error::TornadoError;
    ///
    /// let err = TornadoError::provider("openai_chat", "bad JSON payload");
    /// assert!(matches!(err, TornadoError::Provider { provider: "openai_chat", .. }));
    /// ```
    pub fn provider<T: Into<String>>(provider: &'static str, message: T) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
        }
    }

    /// Creates a [`TornadoError::Validation`].
    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a [`TornadoError::Storage`].
    pub fn storage<T: Into<String>>(message: T) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Returns `true` for failures where waiting and re-sending may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::RateLimit { .. } | Self::StreamClosed { .. } => true,
            Self::Provider { message, .. } => message.starts_with("status 5"),
            _ => false,
        }
    }
}

/// Returns `true` when an error code or message suggests a context window overflow.
pub(crate) fn looks_like_token_limit_error(code_hint: Option<&str>, message: &str) -> bool {
    if let Some(code) = code_hint {
        let lower = code.to_ascii_lowercase();
        if matches!(
            lower.as_str(),
            "context_length_exceeded"
                | "max_context_length_exceeded"
                | "prompt_tokens_exceeded"
                | "context_window_exceeded"
                | "string_above_max_length"
        ) {
            return true;
        }
    }

    let lower_message = message.to_ascii_lowercase();
    const HINTS: [&str; 7] = [
        "context length",
        "context window",
        "maximum context",
        "token limit",
        "too many tokens",
        "prompt is too long",
        "exceeds the maximum number of tokens",
    ];
    HINTS.iter().any(|needle| lower_message.contains(needle))
}

/// Pulls a quoted model identifier out of a vendor error message.
pub(crate) fn extract_model_identifier(message: &str) -> Option<String> {
    ['`', '"', '\'']
        .into_iter()
        .filter_map(|delimiter| between_delimiters(message, delimiter))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn between_delimiters(message: &str, delimiter: char) -> Option<&str> {
    let start = message.find(delimiter)? + delimiter.len_utf8();
    let rest = &message[start..];
    let end = rest.find(delimiter)?;
    Some(&rest[..end])
}

/// Classifies a vendor error once its body has been reduced to a message and code.
///
/// Shared by every provider's error parser so that the status mapping stays
/// identical across vendors.
pub(crate) fn classify_http_error(
    provider: &'static str,
    status: u16,
    message: String,
    code_hint: Option<&str>,
    retry_after: Option<Duration>,
) -> TornadoError {
    tracing::debug!(provider, status, code = ?code_hint, "classifying provider error");

    if looks_like_token_limit_error(code_hint, &message) {
        return TornadoError::TokenLimitExceeded { message };
    }

    let not_found_code = matches!(
        code_hint,
        Some("not_found" | "model_not_found" | "not_found_error" | "NOT_FOUND")
    );
    if status == 404 || not_found_code {
        return TornadoError::ModelNotFound {
            model: extract_model_identifier(&message),
            message,
        };
    }

    match status {
        401 | 403 => TornadoError::Auth { message },
        429 => TornadoError::RateLimit {
            message,
            retry_after,
        },
        400 | 422 => TornadoError::Validation { message },
        _ => TornadoError::Provider {
            provider,
            message: format!("status {status}: {message}"),
        },
    }
}
