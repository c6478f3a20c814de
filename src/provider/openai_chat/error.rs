use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{TornadoError, classify_http_error};

/// Error parser for `ensure_success` that reports `provider`,
/// e.g. `groq` or `openai_assistants`.
pub(crate) fn openai_error_parser(
    provider: &'static str,
) -> impl Fn(u16, &str, Option<Duration>) -> TornadoError {
    move |status, body, retry_after| parse_openai_error(provider, status, body, retry_after)
}

/// Classifies an OpenAI-style `{"error": {...}}` body.
///
/// OpenAI-compatible vendors reuse the shape, sometimes with a bare string in
/// `error` or a top-level `message`.
pub(crate) fn parse_openai_error(
    provider: &'static str,
    status: u16,
    body: &str,
    retry_after: Option<Duration>,
) -> TornadoError {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<ErrorField>,
        message: Option<String>,
    }
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ErrorField {
        Object(InnerError),
        Text(String),
    }
    #[derive(Deserialize)]
    struct InnerError {
        message: Option<String>,
        r#type: Option<String>,
        code: Option<Value>,
    }

    let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) else {
        return TornadoError::Provider {
            provider,
            message: format!("status {status}: {body}"),
        };
    };

    let (message, code) = match parsed.error {
        Some(ErrorField::Object(inner)) => {
            let code = inner
                .code
                .as_ref()
                .and_then(|code| code.as_str().map(str::to_string))
                .or(inner.r#type);
            (inner.message, code)
        }
        Some(ErrorField::Text(text)) => (Some(text), None),
        None => (parsed.message, None),
    };
    let Some(message) = message else {
        return TornadoError::Provider {
            provider,
            message: format!("status {status}: {body}"),
        };
    };

    classify_http_error(provider, status, message, code.as_deref(), retry_after)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_overflow_becomes_token_limit() {
        let body = r#"{"error":{"message":"This model's maximum context length is 8192 tokens","type":"invalid_request_error","code":"context_length_exceeded"}}"#;
        assert!(matches!(
            parse_openai_error("openai_chat", 400, body, None),
            TornadoError::TokenLimitExceeded { .. }
        ));
    }

    #[test]
    fn missing_model_extracts_identifier() {
        let body = r#"{"error":{"message":"The model `gpt-7` does not exist or you do not have access to it.","type":"invalid_request_error","code":"model_not_found"}}"#;
        match parse_openai_error("openai_chat", 404, body, None) {
            TornadoError::ModelNotFound { model, .. } => assert_eq!(model.as_deref(), Some("gpt-7")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rate_limit_keeps_retry_after() {
        let body = r#"{"error":{"message":"Rate limit reached","type":"requests","code":"rate_limit_exceeded"}}"#;
        match parse_openai_error("openai_chat", 429, body, Some(Duration::from_secs(20))) {
            TornadoError::RateLimit { retry_after, .. } => {
                assert_eq!(retry_after, Some(Duration::from_secs(20)))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn errors_carry_the_calling_provider() {
        let parse = openai_error_parser("groq");
        match parse(500, r#"{"error":{"message":"internal error","type":"server_error"}}"#, None) {
            TornadoError::Provider { provider, .. } => assert_eq!(provider, "groq"),
            other => panic!("unexpected error: {other:?}"),
        }
        match parse(503, "upstream down", None) {
            TornadoError::Provider { provider, .. } => assert_eq!(provider, "groq"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn string_error_and_garbage_bodies() {
        assert!(matches!(
            parse_openai_error("openai_chat", 401, r#"{"error":"invalid api key"}"#, None),
            TornadoError::Auth { .. }
        ));
        match parse_openai_error("openai_chat", 502, "<html>bad gateway</html>", None) {
            TornadoError::Provider { message, .. } => {
                assert_eq!(message, "status 502: <html>bad gateway</html>")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
