use std::time::Duration;

use serde::Deserialize;

use crate::error::{TornadoError, classify_http_error};

use super::types::AnthropicErrorBody;

const PROVIDER: &str = "anthropic_messages";

/// Classifies an Anthropic `{"type":"error","error":{...}}` body.
pub(crate) fn parse_anthropic_error(
    status: u16,
    body: &str,
    retry_after: Option<Duration>,
) -> TornadoError {
    #[derive(Deserialize)]
    struct ErrorEnvelope {
        error: Option<AnthropicErrorBody>,
    }

    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope {
            error: Some(AnthropicErrorBody {
                kind,
                message: Some(message),
            }),
        }) => classify_http_error(PROVIDER, status, message, kind.as_deref(), retry_after),
        _ => TornadoError::Provider {
            provider: PROVIDER,
            message: format!("status {status}: {body}"),
        },
    }
}

/// Maps an in-stream `error` event to the HTTP status the same failure would
/// carry on a regular response.
pub(crate) fn stream_error(error: AnthropicErrorBody) -> TornadoError {
    let status = match error.kind.as_deref() {
        Some("invalid_request_error") => 400,
        Some("authentication_error") => 401,
        Some("permission_error") => 403,
        Some("not_found_error") => 404,
        Some("request_too_large") => 413,
        Some("rate_limit_error") => 429,
        Some("overloaded_error") => 529,
        _ => 500,
    };
    let message = error
        .message
        .unwrap_or_else(|| "stream error without message".to_string());
    classify_http_error(PROVIDER, status, message, error.kind.as_deref(), None)
}
