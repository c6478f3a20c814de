use std::time::Duration;

use serde::Deserialize;

use crate::error::{TornadoError, classify_http_error};

const PROVIDER: &str = "google_gemini";

/// Classifies a Google RPC-style `{"error": {"code", "message", "status"}}` body.
///
/// The streaming endpoint wraps the error in a one-element array.
pub(crate) fn parse_gemini_error(
    status: u16,
    body: &str,
    retry_after: Option<Duration>,
) -> TornadoError {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<InnerError>,
    }
    #[derive(Deserialize)]
    struct InnerError {
        message: Option<String>,
        status: Option<String>,
    }

    let parsed = serde_json::from_str::<ErrorBody>(body).or_else(|_| {
        serde_json::from_str::<Vec<ErrorBody>>(body).map(|mut list| {
            if list.is_empty() {
                ErrorBody { error: None }
            } else {
                list.swap_remove(0)
            }
        })
    });

    match parsed {
        Ok(ErrorBody {
            error:
                Some(InnerError {
                    message: Some(message),
                    status: rpc_status,
                }),
        }) => classify_http_error(PROVIDER, status, message, rpc_status.as_deref(), retry_after),
        _ => TornadoError::Provider {
            provider: PROVIDER,
            message: format!("status {status}: {body}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_key_is_auth() {
        let body = r#"{"error":{"code":403,"message":"API key not valid.","status":"PERMISSION_DENIED"}}"#;
        assert!(matches!(
            parse_gemini_error(403, body, None),
            TornadoError::Auth { .. }
        ));
    }

    #[test]
    fn wrapped_array_body_is_understood() {
        let body = r#"[{"error":{"code":429,"message":"Resource has been exhausted","status":"RESOURCE_EXHAUSTED"}}]"#;
        assert!(matches!(
            parse_gemini_error(429, body, Some(Duration::from_secs(1))),
            TornadoError::RateLimit { retry_after: Some(_), .. }
        ));
    }

    #[test]
    fn unknown_model_maps_to_model_not_found() {
        let body = r#"{"error":{"code":404,"message":"models/gemini-9 is not found for API version v1beta","status":"NOT_FOUND"}}"#;
        assert!(matches!(
            parse_gemini_error(404, body, None),
            TornadoError::ModelNotFound { .. }
        ));
    }

    #[test]
    fn token_overflow_is_detected() {
        let body = r#"{"error":{"code":400,"message":"The input token count (1200000) exceeds the maximum number of tokens allowed (1048576).","status":"INVALID_ARGUMENT"}}"#;
        assert!(matches!(
            parse_gemini_error(400, body, None),
            TornadoError::TokenLimitExceeded { .. }
        ));
    }
}
