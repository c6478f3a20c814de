use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TornadoError;
use crate::types::{CapabilityDescriptor, ChatRequest, ChatResult};

pub mod anthropic_messages;
pub mod google_gemini;
pub mod openai_chat;
pub(crate) mod retry;

pub use crate::stream::ChatStream;

/// Common interface implemented by every vendor adapter.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Sends the request and waits for the complete result.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResult, TornadoError>;

    /// Sends the request and yields incremental chunks.
    ///
    /// Non-2xx statuses are reported here, before any chunk is produced.
    async fn stream_chat(&self, request: ChatRequest) -> Result<ChatStream, TornadoError>;

    fn capabilities(&self) -> CapabilityDescriptor;

    /// Provider name used in logs and [`crate::types::ProviderMetadata`].
    fn name(&self) -> &'static str;
}

/// Shared, thread-safe provider handle.
pub type DynProvider = Arc<dyn ChatProvider>;

/// Picks the request model, falling back to the provider default.
pub(crate) fn resolve_model(
    request: &ChatRequest,
    default_model: Option<&str>,
    provider: &'static str,
) -> Result<String, TornadoError> {
    request
        .model
        .as_deref()
        .or(default_model)
        .map(str::to_string)
        .ok_or_else(|| TornadoError::Validation {
            message: format!("model is required for {provider}"),
        })
}

/// Joins `path` onto `base`, inserting `version` unless the base already ends with it.
pub(crate) fn versioned_endpoint(base: &str, version: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let suffix = format!("/{version}");
    if base.ends_with(&suffix) {
        format!("{base}/{path}")
    } else {
        format!("{base}{suffix}/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatMessage;

    #[test]
    fn endpoint_does_not_double_version() {
        assert_eq!(
            versioned_endpoint("https://api.openai.com", "v1", "chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            versioned_endpoint("https://api.groq.com/openai/v1/", "v1", "chat/completions"),
            "https://api.groq.com/openai/v1/chat/completions"
        );
    }

    #[test]
    fn request_model_wins_over_default() {
        let request = ChatRequest::new(vec![ChatMessage::user("hi")]).with_model("a");
        assert_eq!(resolve_model(&request, Some("b"), "p").unwrap(), "a");

        let request = ChatRequest::new(vec![ChatMessage::user("hi")]);
        assert_eq!(resolve_model(&request, Some("b"), "p").unwrap(), "b");
        assert!(matches!(
            resolve_model(&request, None, "p"),
            Err(TornadoError::Validation { .. })
        ));
    }
}
