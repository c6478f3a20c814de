use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::TornadoError;
use crate::http::{
    DynHttpTransport, ensure_stream_success, ensure_success, parse_json, post_json_stream_with_headers,
    post_json_with_headers,
};
use crate::provider::{ChatProvider, ChatStream, resolve_model, versioned_endpoint};
use crate::types::{CapabilityDescriptor, ChatRequest, ChatResult};

use super::error::parse_gemini_error;
use super::request::build_gemini_body;
use super::response::map_response;
use super::stream::create_stream;
use super::types::GeminiGenerateContentResponse;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const API_VERSION: &str = "v1beta";

/// Google Gemini `generateContent` provider.
pub struct GoogleGeminiProvider {
    pub(crate) transport: DynHttpTransport,
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    pub(crate) default_model: Option<String>,
}

impl GoogleGeminiProvider {
    pub fn new(transport: DynHttpTransport, api_key: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            default_model: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the model used when a request leaves it empty, e.g. `gemini-2.5-flash`.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn endpoint(&self, model: &str) -> String {
        let path = format!("{}:generateContent", normalize_model(model));
        versioned_endpoint(&self.base_url, API_VERSION, &path)
    }

    pub fn stream_endpoint(&self, model: &str) -> String {
        let path = format!("{}:streamGenerateContent?alt=sse", normalize_model(model));
        versioned_endpoint(&self.base_url, API_VERSION, &path)
    }

    fn build_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("x-goog-api-key".to_string(), self.api_key.clone());
        headers
    }
}

fn normalize_model(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

#[async_trait]
impl ChatProvider for GoogleGeminiProvider {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResult, TornadoError> {
        let model = resolve_model(&request, self.default_model.as_deref(), self.name())?;
        let body = build_gemini_body(&request)?;
        let endpoint = self.endpoint(&model);
        tracing::debug!(provider = self.name(), model = %model, "sending chat request");
        let response =
            post_json_with_headers(self.transport.as_ref(), &endpoint, self.build_headers(), &body)
                .await?;
        let text = ensure_success(response, parse_gemini_error)?;
        let parsed: GeminiGenerateContentResponse = parse_json(self.name(), &text)?;
        let mut result = map_response(parsed, self.name(), &endpoint);
        if result.model.is_none() {
            result.model = Some(model);
        }
        Ok(result)
    }

    async fn stream_chat(&self, request: ChatRequest) -> Result<ChatStream, TornadoError> {
        let model = resolve_model(&request, self.default_model.as_deref(), self.name())?;
        let body = build_gemini_body(&request)?;
        let endpoint = self.stream_endpoint(&model);
        tracing::debug!(provider = self.name(), model = %model, "opening chat stream");
        let response = post_json_stream_with_headers(
            self.transport.as_ref(),
            &endpoint,
            self.build_headers(),
            &body,
        )
        .await?;
        let response = ensure_stream_success(response, parse_gemini_error).await?;
        Ok(create_stream(response.body, self.name(), &endpoint))
    }

    fn capabilities(&self) -> CapabilityDescriptor {
        CapabilityDescriptor {
            supports_stream: true,
            supports_image_input: true,
            supports_audio_input: true,
            supports_video_input: true,
            supports_tools: true,
            supports_structured_output: true,
            supports_parallel_tool_calls: true,
        }
    }

    fn name(&self) -> &'static str {
        "google_gemini"
    }
}
