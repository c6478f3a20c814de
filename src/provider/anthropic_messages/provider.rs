use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::TornadoError;
use crate::http::{
    DynHttpTransport, ensure_stream_success, ensure_success, parse_json, post_json_stream_with_headers,
    post_json_with_headers,
};
use crate::provider::{ChatProvider, ChatStream, resolve_model, versioned_endpoint};
use crate::types::{CapabilityDescriptor, ChatRequest, ChatResult};

use super::error::parse_anthropic_error;
use super::request::build_anthropic_body;
use super::response::map_response;
use super::stream::create_stream;
use super::types::AnthropicMessageResponse;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_VERSION: &str = "2023-06-01";

/// Anthropic Messages API provider.
pub struct AnthropicMessagesProvider {
    pub(crate) transport: DynHttpTransport,
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    pub(crate) version: String,
    pub(crate) beta: Option<String>,
    pub(crate) default_model: Option<String>,
}

impl AnthropicMessagesProvider {
    pub fn new(transport: DynHttpTransport, api_key: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            version: DEFAULT_VERSION.to_string(),
            beta: None,
            default_model: None,
        }
    }

    /// Points the provider at a proxy or compatible gateway.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the `anthropic-version` header.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Sets `anthropic-beta`; several betas are comma separated.
    pub fn with_beta(mut self, beta: impl Into<String>) -> Self {
        self.beta = Some(beta.into());
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn endpoint(&self) -> String {
        versioned_endpoint(&self.base_url, "v1", "messages")
    }

    fn build_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("x-api-key".to_string(), self.api_key.clone());
        headers.insert("anthropic-version".to_string(), self.version.clone());
        if let Some(beta) = &self.beta {
            headers.insert("anthropic-beta".to_string(), beta.clone());
        }
        headers
    }

    fn build_request_body(
        &self,
        request: &ChatRequest,
        stream: bool,
    ) -> Result<serde_json::Value, TornadoError> {
        let model = resolve_model(request, self.default_model.as_deref(), self.name())?;
        build_anthropic_body(request, &model, stream)
    }
}

#[async_trait]
impl ChatProvider for AnthropicMessagesProvider {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResult, TornadoError> {
        let body = self.build_request_body(&request, false)?;
        let endpoint = self.endpoint();
        tracing::debug!(provider = self.name(), endpoint = %endpoint, "sending chat request");
        let response =
            post_json_with_headers(self.transport.as_ref(), &endpoint, self.build_headers(), &body)
                .await?;
        let text = ensure_success(response, parse_anthropic_error)?;
        let parsed: AnthropicMessageResponse = parse_json(self.name(), &text)?;
        Ok(map_response(parsed, self.name(), &endpoint))
    }

    async fn stream_chat(&self, request: ChatRequest) -> Result<ChatStream, TornadoError> {
        let body = self.build_request_body(&request, true)?;
        let endpoint = self.endpoint();
        tracing::debug!(provider = self.name(), endpoint = %endpoint, "opening chat stream");
        let response = post_json_stream_with_headers(
            self.transport.as_ref(),
            &endpoint,
            self.build_headers(),
            &body,
        )
        .await?;
        let response = ensure_stream_success(response, parse_anthropic_error).await?;
        Ok(create_stream(response.body, self.name(), &endpoint))
    }

    fn capabilities(&self) -> CapabilityDescriptor {
        CapabilityDescriptor {
            supports_stream: true,
            supports_image_input: true,
            supports_audio_input: false,
            supports_video_input: false,
            supports_tools: true,
            supports_structured_output: false,
            supports_parallel_tool_calls: true,
        }
    }

    fn name(&self) -> &'static str {
        "anthropic_messages"
    }
}
