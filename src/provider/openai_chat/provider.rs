use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TornadoError;
use crate::http::{
    DynHttpTransport, ensure_stream_success, ensure_success, parse_json, post_json_stream_with_headers,
    post_json_with_headers,
};
use crate::provider::{ChatProvider, ChatStream, resolve_model, versioned_endpoint};
use crate::types::{CapabilityDescriptor, ChatRequest, ChatResult};

use super::error::openai_error_parser;
use super::request::build_openai_body;
use super::response::map_response;
use super::stream::create_stream;
use super::types::OpenAiChatResponse;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Vendors that expose an OpenAI-compatible Chat Completions API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenAiCompatible {
    Groq,
    Mistral,
    DeepSeek,
    XAi,
    Perplexity,
    OpenRouter,
}

impl OpenAiCompatible {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Groq => "groq",
            Self::Mistral => "mistral",
            Self::DeepSeek => "deepseek",
            Self::XAi => "xai",
            Self::Perplexity => "perplexity",
            Self::OpenRouter => "openrouter",
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            Self::Groq => "https://api.groq.com/openai/v1",
            Self::Mistral => "https://api.mistral.ai/v1",
            Self::DeepSeek => "https://api.deepseek.com/v1",
            Self::XAi => "https://api.x.ai/v1",
            Self::Perplexity => "https://api.perplexity.ai",
            Self::OpenRouter => "https://openrouter.ai/api/v1",
        }
    }

    /// Perplexity serves `/chat/completions` without a version segment.
    fn versioned(&self) -> bool {
        !matches!(self, Self::Perplexity)
    }

    /// Conventional environment variable holding the vendor API key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Self::Groq => "GROQ_API_KEY",
            Self::Mistral => "MISTRAL_API_KEY",
            Self::DeepSeek => "DEEPSEEK_API_KEY",
            Self::XAi => "XAI_API_KEY",
            Self::Perplexity => "PERPLEXITY_API_KEY",
            Self::OpenRouter => "OPENROUTER_API_KEY",
        }
    }
}

/// OpenAI Chat Completions provider, also used for compatible vendors.
///
/// ```
/// # use std::sync::Arc;
/// # use tornado_llm::http::reqwest::ReqwestTransport;
/// # use tornado_llm::provider::ChatProvider;
/// # use tornado_llm::provider::openai_chat::{OpenAiChatProvider, OpenAiCompatible};
/// let transport = Arc::new(ReqwestTransport::default_client().unwrap());
/// let groq = OpenAiChatProvider::compatible(transport, OpenAiCompatible::Groq, "gsk-test")
///     .with_default_model("llama-3.3-70b-versatile");
/// assert_eq!(groq.name(), "groq");
/// assert_eq!(groq.endpoint(), "https://api.groq.com/openai/v1/chat/completions");
/// ```
pub struct OpenAiChatProvider {
    pub(crate) transport: DynHttpTransport,
    pub(crate) name: &'static str,
    pub(crate) base_url: String,
    pub(crate) versioned: bool,
    pub(crate) api_key: String,
    pub(crate) organization: Option<String>,
    pub(crate) project: Option<String>,
    pub(crate) default_model: Option<String>,
    pub(crate) extra_headers: HashMap<String, String>,
}

impl OpenAiChatProvider {
    pub fn new(transport: DynHttpTransport, api_key: impl Into<String>) -> Self {
        Self {
            transport,
            name: "openai_chat",
            base_url: DEFAULT_BASE_URL.to_string(),
            versioned: true,
            api_key: api_key.into(),
            organization: None,
            project: None,
            default_model: None,
            extra_headers: HashMap::new(),
        }
    }

    /// Provider preconfigured for an OpenAI-compatible vendor.
    pub fn compatible(
        transport: DynHttpTransport,
        vendor: OpenAiCompatible,
        api_key: impl Into<String>,
    ) -> Self {
        let mut provider = Self::new(transport, api_key).with_base_url(vendor.base_url());
        provider.name = vendor.name();
        provider.versioned = vendor.versioned();
        provider
    }

    /// Self-hosted or otherwise unlisted compatible endpoint (vLLM, Ollama, LM Studio).
    pub fn custom(
        transport: DynHttpTransport,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let mut provider = Self::new(transport, api_key).with_base_url(base_url);
        provider.name = "openai_compatible";
        provider
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    /// Extra header sent with every request (e.g. OpenRouter's `HTTP-Referer`).
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(name.into(), value.into());
        self
    }

    pub fn endpoint(&self) -> String {
        if self.versioned {
            versioned_endpoint(&self.base_url, "v1", "chat/completions")
        } else {
            format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
        }
    }

    fn build_headers(&self) -> HashMap<String, String> {
        let mut headers = self.extra_headers.clone();
        if !self.api_key.is_empty() {
            headers.insert(
                "Authorization".to_string(),
                format!("Bearer {}", self.api_key),
            );
        }
        if let Some(org) = &self.organization {
            headers.insert("OpenAI-Organization".to_string(), org.clone());
        }
        if let Some(project) = &self.project {
            headers.insert("OpenAI-Project".to_string(), project.clone());
        }
        headers
    }

    fn build_request_body(&self, request: &ChatRequest, stream: bool) -> Result<Value, TornadoError> {
        let model = resolve_model(request, self.default_model.as_deref(), self.name)?;
        build_openai_body(request, &model, stream)
    }
}

#[async_trait]
impl ChatProvider for OpenAiChatProvider {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResult, TornadoError> {
        let body = self.build_request_body(&request, false)?;
        let endpoint = self.endpoint();
        tracing::debug!(provider = self.name, endpoint = %endpoint, "sending chat request");
        let response =
            post_json_with_headers(self.transport.as_ref(), &endpoint, self.build_headers(), &body)
                .await?;
        let text = ensure_success(response, openai_error_parser(self.name))?;
        let parsed: OpenAiChatResponse = parse_json(self.name, &text)?;
        Ok(map_response(parsed, self.name, &endpoint))
    }

    async fn stream_chat(&self, request: ChatRequest) -> Result<ChatStream, TornadoError> {
        let body = self.build_request_body(&request, true)?;
        let endpoint = self.endpoint();
        tracing::debug!(provider = self.name, endpoint = %endpoint, "opening chat stream");
        let response = post_json_stream_with_headers(
            self.transport.as_ref(),
            &endpoint,
            self.build_headers(),
            &body,
        )
        .await?;
        let response = ensure_stream_success(response, openai_error_parser(self.name)).await?;
        Ok(create_stream(response.body, self.name, &endpoint))
    }

    fn capabilities(&self) -> CapabilityDescriptor {
        let native = self.name == "openai_chat";
        CapabilityDescriptor {
            supports_stream: true,
            supports_image_input: true,
            supports_audio_input: native,
            supports_video_input: false,
            supports_tools: true,
            supports_structured_output: true,
            supports_parallel_tool_calls: true,
        }
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
