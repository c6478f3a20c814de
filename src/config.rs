use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::TornadoClient;
use crate::error::TornadoError;
use crate::http::DynHttpTransport;
use crate::provider::DynProvider;
use crate::provider::anthropic_messages::AnthropicMessagesProvider;
use crate::provider::google_gemini::GoogleGeminiProvider;
use crate::provider::openai_chat::{OpenAiChatProvider, OpenAiCompatible};

/// One callable backend, registered on the client under `handle`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Caller-chosen name, e.g. `default-openai`.
    pub handle: String,
    pub provider: ProviderKind,
    #[serde(default)]
    pub credential: Credential,
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Vendor-specific settings: `organization`, `project` and `headers` for
    /// OpenAI-style backends, `version` and `beta` for Anthropic.
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

/// Wire protocol behind a handle: `"open_ai_chat"`, `"anthropic_messages"`,
/// `"google_gemini"`, `{"compatible": "<vendor>"}` or `"custom"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenAiChat,
    AnthropicMessages,
    GoogleGemini,
    /// A known OpenAI-compatible vendor, e.g. `{"compatible": "groq"}`.
    Compatible(OpenAiCompatible),
    /// Any other OpenAI-compatible server; `base_url` is required.
    Custom,
}

impl ProviderKind {
    fn name(&self) -> &'static str {
        match self {
            Self::OpenAiChat => "openai_chat",
            Self::AnthropicMessages => "anthropic_messages",
            Self::GoogleGemini => "google_gemini",
            Self::Compatible(vendor) => vendor.name(),
            Self::Custom => "openai_compatible",
        }
    }
}

/// How a handle authenticates, tagged by `type`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credential {
    ApiKey { key: String },
    Bearer { token: String },
    /// Read from an environment variable when the client is built.
    Env { var: String },
    /// For local servers that do not authenticate.
    #[default]
    None,
}

impl Credential {
    /// Returns the secret, or `None` for [`Credential::None`].
    pub fn resolve(&self) -> Result<Option<String>, TornadoError> {
        match self {
            Self::ApiKey { key } => Ok(Some(key.clone())),
            Self::Bearer { token } => Ok(Some(token.clone())),
            Self::Env { var } => std::env::var(var).map(Some).map_err(|err| {
                TornadoError::InvalidConfig {
                    field: "credential".to_string(),
                    reason: format!("environment variable {var}: {err}"),
                }
            }),
            Self::None => Ok(None),
        }
    }
}

/// Parses a JSON array of [`ModelConfig`] and checks handles are unique.
pub fn load_configs_from_str(json: &str) -> Result<Vec<ModelConfig>, TornadoError> {
    let configs: Vec<ModelConfig> =
        serde_json::from_str(json).map_err(|err| TornadoError::InvalidConfig {
            field: "models".to_string(),
            reason: err.to_string(),
        })?;

    let mut seen = std::collections::HashSet::new();
    for config in &configs {
        if config.handle.trim().is_empty() {
            return Err(TornadoError::InvalidConfig {
                field: "handle".to_string(),
                reason: "handle must not be empty".to_string(),
            });
        }
        if !seen.insert(config.handle.as_str()) {
            return Err(TornadoError::InvalidConfig {
                field: "handle".to_string(),
                reason: format!("duplicate handle {}", config.handle),
            });
        }
    }
    Ok(configs)
}

/// Reads a JSON config file and parses it like [`load_configs_from_str`].
pub async fn load_configs_from_path(path: impl AsRef<Path>) -> Result<Vec<ModelConfig>, TornadoError> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| TornadoError::InvalidConfig {
            field: "path".to_string(),
            reason: format!("{}: {err}", path.display()),
        })?;
    let configs = load_configs_from_str(&text)?;
    tracing::debug!(path = %path.display(), count = configs.len(), "loaded model configs");
    Ok(configs)
}

/// Builds one provider per config over the shared `transport` and registers
/// each under its handle.
///
/// Credentials are resolved here, so a missing environment variable fails
/// with [`TornadoError::InvalidConfig`] before any request is made.
pub fn build_client_from_configs(
    configs: &[ModelConfig],
    transport: DynHttpTransport,
) -> Result<TornadoClient, TornadoError> {
    let mut builder = TornadoClient::builder();
    for config in configs {
        let provider = build_provider_from_config(config, transport.clone())?;
        builder = builder.register_handle(config.handle.clone(), provider);
    }
    Ok(builder.build())
}

fn build_provider_from_config(
    config: &ModelConfig,
    transport: DynHttpTransport,
) -> Result<DynProvider, TornadoError> {
    let provider: DynProvider = match config.provider {
        ProviderKind::OpenAiChat => {
            let api_key = require_key(config)?;
            let provider = OpenAiChatProvider::new(transport, api_key);
            Arc::new(apply_openai_settings(provider, config))
        }
        ProviderKind::Compatible(vendor) => {
            let api_key = require_key(config)?;
            let provider = OpenAiChatProvider::compatible(transport, vendor, api_key);
            Arc::new(apply_openai_settings(provider, config))
        }
        ProviderKind::Custom => {
            let base_url = config
                .base_url
                .clone()
                .ok_or_else(|| TornadoError::InvalidConfig {
                    field: "base_url".to_string(),
                    reason: format!("handle {} needs a base_url", config.handle),
                })?;
            let api_key = config.credential.resolve()?.unwrap_or_default();
            let provider = OpenAiChatProvider::custom(transport, base_url, api_key);
            Arc::new(apply_openai_settings(provider, config))
        }
        ProviderKind::AnthropicMessages => {
            let api_key = require_key(config)?;
            let mut provider = AnthropicMessagesProvider::new(transport, api_key);
            if let Some(base_url) = &config.base_url {
                provider = provider.with_base_url(base_url.clone());
            }
            if let Some(model) = &config.default_model {
                provider = provider.with_default_model(model.clone());
            }
            if let Some(version) = extra_str(config, "version") {
                provider = provider.with_version(version);
            }
            if let Some(beta) = extra_str(config, "beta") {
                provider = provider.with_beta(beta);
            }
            Arc::new(provider)
        }
        ProviderKind::GoogleGemini => {
            let api_key = require_key(config)?;
            let mut provider = GoogleGeminiProvider::new(transport, api_key);
            if let Some(base_url) = &config.base_url {
                provider = provider.with_base_url(base_url.clone());
            }
            if let Some(model) = &config.default_model {
                provider = provider.with_default_model(model.clone());
            }
            Arc::new(provider)
        }
    };
    Ok(provider)
}

fn apply_openai_settings(mut provider: OpenAiChatProvider, config: &ModelConfig) -> OpenAiChatProvider {
    if let Some(base_url) = &config.base_url {
        provider = provider.with_base_url(base_url.clone());
    }
    if let Some(model) = &config.default_model {
        provider = provider.with_default_model(model.clone());
    }
    if let Some(org) = extra_str(config, "organization") {
        provider = provider.with_organization(org);
    }
    if let Some(project) = extra_str(config, "project") {
        provider = provider.with_project(project);
    }
    if let Some(Value::Object(headers)) = config.extra.get("headers") {
        for (name, value) in headers {
            if let Value::String(value) = value {
                provider = provider.with_header(name.clone(), value.clone());
            }
        }
    }
    provider
}

fn require_key(config: &ModelConfig) -> Result<String, TornadoError> {
    config
        .credential
        .resolve()?
        .ok_or_else(|| TornadoError::Auth {
            message: format!(
                "provider {} (handle {}) requires a credential",
                config.provider.name(),
                config.handle
            ),
        })
}

fn extra_str(config: &ModelConfig, key: &str) -> Option<String> {
    match config.extra.get(key) {
        Some(Value::String(value)) => Some(value.clone()),
        _ => None,
    }
}
