use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TornadoError;
use crate::http::{DynHttpTransport, ensure_success, parse_json, post_json_with_headers};
use crate::provider::openai_chat::openai_error_parser;
use crate::provider::versioned_endpoint;

const PROVIDER: &str = "openai_embeddings";
const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// Turns text into dense vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input, in input order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, TornadoError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, TornadoError> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| TornadoError::provider(self.name(), "no embedding returned"))
    }

    fn dimensions(&self) -> usize;

    fn name(&self) -> &'static str;
}

pub type SharedEmbedder = Arc<dyn Embedder>;

/// OpenAI `/v1/embeddings` client.
pub struct OpenAiEmbedder {
    transport: DynHttpTransport,
    base_url: String,
    api_key: String,
    model: String,
    /// Requested output size; `None` uses the model's native size.
    requested_dimensions: Option<usize>,
}

impl OpenAiEmbedder {
    pub fn new(transport: DynHttpTransport, api_key: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            requested_dimensions: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Shortens `text-embedding-3-*` output to `dimensions`.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.requested_dimensions = Some(dimensions);
        self
    }

    pub fn endpoint(&self) -> String {
        versioned_endpoint(&self.base_url, "v1", "embeddings")
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, TornadoError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.requested_dimensions,
        };
        let headers = HashMap::from([(
            "Authorization".to_string(),
            format!("Bearer {}", self.api_key),
        )]);
        let endpoint = self.endpoint();
        tracing::debug!(provider = PROVIDER, model = %self.model, inputs = texts.len(), "embedding batch");
        let response =
            post_json_with_headers(self.transport.as_ref(), &endpoint, headers, &body).await?;
        let text = ensure_success(response, openai_error_parser(PROVIDER))?;
        let mut parsed: EmbeddingResponse = parse_json(PROVIDER, &text)?;

        if parsed.data.len() != texts.len() {
            return Err(TornadoError::provider(
                PROVIDER,
                format!(
                    "expected {} embeddings, received {}",
                    texts.len(),
                    parsed.data.len()
                ),
            ));
        }
        parsed.data.sort_by_key(|item| item.index);
        Ok(parsed.data.into_iter().map(|item| item.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        if let Some(dimensions) = self.requested_dimensions {
            return dimensions;
        }
        match self.model.as_str() {
            "text-embedding-3-large" => 3072,
            _ => 1536,
        }
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }
}
