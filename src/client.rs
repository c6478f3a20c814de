use std::collections::HashMap;

use crate::error::TornadoError;
use crate::provider::{ChatStream, DynProvider};
use crate::stream::collect_stream;
use crate::types::{CapabilityDescriptor, ChatRequest, ChatResult};

/// Entry point that routes requests to providers registered under handles.
pub struct TornadoClient {
    providers: HashMap<String, DynProvider>,
}

impl TornadoClient {
    /// Starts a builder for registering providers under handles.
    pub fn builder() -> TornadoClientBuilder {
        TornadoClientBuilder {
            providers: HashMap::new(),
        }
    }

    /// Sends a non-streaming chat request to the provider behind `handle`.
    ///
    /// Unknown handles fail with [`TornadoError::Validation`] before any I/O.
    pub async fn chat(&self, handle: &str, request: ChatRequest) -> Result<ChatResult, TornadoError> {
        let provider = self.get_provider(handle)?;
        tracing::debug!(handle, provider = provider.name(), "dispatching chat");
        provider.chat(request).await
    }

    /// Opens a streaming chat request. The stream ends after a chunk with
    /// `is_terminal` set, or with an error.
    pub async fn stream_chat(
        &self,
        handle: &str,
        request: ChatRequest,
    ) -> Result<ChatStream, TornadoError> {
        let provider = self.get_provider(handle)?;
        tracing::debug!(handle, provider = provider.name(), "dispatching stream");
        provider.stream_chat(request).await
    }

    /// Streams the request and folds every chunk into one [`ChatResult`].
    pub async fn stream_chat_collect(
        &self,
        handle: &str,
        request: ChatRequest,
    ) -> Result<ChatResult, TornadoError> {
        let stream = self.stream_chat(handle, request).await?;
        collect_stream(stream).await
    }

    /// Registered handles, in no particular order.
    pub fn handles(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    /// Capability descriptor of the provider behind `handle`.
    pub fn capabilities(&self, handle: &str) -> Result<CapabilityDescriptor, TornadoError> {
        let provider = self.get_provider(handle)?;
        Ok(provider.capabilities())
    }

    /// Handles whose provider accepts tool definitions.
    pub fn handles_supporting_tools(&self) -> Vec<String> {
        self.handles_where(|caps| caps.supports_tools)
    }

    /// Handles whose provider can stream.
    pub fn handles_supporting_stream(&self) -> Vec<String> {
        self.handles_where(|caps| caps.supports_stream)
    }

    fn handles_where(&self, predicate: impl Fn(&CapabilityDescriptor) -> bool) -> Vec<String> {
        self.providers
            .iter()
            .filter_map(|(handle, provider)| {
                if predicate(&provider.capabilities()) {
                    Some(handle.clone())
                } else {
                    None
                }
            })
            .collect()
    }

    fn get_provider(&self, handle: &str) -> Result<DynProvider, TornadoError> {
        self.providers
            .get(handle)
            .cloned()
            .ok_or_else(|| TornadoError::Validation {
                message: format!("unknown model handle: {handle}"),
            })
    }
}

/// Collects handle registrations for a [`TornadoClient`].
pub struct TornadoClientBuilder {
    providers: HashMap<String, DynProvider>,
}

impl TornadoClientBuilder {
    /// Registers `provider` under `handle`, replacing any earlier registration.
    pub fn register_handle<S: Into<String>>(mut self, handle: S, provider: DynProvider) -> Self {
        self.providers.insert(handle.into(), provider);
        self
    }

    /// Finishes registration.
    pub fn build(self) -> TornadoClient {
        TornadoClient {
            providers: self.providers,
        }
    }
}
