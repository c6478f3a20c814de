//! Unified client for several LLM backends.
//!
//! Chat requests are expressed once with [`ChatRequest`] and routed by handle
//! through [`TornadoClient`] to OpenAI Chat Completions (and compatible
//! vendors), Anthropic Messages or Google Gemini. The [`assistants`] module
//! drives OpenAI Assistants threads and runs, and [`vector`] provides
//! chunking, embeddings and local similarity search.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tornado_llm::http::reqwest::ReqwestTransport;
//! use tornado_llm::provider::openai_chat::OpenAiChatProvider;
//! use tornado_llm::{ChatMessage, ChatRequest, TornadoClient};
//!
//! # async fn run() -> Result<(), tornado_llm::TornadoError> {
//! let transport = Arc::new(ReqwestTransport::default_client()?);
//! let openai = OpenAiChatProvider::new(transport, "sk-...").with_default_model("gpt-4o-mini");
//! let client = TornadoClient::builder()
//!     .register_handle("default", Arc::new(openai))
//!     .build();
//!
//! let result = client
//!     .chat("default", ChatRequest::new(vec![ChatMessage::user("Hello!")]))
//!     .await?;
//! println!("{}", result.text());
//! # Ok(())
//! # }
//! ```

pub mod assistants;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod provider;
pub mod stream;
pub mod types;
pub mod vector;

pub use client::TornadoClient;
pub use error::TornadoError;
pub use provider::{ChatProvider, ChatStream};
pub use types::*;
