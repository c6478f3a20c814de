//! OpenAI Chat Completions (`/v1/chat/completions`) and compatible vendors.

mod error;
mod provider;
mod request;
mod response;
mod stream;
mod types;

pub use provider::{OpenAiChatProvider, OpenAiCompatible};

pub(crate) use error::openai_error_parser;
