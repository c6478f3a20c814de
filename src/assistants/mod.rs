//! OpenAI Assistants v2: assistants, threads, messages, runs and run streaming.
//!
//! Run state lives on the server. This module issues the REST calls and turns
//! the run event stream into [`RunStreamEvent`]s and [`RunStreamHandler`]
//! callbacks.

mod endpoint;
mod streaming;
mod types;

pub use endpoint::{AssistantsEndpoint, OpenAiConnection, ThreadsEndpoint};
pub use streaming::{
    MAX_TOOL_OUTPUT_HANDOFFS, RunEventStream, RunStreamError, RunStreamEvent, RunStreamHandler,
    RunStreaming,
};
pub use types::*;
