use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TornadoError;
use crate::http::HttpBodyStream;
use crate::stream::{SseDecoder, SseEvent};

use super::endpoint::{PROVIDER, ThreadsEndpoint};
use super::types::{
    CreateRunRequest, MessageDelta, Run, RunStatus, RunStep, RunStepDelta, RunToolCall, Thread,
    ThreadMessage, ToolOutput,
};

/// Tool-output round trips allowed for one streamed run.
pub const MAX_TOOL_OUTPUT_HANDOFFS: usize = 16;

pub type RunEventStream = Pin<Box<dyn Stream<Item = Result<RunStreamEvent, TornadoError>> + Send>>;

/// Typed Assistants stream event. `name` carries the full event name,
/// e.g. `thread.run.completed`.
#[derive(Debug, Clone, PartialEq)]
pub enum RunStreamEvent {
    ThreadCreated(Thread),
    Run { name: String, run: Run },
    RunStep { name: String, step: RunStep },
    RunStepDelta(RunStepDelta),
    Message { name: String, message: ThreadMessage },
    MessageDelta(MessageDelta),
    Error(RunStreamError),
    Done,
    /// An event name this crate does not model yet.
    Unknown { name: String, data: Value },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStreamError {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}

pub(crate) fn run_event_stream(body: HttpBodyStream) -> RunEventStream {
    Box::pin(SseDecoder::new(body, PROVIDER).map(|event| event.and_then(parse_run_event)))
}

fn decode<T: for<'de> Deserialize<'de>>(name: &str, data: &str) -> Result<T, TornadoError> {
    serde_json::from_str(data).map_err(|err| TornadoError::Provider {
        provider: PROVIDER,
        message: format!("failed to parse {name} event: {err}"),
    })
}

pub(crate) fn parse_run_event(event: SseEvent) -> Result<RunStreamEvent, TornadoError> {
    let SseEvent { event, data } = event;
    let name = event.unwrap_or_default();
    if name == "done" || data.trim() == "[DONE]" {
        return Ok(RunStreamEvent::Done);
    }

    let parsed = match name.as_str() {
        "thread.created" => RunStreamEvent::ThreadCreated(decode(&name, &data)?),
        "thread.message.delta" => RunStreamEvent::MessageDelta(decode(&name, &data)?),
        "thread.run.step.delta" => RunStreamEvent::RunStepDelta(decode(&name, &data)?),
        "error" => {
            #[derive(Deserialize)]
            struct Wrapped {
                error: RunStreamError,
            }
            let error = decode::<Wrapped>(&name, &data)
                .map(|wrapped| wrapped.error)
                .or_else(|_| decode::<RunStreamError>(&name, &data))?;
            RunStreamEvent::Error(error)
        }
        n if n.starts_with("thread.run.step.") => RunStreamEvent::RunStep {
            step: decode(&name, &data)?,
            name,
        },
        n if n.starts_with("thread.run.") => RunStreamEvent::Run {
            run: decode(&name, &data)?,
            name,
        },
        n if n.starts_with("thread.message.") => RunStreamEvent::Message {
            message: decode(&name, &data)?,
            name,
        },
        _ => {
            tracing::debug!(provider = PROVIDER, event = %name, "unrecognized run stream event");
            let data = serde_json::from_str(&data).unwrap_or(Value::String(data));
            RunStreamEvent::Unknown { name, data }
        }
    };
    Ok(parsed)
}

/// Callbacks for a streamed run. Every method defaults to a no-op.
#[async_trait]
pub trait RunStreamHandler: Send {
    async fn on_thread_created(&mut self, _thread: &Thread) {}

    /// Text fragment of an assistant message being written.
    async fn on_text_delta(&mut self, _text: &str, _delta: &MessageDelta) {}

    async fn on_message_created(&mut self, _message: &ThreadMessage) {}

    /// Called for `completed` and `incomplete` messages.
    async fn on_message_completed(&mut self, _message: &ThreadMessage) {}

    /// Every `thread.run.*` status event.
    async fn on_run_status(&mut self, _run: &Run) {}

    /// Returns the outputs to submit. Returning none ends dispatch with the
    /// run still in `requires_action`.
    async fn on_tool_calls_required(
        &mut self,
        _run: &Run,
        _calls: &[RunToolCall],
    ) -> Result<Vec<ToolOutput>, TornadoError> {
        Ok(Vec::new())
    }

    async fn on_run_step(&mut self, _step: &RunStep) {}

    async fn on_run_step_delta(&mut self, _delta: &RunStepDelta) {}

    async fn on_error(&mut self, _error: &RunStreamError) {}

    async fn on_unknown(&mut self, _name: &str, _data: &Value) {}
}

/// Result of dispatching one event stream.
#[derive(Debug, Default)]
pub(crate) struct StreamPass {
    pub(crate) last_run: Option<Run>,
    /// Run id and outputs to submit before the run can continue.
    pub(crate) pending: Option<(String, Vec<ToolOutput>)>,
}

/// Feeds every event of `stream` to `handler`.
pub(crate) async fn dispatch_events<H: RunStreamHandler + ?Sized>(
    mut stream: RunEventStream,
    handler: &mut H,
) -> Result<StreamPass, TornadoError> {
    let mut pass = StreamPass::default();
    while let Some(event) = stream.next().await {
        match event? {
            RunStreamEvent::ThreadCreated(thread) => handler.on_thread_created(&thread).await,
            RunStreamEvent::Run { run, .. } => {
                handler.on_run_status(&run).await;
                if run.status == RunStatus::RequiresAction {
                    let outputs = handler
                        .on_tool_calls_required(&run, run.required_tool_calls())
                        .await?;
                    if outputs.is_empty() {
                        tracing::warn!(run_id = %run.id, "run requires action but handler returned no outputs");
                    } else {
                        pass.pending = Some((run.id.clone(), outputs));
                    }
                }
                pass.last_run = Some(run);
            }
            RunStreamEvent::RunStep { step, .. } => handler.on_run_step(&step).await,
            RunStreamEvent::RunStepDelta(delta) => handler.on_run_step_delta(&delta).await,
            RunStreamEvent::Message { name, message } => match name.as_str() {
                "thread.message.created" => handler.on_message_created(&message).await,
                "thread.message.completed" | "thread.message.incomplete" => {
                    handler.on_message_completed(&message).await
                }
                _ => {}
            },
            RunStreamEvent::MessageDelta(delta) => {
                let text = delta.text();
                if !text.is_empty() {
                    handler.on_text_delta(&text, &delta).await;
                }
            }
            RunStreamEvent::Error(error) => {
                handler.on_error(&error).await;
                return Err(TornadoError::Provider {
                    provider: PROVIDER,
                    message: error.message,
                });
            }
            RunStreamEvent::Done => break,
            RunStreamEvent::Unknown { name, data } => handler.on_unknown(&name, &data).await,
        }
    }
    Ok(pass)
}

/// Drives a streamed run to completion, submitting tool outputs produced by
/// the handler and dispatching each continuation stream in turn.
pub struct RunStreaming<'a> {
    threads: &'a ThreadsEndpoint,
    max_handoffs: usize,
}

impl<'a> RunStreaming<'a> {
    pub fn new(threads: &'a ThreadsEndpoint) -> Self {
        Self {
            threads,
            max_handoffs: MAX_TOOL_OUTPUT_HANDOFFS,
        }
    }

    /// Lowers the hand-off bound; values above [`MAX_TOOL_OUTPUT_HANDOFFS`] are clamped.
    pub fn with_max_handoffs(mut self, max_handoffs: usize) -> Self {
        self.max_handoffs = max_handoffs.min(MAX_TOOL_OUTPUT_HANDOFFS);
        self
    }

    /// Starts a run on `thread_id` and returns the last run snapshot seen.
    pub async fn run<H: RunStreamHandler + ?Sized>(
        &self,
        thread_id: &str,
        request: &CreateRunRequest,
        handler: &mut H,
    ) -> Result<Option<Run>, TornadoError> {
        let stream = self.threads.stream_run(thread_id, request).await?;
        self.drive(thread_id, stream, handler).await
    }

    /// Dispatches an already-open stream, e.g. one returned by
    /// [`ThreadsEndpoint::submit_tool_outputs_stream`].
    pub async fn drive<H: RunStreamHandler + ?Sized>(
        &self,
        thread_id: &str,
        mut stream: RunEventStream,
        handler: &mut H,
    ) -> Result<Option<Run>, TornadoError> {
        let mut handoffs = 0;
        loop {
            let pass = dispatch_events(stream, handler).await?;
            let Some((run_id, outputs)) = pass.pending else {
                return Ok(pass.last_run);
            };
            if handoffs >= self.max_handoffs {
                return Err(TornadoError::Provider {
                    provider: PROVIDER,
                    message: format!(
                        "run {run_id} still requires action after {handoffs} tool output submissions"
                    ),
                });
            }
            handoffs += 1;
            tracing::debug!(run_id = %run_id, handoffs, outputs = outputs.len(), "submitting tool outputs");
            stream = self
                .threads
                .submit_tool_outputs_stream(thread_id, &run_id, &outputs)
                .await?;
        }
    }
}
