//! Server-Sent Events decoding and stream folding.

use std::collections::{BTreeMap, VecDeque};
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use futures_util::StreamExt;

use crate::error::TornadoError;
use crate::http::HttpBodyStream;
use crate::types::{
    ChatChoice, ChatChunk, ChatEvent, ChatMessage, ChatResult, ChatRole, ChatUsage, ContentPart,
    FinishReason, ProviderMetadata, ToolCall, parse_tool_arguments,
};

/// Boxed stream of normalized chunks returned by streaming chat calls.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatChunk, TornadoError>> + Send>>;

/// One dispatched SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event:` field, if the server named the event.
    pub event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
}

impl SseEvent {
    /// `true` for the OpenAI-style `[DONE]` sentinel.
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }
}

/// Splits a raw HTTP body into [`SseEvent`]s.
///
/// Comment lines and unknown fields are ignored. Decoding stops after the
/// `[DONE]` sentinel, which is still yielded so callers can observe it.
pub struct SseDecoder {
    body: HttpBodyStream,
    buffer: Vec<u8>,
    event_name: Option<String>,
    data_lines: Vec<Vec<u8>>,
    pending: VecDeque<Result<SseEvent, TornadoError>>,
    provider: &'static str,
    body_closed: bool,
    done: bool,
}

impl SseDecoder {
    pub fn new(body: HttpBodyStream, provider: &'static str) -> Self {
        Self {
            body,
            buffer: Vec::new(),
            event_name: None,
            data_lines: Vec::new(),
            pending: VecDeque::new(),
            provider,
            body_closed: false,
            done: false,
        }
    }

    fn handle_line(&mut self, line: Vec<u8>) {
        if line.is_empty() {
            self.flush_event();
            return;
        }
        if line.starts_with(b":") {
            return;
        }
        let (field, value) = match line.iter().position(|b| *b == b':') {
            Some(pos) => {
                let mut value = &line[pos + 1..];
                if value.first() == Some(&b' ') {
                    value = &value[1..];
                }
                (&line[..pos], value.to_vec())
            }
            None => (&line[..], Vec::new()),
        };
        match field {
            b"data" => self.data_lines.push(value),
            b"event" => self.event_name = Some(String::from_utf8_lossy(&value).into_owned()),
            _ => {}
        }
    }

    fn flush_event(&mut self) {
        let event = self.event_name.take();
        if self.data_lines.is_empty() {
            return;
        }
        let joined = self.data_lines.drain(..).collect::<Vec<_>>().join(&b'\n');
        let item = String::from_utf8(joined)
            .map(|data| SseEvent { event, data })
            .map_err(|err| TornadoError::Provider {
                provider: self.provider,
                message: format!("invalid UTF-8 in stream chunk: {err}"),
            });
        if matches!(&item, Ok(event) if event.is_done()) {
            self.done = true;
        }
        self.pending.push_back(item);
    }

    fn drain_line(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
        buffer.iter().position(|b| *b == b'\n').map(|pos| {
            let mut line: Vec<u8> = buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            line
        })
    }
}

impl Stream for SseDecoder {
    type Item = Result<SseEvent, TornadoError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(event) = this.pending.pop_front() {
                return Poll::Ready(Some(event));
            }
            if this.done || this.body_closed {
                return Poll::Ready(None);
            }

            match this.body.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.buffer.extend_from_slice(&bytes);
                    while !this.done {
                        let Some(line) = Self::drain_line(&mut this.buffer) else {
                            break;
                        };
                        this.handle_line(line);
                    }
                }
                Poll::Ready(Some(Err(err))) => {
                    this.body_closed = true;
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(None) => {
                    this.body_closed = true;
                    if !this.buffer.is_empty() {
                        let line = std::mem::take(&mut this.buffer);
                        this.handle_line(line);
                    }
                    this.flush_event();
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// How a vendor signals the end of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamEnd {
    /// A terminal event must arrive; closing the body early is an error.
    Marker,
    /// Closing the body is a normal end. A terminal chunk is synthesized if the
    /// vendor did not send one.
    Close,
}

/// Adapts an SSE body into a [`ChatStream`] through a vendor conversion function.
pub(crate) struct ChunkStream<F> {
    decoder: SseDecoder,
    convert: F,
    metadata: ProviderMetadata,
    end: StreamEnd,
    terminal_seen: bool,
    finished: bool,
}

impl<F> ChunkStream<F>
where
    F: FnMut(SseEvent) -> Result<Option<ChatChunk>, TornadoError> + Send + Unpin + 'static,
{
    pub(crate) fn boxed(
        body: HttpBodyStream,
        metadata: ProviderMetadata,
        end: StreamEnd,
        provider: &'static str,
        convert: F,
    ) -> ChatStream {
        Box::pin(Self {
            decoder: SseDecoder::new(body, provider),
            convert,
            metadata,
            end,
            terminal_seen: false,
            finished: false,
        })
    }
}

impl<F> Stream for ChunkStream<F>
where
    F: FnMut(SseEvent) -> Result<Option<ChatChunk>, TornadoError> + Unpin,
{
    type Item = Result<ChatChunk, TornadoError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        loop {
            match Pin::new(&mut this.decoder).poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => match (this.convert)(event) {
                    Ok(Some(chunk)) => {
                        if chunk.is_terminal {
                            this.terminal_seen = true;
                        }
                        return Poll::Ready(Some(Ok(chunk)));
                    }
                    Ok(None) => continue,
                    Err(err) => {
                        this.finished = true;
                        return Poll::Ready(Some(Err(err)));
                    }
                },
                Poll::Ready(Some(Err(err))) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(None) => {
                    this.finished = true;
                    if this.terminal_seen {
                        return Poll::Ready(None);
                    }
                    return Poll::Ready(Some(match this.end {
                        StreamEnd::Close => Ok(ChatChunk::terminal(this.metadata.clone())),
                        StreamEnd::Marker => Err(TornadoError::StreamClosed {
                            message: format!(
                                "{} stream ended without a terminal event",
                                this.metadata.provider
                            ),
                        }),
                    }));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

#[derive(Debug, Default)]
struct PartialChoice {
    role: Option<ChatRole>,
    text: String,
    reasoning: String,
    signature: Option<String>,
    refusal: String,
    finish_reason: Option<FinishReason>,
    tool_calls: BTreeMap<usize, PartialToolCall>,
}

/// Folds streamed [`ChatChunk`]s back into a [`ChatResult`].
///
/// # Examples
///
/// ```
/// # use tornado_llm::stream::ChatStreamAccumulator;
/// # use tornado_llm::types::{ChatChunk, ChatEvent, MessageDelta, ProviderMetadata};
/// let mut acc = ChatStreamAccumulator::default();
/// for piece in ["Hel", "lo"] {
///     acc.push(&ChatChunk {
///         events: vec![ChatEvent::MessageDelta(MessageDelta { text: Some(piece.into()), ..Default::default() })],
///         usage: None,
///         is_terminal: false,
///         model: None,
///         provider: ProviderMetadata::default(),
///     });
/// }
/// assert_eq!(acc.finish().text(), "Hello");
/// ```
#[derive(Debug, Default)]
pub struct ChatStreamAccumulator {
    choices: BTreeMap<usize, PartialChoice>,
    id: Option<String>,
    model: Option<String>,
    usage: Option<ChatUsage>,
    provider: Option<ProviderMetadata>,
    custom: Vec<serde_json::Value>,
}

impl ChatStreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &ChatChunk) {
        if self.provider.is_none() {
            self.provider = Some(chunk.provider.clone());
        }
        if self.id.is_none() {
            self.id = chunk.provider.request_id.clone();
        }
        if self.model.is_none() {
            self.model = chunk.model.clone();
        }
        if let Some(usage) = &chunk.usage {
            self.usage.get_or_insert_with(ChatUsage::default).merge(usage);
        }
        for event in &chunk.events {
            match event {
                ChatEvent::MessageDelta(delta) => {
                    let choice = self.choices.entry(delta.index).or_default();
                    if delta.role.is_some() {
                        choice.role = delta.role;
                    }
                    if let Some(text) = &delta.text {
                        choice.text.push_str(text);
                    }
                    if let Some(reasoning) = &delta.reasoning {
                        choice.reasoning.push_str(reasoning);
                    }
                    if delta.reasoning_signature.is_some() {
                        choice.signature = delta.reasoning_signature.clone();
                    }
                    if let Some(refusal) = &delta.refusal {
                        choice.refusal.push_str(refusal);
                    }
                    if delta.finish_reason.is_some() {
                        choice.finish_reason = delta.finish_reason.clone();
                    }
                }
                ChatEvent::ToolCallDelta(delta) => {
                    let call = self
                        .choices
                        .entry(delta.choice_index)
                        .or_default()
                        .tool_calls
                        .entry(delta.index)
                        .or_default();
                    if delta.id.is_some() {
                        call.id = delta.id.clone();
                    }
                    if let Some(name) = &delta.name {
                        call.name.push_str(name);
                    }
                    if let Some(arguments) = &delta.arguments_delta {
                        call.arguments.push_str(arguments);
                    }
                }
                ChatEvent::Custom { data } => self.custom.push(data.clone()),
            }
        }
    }

    /// Vendor events that had no normalized counterpart, in arrival order.
    pub fn custom_events(&self) -> &[serde_json::Value] {
        &self.custom
    }

    pub fn finish(self) -> ChatResult {
        let choices = self
            .choices
            .into_iter()
            .map(|(index, partial)| {
                let mut content = Vec::new();
                if !partial.reasoning.is_empty() {
                    content.push(ContentPart::reasoning(partial.reasoning, partial.signature));
                }
                if !partial.text.is_empty() {
                    content.push(ContentPart::text(partial.text));
                }
                if !partial.refusal.is_empty() {
                    content.push(ContentPart::Refusal {
                        text: partial.refusal,
                    });
                }
                let has_tool_calls = !partial.tool_calls.is_empty();
                content.extend(partial.tool_calls.into_values().map(|call| {
                    ContentPart::ToolCall(ToolCall {
                        id: call.id,
                        name: call.name,
                        arguments: parse_tool_arguments(&call.arguments),
                    })
                }));
                let finish_reason = partial.finish_reason.or(if has_tool_calls {
                    Some(FinishReason::ToolCalls)
                } else {
                    None
                });
                ChatChoice {
                    index,
                    message: ChatMessage::new(
                        partial.role.unwrap_or(ChatRole::Assistant),
                        content,
                    ),
                    finish_reason,
                }
            })
            .collect();

        let mut provider = self.provider.unwrap_or_default();
        if provider.request_id.is_none() {
            provider.request_id = self.id.clone();
        }
        ChatResult {
            id: self.id,
            model: self.model,
            choices,
            usage: self.usage,
            provider,
        }
    }
}

/// Drives `stream` to completion and returns the accumulated result.
pub async fn collect_stream(mut stream: ChatStream) -> Result<ChatResult, TornadoError> {
    let mut accumulator = ChatStreamAccumulator::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        accumulator.push(&chunk);
        if chunk.is_terminal {
            break;
        }
    }
    Ok(accumulator.finish())
}
