use serde_json::Value;

use crate::error::TornadoError;
use crate::http::HttpBodyStream;
use crate::provider::ChatStream;
use crate::stream::{ChunkStream, SseEvent, StreamEnd};
use crate::types::{ChatChunk, ChatEvent, ChatRole, MessageDelta, ProviderMetadata, ToolCallDelta};

use super::error::stream_error;
use super::response::{convert_finish_reason, convert_usage};
use super::types::{AnthropicBlockDelta, AnthropicStreamEvent};

/// Wraps a Messages API SSE body. The stream must end with `message_stop`.
pub(crate) fn create_stream(
    body: HttpBodyStream,
    provider: &'static str,
    endpoint: &str,
) -> ChatStream {
    let metadata = ProviderMetadata::new(provider, endpoint);
    let mut state = StreamState {
        metadata: metadata.clone(),
    };
    ChunkStream::boxed(body, metadata, StreamEnd::Marker, provider, move |event| {
        state.convert(event)
    })
}

struct StreamState {
    metadata: ProviderMetadata,
}

impl StreamState {
    fn chunk(&self, events: Vec<ChatEvent>) -> ChatChunk {
        ChatChunk::new(events, self.metadata.clone())
    }

    fn convert(&mut self, event: SseEvent) -> Result<Option<ChatChunk>, TornadoError> {
        let value: Value = serde_json::from_str(&event.data).map_err(|err| {
            TornadoError::provider("anthropic_messages", format!("invalid stream event: {err}"))
        })?;
        let parsed = match serde_json::from_value::<AnthropicStreamEvent>(value.clone()) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(
                    provider = "anthropic_messages",
                    event = event.event.as_deref().unwrap_or("unknown"),
                    error = %err,
                    "unrecognized stream event"
                );
                return Ok(Some(self.chunk(vec![ChatEvent::Custom { data: value }])));
            }
        };

        match parsed {
            AnthropicStreamEvent::MessageStart { message } => {
                self.metadata.request_id = message.id;
                let mut chunk = self.chunk(vec![ChatEvent::MessageDelta(MessageDelta {
                    role: Some(ChatRole::Assistant),
                    ..Default::default()
                })]);
                chunk.usage = message.usage.as_ref().map(convert_usage);
                chunk.model = message.model;
                Ok(Some(chunk))
            }
            AnthropicStreamEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block.kind.as_str() {
                "tool_use" => Ok(Some(self.chunk(vec![ChatEvent::ToolCallDelta(
                    ToolCallDelta {
                        choice_index: 0,
                        index,
                        id: content_block.id,
                        name: content_block.name,
                        arguments_delta: None,
                    },
                )]))),
                "text" => Ok(content_block
                    .text
                    .filter(|text| !text.is_empty())
                    .map(|text| self.chunk(vec![text_delta(text)]))),
                _ => Ok(None),
            },
            AnthropicStreamEvent::ContentBlockDelta { index, delta } => {
                let event = match delta {
                    AnthropicBlockDelta::TextDelta { text } => text_delta(text),
                    AnthropicBlockDelta::InputJsonDelta { partial_json } => {
                        ChatEvent::ToolCallDelta(ToolCallDelta {
                            choice_index: 0,
                            index,
                            arguments_delta: Some(partial_json),
                            ..Default::default()
                        })
                    }
                    AnthropicBlockDelta::ThinkingDelta { thinking } => {
                        ChatEvent::MessageDelta(MessageDelta {
                            reasoning: Some(thinking),
                            ..Default::default()
                        })
                    }
                    AnthropicBlockDelta::SignatureDelta { signature } => {
                        ChatEvent::MessageDelta(MessageDelta {
                            reasoning_signature: Some(signature),
                            ..Default::default()
                        })
                    }
                    AnthropicBlockDelta::Unknown => return Ok(None),
                };
                Ok(Some(self.chunk(vec![event])))
            }
            AnthropicStreamEvent::ContentBlockStop { .. } | AnthropicStreamEvent::Ping => Ok(None),
            AnthropicStreamEvent::MessageDelta { delta, usage } => {
                let mut events = Vec::new();
                if let Some(reason) = delta.stop_reason.as_deref() {
                    events.push(ChatEvent::MessageDelta(MessageDelta {
                        finish_reason: Some(convert_finish_reason(reason)),
                        ..Default::default()
                    }));
                }
                let mut chunk = self.chunk(events);
                chunk.usage = usage.as_ref().map(convert_usage);
                Ok(Some(chunk))
            }
            AnthropicStreamEvent::MessageStop => Ok(Some(ChatChunk::terminal(self.metadata.clone()))),
            AnthropicStreamEvent::Error { error } => Err(stream_error(error)),
        }
    }
}

fn text_delta(text: String) -> ChatEvent {
    ChatEvent::MessageDelta(MessageDelta {
        text: Some(text),
        ..Default::default()
    })
}
