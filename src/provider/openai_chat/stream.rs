use crate::error::TornadoError;
use crate::http::HttpBodyStream;
use crate::provider::ChatStream;
use crate::stream::{ChunkStream, SseEvent, StreamEnd};
use crate::types::{ChatChunk, ChatEvent, ChatRole, MessageDelta, ProviderMetadata, ToolCallDelta};

use super::response::{convert_finish_reason, convert_usage};
use super::types::OpenAiStreamChunk;

/// Wraps a Chat Completions SSE body.
///
/// Compatible vendors do not all send `[DONE]`, so a closed body also ends the
/// stream cleanly.
pub(crate) fn create_stream(
    body: HttpBodyStream,
    provider: &'static str,
    endpoint: &str,
) -> ChatStream {
    let metadata = ProviderMetadata::new(provider, endpoint);
    let template = metadata.clone();
    ChunkStream::boxed(body, metadata, StreamEnd::Close, provider, move |event| {
        convert_event(event, provider, &template)
    })
}

fn convert_event(
    event: SseEvent,
    provider: &'static str,
    metadata: &ProviderMetadata,
) -> Result<Option<ChatChunk>, TornadoError> {
    if event.is_done() {
        return Ok(Some(ChatChunk::terminal(metadata.clone())));
    }
    let chunk: OpenAiStreamChunk =
        serde_json::from_str(&event.data).map_err(|err| TornadoError::Provider {
            provider,
            message: format!("failed to parse stream chunk: {err}"),
        })?;
    Ok(Some(convert_stream_chunk(chunk, metadata)))
}

pub(crate) fn convert_stream_chunk(
    chunk: OpenAiStreamChunk,
    metadata: &ProviderMetadata,
) -> ChatChunk {
    let mut events = Vec::new();
    for choice in chunk.choices {
        let finish_reason = choice.finish_reason.as_deref().map(convert_finish_reason);
        let Some(delta) = choice.delta else {
            if finish_reason.is_some() {
                events.push(ChatEvent::MessageDelta(MessageDelta {
                    index: choice.index,
                    finish_reason,
                    ..Default::default()
                }));
            }
            continue;
        };

        let role = delta.role.as_deref().map(|role| match role {
            "tool" => ChatRole::Tool,
            _ => ChatRole::Assistant,
        });
        let text = delta.content.filter(|text| !text.is_empty());
        let reasoning = delta.reasoning_content.filter(|text| !text.is_empty());
        let refusal = delta.refusal.filter(|text| !text.is_empty());
        if role.is_some()
            || text.is_some()
            || reasoning.is_some()
            || refusal.is_some()
            || finish_reason.is_some()
        {
            events.push(ChatEvent::MessageDelta(MessageDelta {
                index: choice.index,
                role,
                text,
                reasoning,
                reasoning_signature: None,
                refusal,
                finish_reason,
            }));
        }

        for (position, call) in delta.tool_calls.unwrap_or_default().into_iter().enumerate() {
            let (name, arguments_delta) = match call.function {
                Some(function) => (function.name, function.arguments),
                None => (None, None),
            };
            events.push(ChatEvent::ToolCallDelta(ToolCallDelta {
                choice_index: choice.index,
                index: call.index.unwrap_or(position),
                id: call.id,
                name,
                arguments_delta,
            }));
        }
    }

    let mut metadata = metadata.clone();
    metadata.request_id = chunk.id;
    ChatChunk {
        events,
        usage: chunk.usage.map(convert_usage),
        is_terminal: false,
        model: chunk.model,
        provider: metadata,
    }
}
