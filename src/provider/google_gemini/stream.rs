use std::collections::HashMap;

use crate::error::TornadoError;
use crate::http::HttpBodyStream;
use crate::provider::ChatStream;
use crate::stream::{ChunkStream, SseEvent, StreamEnd};
use crate::types::{ChatChunk, ChatEvent, ChatRole, MessageDelta, ProviderMetadata, ToolCallDelta};

use super::response::{convert_finish_reason, convert_function_call, convert_usage};
use super::types::GeminiGenerateContentResponse;

/// Wraps a `streamGenerateContent?alt=sse` body. Gemini has no end marker;
/// the body closing ends the stream.
pub(crate) fn create_stream(
    body: HttpBodyStream,
    provider: &'static str,
    endpoint: &str,
) -> ChatStream {
    let metadata = ProviderMetadata::new(provider, endpoint);
    let mut state = StreamState {
        provider,
        metadata: metadata.clone(),
        calls_per_candidate: HashMap::new(),
    };
    ChunkStream::boxed(body, metadata, StreamEnd::Close, provider, move |event| {
        state.convert(event)
    })
}

struct StreamState {
    provider: &'static str,
    metadata: ProviderMetadata,
    /// Function calls seen so far per candidate, for slot indices and ids.
    calls_per_candidate: HashMap<usize, usize>,
}

impl StreamState {
    fn convert(&mut self, event: SseEvent) -> Result<Option<ChatChunk>, TornadoError> {
        let chunk: GeminiGenerateContentResponse =
            serde_json::from_str(&event.data).map_err(|err| TornadoError::Provider {
                provider: self.provider,
                message: format!("failed to parse stream chunk: {err}"),
            })?;
        if self.metadata.request_id.is_none() {
            self.metadata.request_id = chunk.response_id.clone();
        }

        let mut events = Vec::new();
        for (position, candidate) in chunk.candidates.into_iter().enumerate() {
            let index = candidate.index.unwrap_or(position);
            let parts = candidate.content.map(|content| content.parts).unwrap_or_default();
            for part in parts {
                if let Some(call) = part.function_call {
                    let slot = self.calls_per_candidate.entry(index).or_insert(0);
                    let call = convert_function_call(call, *slot);
                    events.push(ChatEvent::ToolCallDelta(ToolCallDelta {
                        choice_index: index,
                        index: *slot,
                        id: call.id,
                        name: Some(call.name),
                        arguments_delta: Some(call.arguments.to_string()),
                    }));
                    *slot += 1;
                } else if let Some(text) = part.text {
                    let thought = part.thought == Some(true);
                    events.push(ChatEvent::MessageDelta(MessageDelta {
                        index,
                        role: Some(ChatRole::Assistant),
                        text: (!thought).then(|| text.clone()),
                        reasoning: thought.then_some(text),
                        reasoning_signature: part.thought_signature,
                        refusal: None,
                        finish_reason: None,
                    }));
                }
            }
            if let Some(reason) = candidate.finish_reason.as_deref() {
                let has_calls = self.calls_per_candidate.get(&index).is_some_and(|n| *n > 0);
                events.push(ChatEvent::MessageDelta(MessageDelta {
                    index,
                    finish_reason: Some(convert_finish_reason(reason, has_calls)),
                    ..Default::default()
                }));
            }
        }

        let mut out = ChatChunk::new(events, self.metadata.clone());
        out.usage = chunk.usage_metadata.as_ref().map(convert_usage);
        out.model = chunk.model_version;
        Ok(Some(out))
    }
}
