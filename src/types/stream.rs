use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ChatRole, ChatUsage, FinishReason, ProviderMetadata};

/// Incremental piece of a streamed chat completion.
///
/// Providers emit chunks until one arrives with `is_terminal` set. Feed them to
/// [`crate::stream::ChatStreamAccumulator`] to rebuild the final
/// [`super::ChatResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatChunk {
    pub events: Vec<ChatEvent>,
    pub usage: Option<ChatUsage>,
    pub is_terminal: bool,
    /// Model reported by the vendor, on the chunks that carry it.
    #[serde(default)]
    pub model: Option<String>,
    pub provider: ProviderMetadata,
}

impl ChatChunk {
    pub(crate) fn new(events: Vec<ChatEvent>, provider: ProviderMetadata) -> Self {
        Self {
            events,
            usage: None,
            is_terminal: false,
            model: None,
            provider,
        }
    }

    pub(crate) fn terminal(provider: ProviderMetadata) -> Self {
        Self {
            events: Vec::new(),
            usage: None,
            is_terminal: true,
            model: None,
            provider,
        }
    }

    /// Text carried by the chunk's message deltas.
    pub fn text(&self) -> String {
        self.events
            .iter()
            .filter_map(|event| match event {
                ChatEvent::MessageDelta(delta) => delta.text.as_deref(),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChatEvent {
    MessageDelta(MessageDelta),
    ToolCallDelta(ToolCallDelta),
    /// Vendor event without a normalized counterpart.
    Custom { data: Value },
}

/// Text, role or finish-reason update for one choice.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MessageDelta {
    /// Choice index.
    pub index: usize,
    pub role: Option<ChatRole>,
    pub text: Option<String>,
    /// Reasoning or thinking text, kept apart from the answer.
    pub reasoning: Option<String>,
    /// Signature closing the reasoning block (Anthropic `signature_delta`).
    pub reasoning_signature: Option<String>,
    pub refusal: Option<String>,
    pub finish_reason: Option<FinishReason>,
}

/// Fragment of a tool call. Arguments arrive as string pieces to concatenate.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ToolCallDelta {
    /// Choice index.
    pub choice_index: usize,
    /// Slot of the tool call within the choice.
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments_delta: Option<String>,
}
