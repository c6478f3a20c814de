//! Provider-agnostic chat model.
//!
//! Every vendor module translates its wire format into and out of these types, so
//! application code can switch between OpenAI, Anthropic and Gemini handles
//! without touching message construction or result handling.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

mod stream;

pub use stream::{ChatChunk, ChatEvent, MessageDelta, ToolCallDelta};

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// A single message in a conversation.
///
/// Content is an ordered list of [`ContentPart`]s so that text, images, tool
/// invocations and tool results can be mixed within one turn.
///
/// # Examples
///
/// ```
/// # use tornado_llm::types::{ChatMessage, ChatRole, ContentPart, ImageContent, ImageSource};
/// let msg = ChatMessage::user("Describe this image").with_part(ContentPart::Image(ImageContent {
///     source: ImageSource::Url { url: "https://example.com/img.png".into() },
///     detail: None,
/// }));
/// assert_eq!(msg.role, ChatRole::User);
/// assert_eq!(msg.content.len(), 2);
/// assert_eq!(msg.text(), "Describe this image");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    /// Optional participant name, forwarded where the vendor supports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub content: Vec<ContentPart>,
    /// Free-form metadata carried alongside the message. Never sent to vendors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: Vec<ContentPart>) -> Self {
        Self {
            role,
            name: None,
            content,
            metadata: None,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(ChatRole::System, vec![ContentPart::text(text)])
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(ChatRole::User, vec![ContentPart::text(text)])
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, vec![ContentPart::text(text)])
    }

    /// Assistant turn that only requests tool invocations.
    pub fn assistant_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self::new(
            ChatRole::Assistant,
            calls.into_iter().map(ContentPart::ToolCall).collect(),
        )
    }

    /// Tool turn answering the call identified by `call_id`.
    pub fn tool_result(call_id: impl Into<String>, output: impl Into<Value>) -> Self {
        Self::new(
            ChatRole::Tool,
            vec![ContentPart::ToolResult(ToolResult {
                call_id: Some(call_id.into()),
                output: output.into(),
                is_error: false,
            })],
        )
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_part(mut self, part: ContentPart) -> Self {
        self.content.push(part);
        self
    }

    /// Concatenates all text parts, separated by newlines.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCall> {
        self.content.iter().filter_map(|part| match part {
            ContentPart::ToolCall(call) => Some(call),
            _ => None,
        })
    }

    pub fn tool_results(&self) -> impl Iterator<Item = &ToolResult> {
        self.content.iter().filter_map(|part| match part {
            ContentPart::ToolResult(result) => Some(result),
            _ => None,
        })
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls().next().is_some()
    }

    /// Concatenated reasoning text, or `None` when the turn carried none.
    pub fn reasoning(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Reasoning { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        (!parts.is_empty()).then(|| parts.join("\n"))
    }
}

/// One piece of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image(ImageContent),
    Audio(MediaContent),
    Video(MediaContent),
    /// Vendor-hosted file reference.
    File { file_id: String },
    /// Tool invocation requested by the assistant.
    ToolCall(ToolCall),
    /// Output of a tool, authored by the tool role.
    ToolResult(ToolResult),
    /// Reasoning or thinking text kept apart from the answer. `signature` is
    /// the vendor's opaque token; Anthropic needs it to replay a thinking
    /// block in later turns.
    Reasoning {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    /// The model declined to answer.
    Refusal { text: String },
    /// Raw vendor block forwarded untouched in both directions.
    Data { data: Value },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn reasoning(text: impl Into<String>, signature: Option<String>) -> Self {
        Self::Reasoning {
            text: text.into(),
            signature,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageContent {
    pub source: ImageSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<ImageDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageSource {
    Url {
        url: String,
    },
    Base64 {
        data: String,
        mime_type: Option<String>,
    },
    FileId {
        file_id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageDetail {
    Low,
    High,
    Auto,
}

impl ImageDetail {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::High => "high",
            Self::Auto => "auto",
        }
    }
}

/// Audio or video payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaContent {
    pub source: MediaSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaSource {
    /// Base64 payload.
    Inline { data: String },
    Url { url: String },
    FileId { file_id: String },
}

/// Function the model may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema of the arguments object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    /// Request strict schema adherence where the vendor supports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

impl ToolDefinition {
    pub fn function(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            parameters: None,
            strict: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_parameters(mut self, schema: Value) -> Self {
        self.parameters = Some(schema);
        self
    }

    /// Parameters schema, or an empty object schema when none was given.
    pub(crate) fn parameters_or_empty(&self) -> Value {
        self.parameters
            .clone()
            .unwrap_or_else(|| serde_json::json!({ "type": "object", "properties": {} }))
    }
}

/// Tool invocation reconstructed from a vendor response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Vendor call identifier. Gemini does not issue one, so a synthetic
    /// `call_{n}` id is assigned there.
    pub id: Option<String>,
    pub name: String,
    /// Parsed arguments. Invalid JSON from the model is kept as a string.
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: Some(id.into()),
            name: name.into(),
            arguments,
        }
    }

    /// Arguments rendered as the JSON string most vendors expect on the wire.
    pub fn arguments_json(&self) -> String {
        match &self.arguments {
            Value::String(raw) => raw.clone(),
            Value::Null => "{}".to_string(),
            other => other.to_string(),
        }
    }
}

/// Parses streamed or stringified tool arguments.
pub(crate) fn parse_tool_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: Option<String>,
    pub output: Value,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    /// Output as text: strings verbatim, anything else as compact JSON.
    pub fn output_text(&self) -> String {
        match &self.output {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolChoice {
    /// The model decides.
    Auto,
    /// The model must call at least one tool.
    Required,
    /// Tools are disabled for this turn.
    None,
    /// Force a specific function.
    Function { name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    Text,
    JsonObject,
    JsonSchema {
        name: String,
        schema: Value,
        #[serde(default)]
        strict: Option<bool>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Sampling and generation knobs. Unset fields fall back to vendor defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChatOptions {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    pub presence_penalty: Option<f32>,
    pub frequency_penalty: Option<f32>,
    #[serde(default)]
    pub stop: Vec<String>,
    pub seed: Option<i64>,
    pub parallel_tool_calls: Option<bool>,
    pub reasoning_effort: Option<ReasoningEffort>,
    /// Thinking budget for vendors that take one (Anthropic, Gemini).
    pub reasoning_budget_tokens: Option<u32>,
    /// End-user identifier for abuse monitoring.
    pub user: Option<String>,
    /// Vendor-specific top-level body fields, merged last.
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

/// Provider-agnostic chat request.
///
/// # Examples
///
/// ```
/// # use tornado_llm::types::{ChatMessage, ChatOptions, ChatRequest, ToolDefinition};
/// # use serde_json::json;
/// let request = ChatRequest::new(vec![
///     ChatMessage::system("You are concise."),
///     ChatMessage::user("What's the weather in Prague?"),
/// ])
/// .with_model("gpt-4o-mini")
/// .with_options(ChatOptions { temperature: Some(0.2), ..Default::default() })
/// .with_tools(vec![ToolDefinition::function("get_weather")
///     .with_parameters(json!({"type": "object", "properties": {"city": {"type": "string"}}}))]);
/// assert_eq!(request.messages.len(), 2);
/// assert_eq!(request.model.as_deref(), Some("gpt-4o-mini"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChatRequest {
    /// Model override; providers fall back to their configured default.
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub options: ChatOptions,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: Option<ToolChoice>,
    pub response_format: Option<ResponseFormat>,
    /// Request metadata for vendors that accept it (OpenAI `metadata`,
    /// Anthropic `metadata.user_id`).
    pub metadata: Option<HashMap<String, Value>>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_options(mut self, options: ChatOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = Some(choice);
        self
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Looks up the function name of the assistant tool call answered by the
    /// message at `position`.
    ///
    /// Only messages before `position` are searched, nearest first. Synthetic
    /// ids such as Gemini's `call_0` repeat across tool rounds, so the closest
    /// earlier call with the id is the one being answered.
    pub(crate) fn tool_name_for_call(&self, position: usize, call_id: &str) -> Option<&str> {
        self.messages[..position.min(self.messages.len())]
            .iter()
            .rev()
            .flat_map(|message| message.tool_calls())
            .find(|call| call.id.as_deref() == Some(call_id))
            .map(|call| call.name.as_str())
    }
}

/// Normalized chat completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResult {
    /// Vendor response identifier.
    pub id: Option<String>,
    /// Model that produced the result, as reported by the vendor.
    pub model: Option<String>,
    pub choices: Vec<ChatChoice>,
    pub usage: Option<ChatUsage>,
    pub provider: ProviderMetadata,
}

impl ChatResult {
    pub fn first_message(&self) -> Option<&ChatMessage> {
        self.choices.first().map(|choice| &choice.message)
    }

    /// Text of the first choice, empty when the model only called tools.
    pub fn text(&self) -> String {
        self.first_message()
            .map(ChatMessage::text)
            .unwrap_or_default()
    }

    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.first_message()
            .map(|message| message.tool_calls().collect())
            .unwrap_or_default()
    }

    pub fn finish_reason(&self) -> Option<&FinishReason> {
        self.choices
            .first()
            .and_then(|choice| choice.finish_reason.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: usize,
    pub message: ChatMessage,
    pub finish_reason: Option<FinishReason>,
}

/// Token accounting. Fields stay `None` when the vendor does not report them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ChatUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub reasoning_tokens: Option<u64>,
    pub cached_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

impl ChatUsage {
    /// Overlays the values reported in `other`; streamed usage arrives piecemeal.
    pub fn merge(&mut self, other: &ChatUsage) {
        fn take(slot: &mut Option<u64>, value: Option<u64>) {
            if value.is_some() {
                *slot = value;
            }
        }
        take(&mut self.prompt_tokens, other.prompt_tokens);
        take(&mut self.completion_tokens, other.completion_tokens);
        take(&mut self.reasoning_tokens, other.reasoning_tokens);
        take(&mut self.cached_tokens, other.cached_tokens);
        take(&mut self.total_tokens, other.total_tokens);
        if other.total_tokens.is_none() {
            if let (Some(prompt), Some(completion)) = (self.prompt_tokens, self.completion_tokens)
            {
                self.total_tokens = Some(prompt + completion);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Error,
    Other(String),
}

/// Where a result came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProviderMetadata {
    /// Provider name such as `openai_chat` or `groq`.
    pub provider: String,
    pub request_id: Option<String>,
    pub endpoint: Option<String>,
    /// Raw vendor payload, kept for debugging.
    pub raw: Option<Value>,
}

impl ProviderMetadata {
    pub(crate) fn new(provider: &str, endpoint: &str) -> Self {
        Self {
            provider: provider.to_string(),
            request_id: None,
            endpoint: Some(endpoint.to_string()),
            raw: None,
        }
    }
}

/// Feature matrix used to route requests to capable handles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CapabilityDescriptor {
    pub supports_stream: bool,
    pub supports_image_input: bool,
    pub supports_audio_input: bool,
    pub supports_video_input: bool,
    pub supports_tools: bool,
    pub supports_structured_output: bool,
    pub supports_parallel_tool_calls: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_text_joins_text_parts_only() {
        let message = ChatMessage::user("first")
            .with_part(ContentPart::File {
                file_id: "file-1".into(),
            })
            .with_part(ContentPart::text("second"));
        assert_eq!(message.text(), "first\nsecond");
    }

    #[test]
    fn tool_result_message_carries_call_id() {
        let message = ChatMessage::tool_result("call_1", json!({"temp": 21}));
        assert_eq!(message.role, ChatRole::Tool);
        let result = message.tool_results().next().expect("tool result");
        assert_eq!(result.call_id.as_deref(), Some("call_1"));
        assert_eq!(result.output_text(), r#"{"temp":21}"#);
    }

    #[test]
    fn tool_name_lookup_scans_assistant_calls() {
        let request = ChatRequest::new(vec![
            ChatMessage::user("weather?"),
            ChatMessage::assistant_tool_calls(vec![ToolCall::new(
                "call_9",
                "get_weather",
                json!({"city": "Oslo"}),
            )]),
            ChatMessage::tool_result("call_9", "rainy"),
        ]);
        assert_eq!(request.tool_name_for_call(2, "call_9"), Some("get_weather"));
        assert_eq!(request.tool_name_for_call(2, "missing"), None);
        assert_eq!(request.tool_name_for_call(1, "call_9"), None);
    }

    #[test]
    fn tool_name_lookup_prefers_nearest_reused_id() {
        let request = ChatRequest::new(vec![
            ChatMessage::user("weather, then time"),
            ChatMessage::assistant_tool_calls(vec![ToolCall::new("call_0", "get_weather", json!({}))]),
            ChatMessage::tool_result("call_0", "sunny"),
            ChatMessage::assistant_tool_calls(vec![ToolCall::new("call_0", "get_time", json!({}))]),
            ChatMessage::tool_result("call_0", "12:00"),
        ]);
        assert_eq!(request.tool_name_for_call(2, "call_0"), Some("get_weather"));
        assert_eq!(request.tool_name_for_call(4, "call_0"), Some("get_time"));
    }

    #[test]
    fn reasoning_parts_are_not_text() {
        let message = ChatMessage::new(
            ChatRole::Assistant,
            vec![
                ContentPart::reasoning("step one", Some("sig".into())),
                ContentPart::text("42"),
            ],
        );
        assert_eq!(message.text(), "42");
        assert_eq!(message.reasoning().as_deref(), Some("step one"));
        assert_eq!(ChatMessage::assistant("hi").reasoning(), None);
    }

    #[test]
    fn arguments_parse_falls_back_to_string() {
        assert_eq!(parse_tool_arguments(r#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(parse_tool_arguments(""), json!({}));
        assert_eq!(parse_tool_arguments("{broken"), json!("{broken"));
    }

    #[test]
    fn usage_merge_fills_total() {
        let mut usage = ChatUsage {
            prompt_tokens: Some(12),
            ..Default::default()
        };
        usage.merge(&ChatUsage {
            completion_tokens: Some(8),
            ..Default::default()
        });
        assert_eq!(usage.prompt_tokens, Some(12));
        assert_eq!(usage.total_tokens, Some(20));
    }

    #[test]
    fn message_round_trips_through_serde() {
        let message = ChatMessage::assistant_tool_calls(vec![ToolCall::new(
            "call_1",
            "lookup",
            json!({"q": "rust"}),
        )]);
        let value = serde_json::to_value(&message).expect("serialize");
        assert_eq!(value["role"], json!("assistant"));
        assert_eq!(value["content"][0]["type"], json!("tool_call"));
        let back: ChatMessage = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, message);
    }
}
