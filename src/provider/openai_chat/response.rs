use serde_json::Value;

use crate::types::{
    ChatChoice, ChatMessage, ChatResult, ChatRole, ChatUsage, ContentPart, FinishReason,
    ProviderMetadata, ToolCall, parse_tool_arguments,
};

use super::types::{
    OpenAiChatResponse, OpenAiMessageContent, OpenAiResponseMessage, OpenAiToolCallResponse,
    OpenAiUsage,
};

pub(crate) fn map_response(
    resp: OpenAiChatResponse,
    provider: &'static str,
    endpoint: &str,
) -> ChatResult {
    let raw = serde_json::to_value(&resp).ok();
    let choices = resp
        .choices
        .into_iter()
        .map(|choice| ChatChoice {
            index: choice.index,
            message: choice
                .message
                .map(convert_response_message)
                .unwrap_or_else(|| ChatMessage::new(ChatRole::Assistant, Vec::new())),
            finish_reason: choice.finish_reason.as_deref().map(convert_finish_reason),
        })
        .collect();

    let mut provider_meta = ProviderMetadata::new(provider, endpoint);
    provider_meta.request_id = resp.id.clone();
    provider_meta.raw = raw;

    ChatResult {
        id: resp.id,
        model: resp.model,
        choices,
        usage: resp.usage.map(convert_usage),
        provider: provider_meta,
    }
}

fn convert_response_message(message: OpenAiResponseMessage) -> ChatMessage {
    let role = match message.role.as_deref() {
        Some("tool") => ChatRole::Tool,
        Some("user") => ChatRole::User,
        Some("system") => ChatRole::System,
        _ => ChatRole::Assistant,
    };

    let mut content = Vec::new();
    if let Some(reasoning) = message.reasoning_content.filter(|text| !text.is_empty()) {
        content.push(ContentPart::reasoning(reasoning, None));
    }
    match message.content {
        Some(OpenAiMessageContent::Text(text)) if !text.is_empty() => {
            content.push(ContentPart::text(text));
        }
        Some(OpenAiMessageContent::Parts(parts)) => {
            for part in parts {
                match (part.kind.as_str(), part.text) {
                    ("text", Some(text)) => content.push(ContentPart::text(text)),
                    ("refusal", _) => {
                        let text = part
                            .extra
                            .get("refusal")
                            .and_then(Value::as_str)
                            .unwrap_or_default();
                        content.push(ContentPart::Refusal {
                            text: text.to_string(),
                        });
                    }
                    (_, text) => {
                        let mut data = serde_json::Map::new();
                        data.insert("type".to_string(), Value::String(part.kind.clone()));
                        if let Some(text) = text {
                            data.insert("text".to_string(), Value::String(text));
                        }
                        data.extend(part.extra);
                        content.push(ContentPart::Data {
                            data: Value::Object(data),
                        });
                    }
                }
            }
        }
        _ => {}
    }
    if let Some(refusal) = message.refusal.filter(|text| !text.is_empty()) {
        content.push(ContentPart::Refusal { text: refusal });
    }
    content.extend(
        message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(convert_tool_call_response)
            .map(ContentPart::ToolCall),
    );

    ChatMessage::new(role, content)
}

fn convert_tool_call_response(call: OpenAiToolCallResponse) -> ToolCall {
    let (name, arguments) = match call.function {
        Some(function) => (
            function.name.unwrap_or_default(),
            function.arguments.unwrap_or_default(),
        ),
        None => (String::new(), String::new()),
    };
    ToolCall {
        id: call.id,
        name,
        arguments: parse_tool_arguments(&arguments),
    }
}

pub(crate) fn convert_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "stop" => FinishReason::Stop,
        "length" => FinishReason::Length,
        "tool_calls" | "function_call" => FinishReason::ToolCalls,
        "content_filter" => FinishReason::ContentFilter,
        "error" => FinishReason::Error,
        other => FinishReason::Other(other.to_string()),
    }
}

pub(crate) fn convert_usage(usage: OpenAiUsage) -> ChatUsage {
    ChatUsage {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        reasoning_tokens: usage
            .completion_tokens_details
            .and_then(|details| details.reasoning_tokens),
        cached_tokens: usage
            .prompt_tokens_details
            .and_then(|details| details.cached_tokens),
        total_tokens: usage.total_tokens,
    }
}
