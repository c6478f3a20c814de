use serde_json::{Value, json};

use crate::types::{
    ChatChoice, ChatMessage, ChatResult, ChatRole, ChatUsage, ContentPart, FinishReason,
    ProviderMetadata, ToolCall,
};

use super::types::{AnthropicContentBlock, AnthropicMessageResponse, AnthropicUsage};

pub(crate) fn map_response(
    resp: AnthropicMessageResponse,
    provider: &'static str,
    endpoint: &str,
) -> ChatResult {
    let raw = serde_json::to_value(&resp).ok();
    let content = resp.content.into_iter().map(convert_block).collect();
    let mut provider_meta = ProviderMetadata::new(provider, endpoint);
    provider_meta.request_id = resp.id.clone();
    provider_meta.raw = raw;

    ChatResult {
        id: resp.id,
        model: resp.model,
        choices: vec![ChatChoice {
            index: 0,
            message: ChatMessage::new(ChatRole::Assistant, content),
            finish_reason: resp.stop_reason.as_deref().map(convert_finish_reason),
        }],
        usage: resp.usage.as_ref().map(convert_usage),
        provider: provider_meta,
    }
}

fn convert_block(block: AnthropicContentBlock) -> ContentPart {
    match block.kind.as_str() {
        "text" => ContentPart::text(block.text.unwrap_or_default()),
        "tool_use" => ContentPart::ToolCall(ToolCall {
            id: block.id,
            name: block.name.unwrap_or_default(),
            arguments: block.input.unwrap_or_else(|| json!({})),
        }),
        "thinking" => ContentPart::reasoning(block.thinking.unwrap_or_default(), block.signature),
        _ => ContentPart::Data {
            data: serde_json::to_value(&block).unwrap_or(Value::Null),
        },
    }
}

pub(crate) fn convert_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "end_turn" | "stop_sequence" => FinishReason::Stop,
        "max_tokens" => FinishReason::Length,
        "tool_use" => FinishReason::ToolCalls,
        "refusal" => FinishReason::ContentFilter,
        other => FinishReason::Other(other.to_string()),
    }
}

/// Anthropic reports fresh and cached input separately; prompt tokens are their sum.
pub(crate) fn convert_usage(usage: &AnthropicUsage) -> ChatUsage {
    let prompt = match (
        usage.input_tokens,
        usage.cache_read_input_tokens,
        usage.cache_creation_input_tokens,
    ) {
        (None, None, None) => None,
        (input, read, created) => {
            Some(input.unwrap_or(0) + read.unwrap_or(0) + created.unwrap_or(0))
        }
    };
    let total = match (prompt, usage.output_tokens) {
        (Some(prompt), Some(output)) => Some(prompt + output),
        _ => None,
    };
    ChatUsage {
        prompt_tokens: prompt,
        completion_tokens: usage.output_tokens,
        reasoning_tokens: None,
        cached_tokens: usage.cache_read_input_tokens,
        total_tokens: total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_text_tool_use_and_thinking_blocks() {
        let resp: AnthropicMessageResponse = serde_json::from_value(json!({
            "id": "msg_01",
            "type": "message",
            "role": "assistant",
            "model": "claude-sonnet-4-5",
            "content": [
                {"type": "thinking", "thinking": "check weather", "signature": "sig"},
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {"city": "Lima"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 20, "output_tokens": 10, "cache_read_input_tokens": 5}
        }))
        .unwrap();

        let result = map_response(resp, "anthropic_messages", "https://api.anthropic.com/v1/messages");
        assert_eq!(result.id.as_deref(), Some("msg_01"));
        assert_eq!(result.text(), "Let me check.");
        let calls = result.tool_calls();
        assert_eq!(calls[0].id.as_deref(), Some("toolu_1"));
        assert_eq!(calls[0].arguments, json!({"city": "Lima"}));
        assert_eq!(result.finish_reason(), Some(&FinishReason::ToolCalls));
        let message = result.first_message().unwrap();
        assert_eq!(
            message.content[0],
            ContentPart::reasoning("check weather", Some("sig".into()))
        );

        let usage = result.usage.unwrap();
        assert_eq!(usage.prompt_tokens, Some(25));
        assert_eq!(usage.cached_tokens, Some(5));
        assert_eq!(usage.total_tokens, Some(35));
    }

    #[test]
    fn stop_reason_mapping() {
        assert_eq!(convert_finish_reason("end_turn"), FinishReason::Stop);
        assert_eq!(convert_finish_reason("stop_sequence"), FinishReason::Stop);
        assert_eq!(convert_finish_reason("max_tokens"), FinishReason::Length);
        assert_eq!(
            convert_finish_reason("pause_turn"),
            FinishReason::Other("pause_turn".into())
        );
    }
}
