use serde_json::{Value, json};

use crate::types::{
    ChatChoice, ChatMessage, ChatResult, ChatRole, ChatUsage, ContentPart, FinishReason,
    ProviderMetadata, ToolCall,
};

use super::types::{GeminiFunctionCall, GeminiGenerateContentResponse, GeminiPart, GeminiUsageMetadata};

pub(crate) fn map_response(
    resp: GeminiGenerateContentResponse,
    provider: &'static str,
    endpoint: &str,
) -> ChatResult {
    let raw = serde_json::to_value(&resp).ok();
    let mut choices: Vec<ChatChoice> = resp
        .candidates
        .into_iter()
        .enumerate()
        .map(|(position, candidate)| {
            let parts = candidate.content.map(|content| content.parts).unwrap_or_default();
            let content: Vec<ContentPart> = parts
                .into_iter()
                .scan(0usize, |calls, part| Some(convert_part(part, calls)))
                .collect();
            let has_calls = content
                .iter()
                .any(|part| matches!(part, ContentPart::ToolCall(_)));
            ChatChoice {
                index: candidate.index.unwrap_or(position),
                message: ChatMessage::new(ChatRole::Assistant, content),
                finish_reason: candidate
                    .finish_reason
                    .as_deref()
                    .map(|reason| convert_finish_reason(reason, has_calls)),
            }
        })
        .collect();

    // A blocked prompt yields no candidates at all.
    if choices.is_empty() {
        if let Some(reason) = resp.prompt_feedback.and_then(|feedback| feedback.block_reason) {
            tracing::warn!(provider, block_reason = %reason, "prompt blocked");
            choices.push(ChatChoice {
                index: 0,
                message: ChatMessage::new(ChatRole::Assistant, Vec::new()),
                finish_reason: Some(FinishReason::ContentFilter),
            });
        }
    }

    let mut provider_meta = ProviderMetadata::new(provider, endpoint);
    provider_meta.request_id = resp.response_id.clone();
    provider_meta.raw = raw;

    ChatResult {
        id: resp.response_id,
        model: resp.model_version,
        choices,
        usage: resp.usage_metadata.as_ref().map(convert_usage),
        provider: provider_meta,
    }
}

fn convert_part(part: GeminiPart, calls: &mut usize) -> ContentPart {
    if let Some(call) = part.function_call {
        let call = convert_function_call(call, *calls);
        *calls += 1;
        return ContentPart::ToolCall(call);
    }
    match part.text {
        Some(text) if part.thought == Some(true) => {
            ContentPart::reasoning(text, part.thought_signature)
        }
        Some(text) => ContentPart::text(text),
        None => ContentPart::Data {
            data: Value::Object(part.extra.into_iter().collect()),
        },
    }
}

/// Gemini does not always identify calls, so ids fall back to `call_{n}` by
/// position within the candidate.
pub(crate) fn convert_function_call(call: GeminiFunctionCall, position: usize) -> ToolCall {
    let arguments = match call.args {
        Value::Null => json!({}),
        other => other,
    };
    ToolCall {
        id: Some(call.id.unwrap_or_else(|| format!("call_{position}"))),
        name: call.name,
        arguments,
    }
}

/// Gemini reports `STOP` even when the turn ends in function calls.
pub(crate) fn convert_finish_reason(reason: &str, has_tool_calls: bool) -> FinishReason {
    match reason {
        "STOP" if has_tool_calls => FinishReason::ToolCalls,
        "STOP" => FinishReason::Stop,
        "MAX_TOKENS" => FinishReason::Length,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII"
        | "IMAGE_SAFETY" => FinishReason::ContentFilter,
        "MALFORMED_FUNCTION_CALL" => FinishReason::Error,
        other => FinishReason::Other(other.to_string()),
    }
}

pub(crate) fn convert_usage(usage: &GeminiUsageMetadata) -> ChatUsage {
    ChatUsage {
        prompt_tokens: usage.prompt_token_count,
        completion_tokens: usage.candidates_token_count,
        reasoning_tokens: usage.thoughts_token_count,
        cached_tokens: usage.cached_content_token_count,
        total_tokens: usage.total_token_count,
    }
}
