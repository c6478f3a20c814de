use serde_json::{Map, Value, json};

use crate::error::TornadoError;
use crate::types::{
    ChatMessage, ChatRequest, ChatRole, ContentPart, ImageContent, ImageSource, ResponseFormat,
    ToolChoice, ToolDefinition,
};

const PROVIDER: &str = "anthropic_messages";

/// Used when the caller leaves `max_tokens` unset; the API requires a value.
pub(crate) const DEFAULT_MAX_TOKENS: u32 = 4096;

pub(crate) fn build_anthropic_body(
    request: &ChatRequest,
    model: &str,
    stream: bool,
) -> Result<Value, TornadoError> {
    let options = &request.options;
    let mut body = Map::new();
    body.insert("model".to_string(), Value::String(model.to_string()));
    body.insert(
        "max_tokens".to_string(),
        Value::from(options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)),
    );

    let (system, messages) = convert_messages(&request.messages)?;
    if let Some(system) = system {
        body.insert("system".to_string(), Value::String(system));
    }
    if messages.is_empty() {
        return Err(TornadoError::validation(
            "Anthropic requires at least one non-system message",
        ));
    }
    body.insert("messages".to_string(), Value::Array(messages));

    if let Some(temperature) = options.temperature {
        body.insert("temperature".to_string(), Value::from(temperature));
    }
    if let Some(top_p) = options.top_p {
        body.insert("top_p".to_string(), Value::from(top_p));
    }
    if !options.stop.is_empty() {
        body.insert("stop_sequences".to_string(), json!(options.stop));
    }
    if let Some(budget) = options.reasoning_budget_tokens {
        body.insert(
            "thinking".to_string(),
            json!({ "type": "enabled", "budget_tokens": budget }),
        );
    }
    if let Some(user_id) = user_id(request) {
        body.insert("metadata".to_string(), json!({ "user_id": user_id }));
    }
    if options.presence_penalty.is_some()
        || options.frequency_penalty.is_some()
        || options.seed.is_some()
    {
        tracing::debug!(provider = PROVIDER, "ignoring penalties and seed, not supported");
    }

    match &request.response_format {
        None | Some(ResponseFormat::Text) => {}
        Some(_) => {
            return Err(TornadoError::UnsupportedFeature {
                provider: PROVIDER,
                feature: "response_format",
            });
        }
    }

    if !request.tools.is_empty() {
        body.insert("tools".to_string(), Value::Array(convert_tools(&request.tools)));
    }
    let disable_parallel = options.parallel_tool_calls == Some(false) && !request.tools.is_empty();
    if request.tool_choice.is_some() || disable_parallel {
        let mut choice = convert_tool_choice(request.tool_choice.as_ref().unwrap_or(&ToolChoice::Auto));
        if disable_parallel {
            choice["disable_parallel_tool_use"] = Value::Bool(true);
        }
        body.insert("tool_choice".to_string(), choice);
    }

    if stream {
        body.insert("stream".to_string(), Value::Bool(true));
    }
    for (key, value) in &options.extra {
        body.insert(key.clone(), value.clone());
    }
    Ok(Value::Object(body))
}

fn user_id(request: &ChatRequest) -> Option<String> {
    request.options.user.clone().or_else(|| {
        request
            .metadata
            .as_ref()
            .and_then(|meta| meta.get("user_id"))
            .and_then(Value::as_str)
            .map(str::to_string)
    })
}

/// Splits out the system prompt and folds consecutive tool results into a
/// single `user` turn of `tool_result` blocks.
fn convert_messages(messages: &[ChatMessage]) -> Result<(Option<String>, Vec<Value>), TornadoError> {
    let mut system_parts = Vec::new();
    let mut converted: Vec<Value> = Vec::new();
    let mut previous_was_tool = false;

    for message in messages {
        match message.role {
            ChatRole::System => {
                let text = message.text();
                if !text.is_empty() {
                    system_parts.push(text);
                }
                previous_was_tool = false;
            }
            ChatRole::Tool => {
                let blocks = tool_result_blocks(message)?;
                match converted.last_mut() {
                    Some(last) if previous_was_tool => {
                        if let Some(content) = last["content"].as_array_mut() {
                            content.extend(blocks);
                        }
                    }
                    _ => converted.push(json!({ "role": "user", "content": blocks })),
                }
                previous_was_tool = true;
            }
            ChatRole::User | ChatRole::Assistant => {
                let role = message.role.as_str();
                let mut blocks = Vec::with_capacity(message.content.len());
                for part in &message.content {
                    if let Some(block) = convert_content_part(part, message.role)? {
                        blocks.push(block);
                    }
                }
                converted.push(json!({ "role": role, "content": blocks }));
                previous_was_tool = false;
            }
        }
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };
    Ok((system, converted))
}

fn tool_result_blocks(message: &ChatMessage) -> Result<Vec<Value>, TornadoError> {
    let blocks: Vec<Value> = message
        .tool_results()
        .map(|result| {
            let call_id = result
                .call_id
                .clone()
                .ok_or_else(|| TornadoError::validation("tool result is missing call_id"))?;
            let mut block = json!({
                "type": "tool_result",
                "tool_use_id": call_id,
                "content": result.output_text(),
            });
            if result.is_error {
                block["is_error"] = Value::Bool(true);
            }
            Ok(block)
        })
        .collect::<Result<_, TornadoError>>()?;
    if blocks.is_empty() {
        return Err(TornadoError::validation(
            "tool message must contain at least one tool result",
        ));
    }
    Ok(blocks)
}

/// `Ok(None)` drops parts the Messages API cannot take back. Thinking is only
/// replayed with its signature, and a refusal was never a block.
fn convert_content_part(part: &ContentPart, role: ChatRole) -> Result<Option<Value>, TornadoError> {
    let block = match part {
        ContentPart::Text { text } => json!({ "type": "text", "text": text }),
        ContentPart::Image(ImageContent { source, .. }) => match source {
            ImageSource::Base64 { data, mime_type } => json!({
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": mime_type.as_deref().unwrap_or("image/png"),
                    "data": data,
                }
            }),
            ImageSource::Url { url } => json!({
                "type": "image",
                "source": { "type": "url", "url": url }
            }),
            ImageSource::FileId { .. } => {
                return Err(TornadoError::UnsupportedFeature {
                    provider: PROVIDER,
                    feature: "image file references",
                });
            }
        },
        ContentPart::ToolCall(call) => {
            if role != ChatRole::Assistant {
                return Err(TornadoError::validation(
                    "tool calls are only valid on assistant messages",
                ));
            }
            let id = call
                .id
                .clone()
                .ok_or_else(|| TornadoError::validation("tool call is missing id"))?;
            let input = match &call.arguments {
                Value::Object(_) => call.arguments.clone(),
                Value::Null => json!({}),
                Value::String(raw) => crate::types::parse_tool_arguments(raw),
                other => json!({ "value": other }),
            };
            json!({ "type": "tool_use", "id": id, "name": call.name, "input": input })
        }
        ContentPart::ToolResult(_) => {
            return Err(TornadoError::validation(
                "tool results must be sent with the tool role",
            ));
        }
        ContentPart::Reasoning {
            text,
            signature: Some(signature),
        } if role == ChatRole::Assistant => {
            json!({ "type": "thinking", "thinking": text, "signature": signature })
        }
        ContentPart::Reasoning { .. } | ContentPart::Refusal { .. } => return Ok(None),
        ContentPart::Data { data } => data.clone(),
        ContentPart::Audio(_) => {
            return Err(TornadoError::UnsupportedFeature {
                provider: PROVIDER,
                feature: "audio input",
            });
        }
        ContentPart::Video(_) => {
            return Err(TornadoError::UnsupportedFeature {
                provider: PROVIDER,
                feature: "video input",
            });
        }
        ContentPart::File { .. } => {
            return Err(TornadoError::UnsupportedFeature {
                provider: PROVIDER,
                feature: "file references",
            });
        }
    };
    Ok(Some(block))
}

fn convert_tools(tools: &[ToolDefinition]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            let mut obj = Map::new();
            obj.insert("name".to_string(), Value::String(tool.name.clone()));
            if let Some(description) = &tool.description {
                obj.insert(
                    "description".to_string(),
                    Value::String(description.clone()),
                );
            }
            obj.insert("input_schema".to_string(), tool.parameters_or_empty());
            Value::Object(obj)
        })
        .collect()
}

fn convert_tool_choice(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!({ "type": "auto" }),
        ToolChoice::Required => json!({ "type": "any" }),
        ToolChoice::None => json!({ "type": "none" }),
        ToolChoice::Function { name } => json!({ "type": "tool", "name": name }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatOptions, ToolCall, ToolResult};

    #[test]
    fn system_messages_fold_into_top_level_field() {
        let request = ChatRequest::new(vec![
            ChatMessage::system("rule one"),
            ChatMessage::system("rule two"),
            ChatMessage::user("hello"),
        ]);
        let body = build_anthropic_body(&request, "claude-sonnet-4-5", false).unwrap();
        assert_eq!(body["system"], json!("rule one\n\nrule two"));
        assert_eq!(body["max_tokens"], json!(DEFAULT_MAX_TOKENS));
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(
            body["messages"][0],
            json!({"role": "user", "content": [{"type": "text", "text": "hello"}]})
        );
    }

    #[test]
    fn consecutive_tool_results_share_one_user_turn() {
        let request = ChatRequest::new(vec![
            ChatMessage::user("two lookups"),
            ChatMessage::assistant_tool_calls(vec![
                ToolCall::new("toolu_1", "a", json!({})),
                ToolCall::new("toolu_2", "b", json!({"x": 1})),
            ]),
            ChatMessage::tool_result("toolu_1", "one"),
            ChatMessage::new(
                ChatRole::Tool,
                vec![ContentPart::ToolResult(ToolResult {
                    call_id: Some("toolu_2".into()),
                    output: json!("failed"),
                    is_error: true,
                })],
            ),
        ]);
        let body = build_anthropic_body(&request, "claude", false).unwrap();
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["content"][1]["type"], json!("tool_use"));
        assert_eq!(messages[1]["content"][1]["input"], json!({"x": 1}));
        assert_eq!(messages[2]["role"], json!("user"));
        let results = messages[2]["content"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["tool_use_id"], json!("toolu_1"));
        assert_eq!(results[1]["is_error"], json!(true));
    }

    #[test]
    fn options_map_to_anthropic_fields() {
        let request = ChatRequest::new(vec![ChatMessage::user("hi")])
            .with_options(ChatOptions {
                max_tokens: Some(1024),
                stop: vec!["###".into()],
                parallel_tool_calls: Some(false),
                reasoning_budget_tokens: Some(2048),
                user: Some("user-42".into()),
                ..Default::default()
            })
            .with_tools(vec![ToolDefinition::function("search")])
            .with_tool_choice(ToolChoice::Required);
        let body = build_anthropic_body(&request, "claude", true).unwrap();
        assert_eq!(body["max_tokens"], json!(1024));
        assert_eq!(body["stop_sequences"], json!(["###"]));
        assert_eq!(body["thinking"]["budget_tokens"], json!(2048));
        assert_eq!(body["metadata"]["user_id"], json!("user-42"));
        assert_eq!(
            body["tool_choice"],
            json!({"type": "any", "disable_parallel_tool_use": true})
        );
        assert_eq!(body["tools"][0]["input_schema"]["type"], json!("object"));
        assert_eq!(body["stream"], json!(true));
    }

    #[test]
    fn structured_output_is_unsupported() {
        let request = ChatRequest::new(vec![ChatMessage::user("hi")])
            .with_response_format(ResponseFormat::JsonObject);
        assert!(matches!(
            build_anthropic_body(&request, "claude", false),
            Err(TornadoError::UnsupportedFeature { feature: "response_format", .. })
        ));
    }

    #[test]
    fn parsed_thinking_turn_is_replayed_with_signature() {
        use crate::provider::anthropic_messages::response::map_response;
        use crate::provider::anthropic_messages::types::AnthropicMessageResponse;

        let resp: AnthropicMessageResponse = serde_json::from_value(json!({
            "id": "msg_1",
            "model": "claude-sonnet-4-5",
            "content": [
                {"type": "thinking", "thinking": "need the weather", "signature": "EqQBCgIYAh"},
                {"type": "redacted_thinking", "data": "b3BhcXVl"},
                {"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {"city": "Lima"}}
            ],
            "stop_reason": "tool_use"
        }))
        .unwrap();
        let result = map_response(resp, PROVIDER, "endpoint");

        let mut request = ChatRequest::new(vec![ChatMessage::user("weather in Lima?")]);
        request.push(result.first_message().unwrap().clone());
        request.push(ChatMessage::tool_result("toolu_1", "22C"));
        let body = build_anthropic_body(&request, "claude", false).unwrap();
        assert_eq!(
            body["messages"][1]["content"],
            json!([
                {"type": "thinking", "thinking": "need the weather", "signature": "EqQBCgIYAh"},
                {"type": "redacted_thinking", "data": "b3BhcXVl"},
                {"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {"city": "Lima"}}
            ])
        );
    }

    #[test]
    fn unsigned_reasoning_and_refusals_are_dropped() {
        let message = ChatMessage::new(
            ChatRole::Assistant,
            vec![
                ContentPart::reasoning("from another vendor", None),
                ContentPart::Refusal {
                    text: "no".into(),
                },
                ContentPart::text("ok"),
            ],
        );
        let request = ChatRequest::new(vec![ChatMessage::user("q"), message]);
        let body = build_anthropic_body(&request, "claude", false).unwrap();
        assert_eq!(
            body["messages"][1]["content"],
            json!([{"type": "text", "text": "ok"}])
        );
    }

    #[test]
    fn system_only_conversation_is_rejected() {
        let request = ChatRequest::new(vec![ChatMessage::system("alone")]);
        assert!(matches!(
            build_anthropic_body(&request, "claude", false),
            Err(TornadoError::Validation { .. })
        ));
    }
}
