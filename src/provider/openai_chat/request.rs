use serde_json::{Map, Value, json};

use crate::error::TornadoError;
use crate::types::{
    ChatMessage, ChatRequest, ChatRole, ContentPart, ImageContent, ImageSource, MediaContent,
    MediaSource, ResponseFormat, ToolCall, ToolChoice, ToolDefinition,
};

pub(crate) fn build_openai_body(
    request: &ChatRequest,
    model: &str,
    stream: bool,
) -> Result<Value, TornadoError> {
    let mut body = Map::new();
    body.insert("model".to_string(), Value::String(model.to_string()));
    body.insert(
        "messages".to_string(),
        Value::Array(convert_messages(&request.messages)?),
    );

    let options = &request.options;
    if let Some(temperature) = options.temperature {
        body.insert("temperature".to_string(), Value::from(temperature));
    }
    if let Some(top_p) = options.top_p {
        body.insert("top_p".to_string(), Value::from(top_p));
    }
    if let Some(max_tokens) = options.max_tokens {
        body.insert("max_completion_tokens".to_string(), Value::from(max_tokens));
    }
    if let Some(penalty) = options.presence_penalty {
        body.insert("presence_penalty".to_string(), Value::from(penalty));
    }
    if let Some(penalty) = options.frequency_penalty {
        body.insert("frequency_penalty".to_string(), Value::from(penalty));
    }
    if !options.stop.is_empty() {
        body.insert("stop".to_string(), json!(options.stop));
    }
    if let Some(seed) = options.seed {
        body.insert("seed".to_string(), Value::from(seed));
    }
    if let Some(effort) = options.reasoning_effort {
        body.insert(
            "reasoning_effort".to_string(),
            Value::String(effort.as_str().to_string()),
        );
    }
    if let Some(user) = &options.user {
        body.insert("user".to_string(), Value::String(user.clone()));
    }

    if !request.tools.is_empty() {
        body.insert("tools".to_string(), Value::Array(convert_tools(&request.tools)));
        if let Some(parallel) = options.parallel_tool_calls {
            body.insert("parallel_tool_calls".to_string(), Value::from(parallel));
        }
    }
    if let Some(choice) = &request.tool_choice {
        body.insert("tool_choice".to_string(), convert_tool_choice(choice));
    }
    if let Some(format) = &request.response_format {
        body.insert(
            "response_format".to_string(),
            convert_response_format(format),
        );
    }
    if let Some(metadata) = &request.metadata {
        let meta: Map<String, Value> = metadata.clone().into_iter().collect();
        body.insert("metadata".to_string(), Value::Object(meta));
    }
    if stream {
        body.insert("stream".to_string(), Value::Bool(true));
        body.insert(
            "stream_options".to_string(),
            json!({ "include_usage": true }),
        );
    }
    for (key, value) in &options.extra {
        body.insert(key.clone(), value.clone());
    }
    Ok(Value::Object(body))
}

fn convert_messages(messages: &[ChatMessage]) -> Result<Vec<Value>, TornadoError> {
    let mut converted = Vec::with_capacity(messages.len());
    for message in messages {
        if message.role == ChatRole::Tool {
            converted.extend(convert_tool_message(message)?);
        } else {
            converted.push(convert_message(message)?);
        }
    }
    Ok(converted)
}

/// Each tool result becomes its own `role: tool` message.
fn convert_tool_message(message: &ChatMessage) -> Result<Vec<Value>, TornadoError> {
    let results: Vec<_> = message.tool_results().collect();
    if results.is_empty() {
        return Err(TornadoError::validation(
            "tool message must contain at least one tool result",
        ));
    }
    results
        .into_iter()
        .map(|result| {
            let call_id = result.call_id.clone().ok_or_else(|| {
                TornadoError::validation("tool result is missing call_id")
            })?;
            Ok(json!({
                "role": "tool",
                "tool_call_id": call_id,
                "content": result.output_text(),
            }))
        })
        .collect()
}

fn convert_message(message: &ChatMessage) -> Result<Value, TornadoError> {
    let mut obj = Map::new();
    obj.insert(
        "role".to_string(),
        Value::String(message.role.as_str().to_string()),
    );
    if let Some(name) = &message.name {
        obj.insert("name".to_string(), Value::String(name.clone()));
    }

    let mut parts = Vec::new();
    let mut tool_calls = Vec::new();
    let mut text_only = true;
    for part in &message.content {
        match part {
            ContentPart::ToolCall(call) => {
                if message.role != ChatRole::Assistant {
                    return Err(TornadoError::validation(
                        "tool calls are only valid on assistant messages",
                    ));
                }
                tool_calls.push(convert_tool_call(call));
            }
            ContentPart::ToolResult(_) => {
                return Err(TornadoError::validation(
                    "tool results must be sent with the tool role",
                ));
            }
            ContentPart::Text { .. } => parts.push(convert_content_part(part)?),
            // Chat Completions takes neither back as input.
            ContentPart::Reasoning { .. } | ContentPart::Refusal { .. } => {}
            _ => {
                text_only = false;
                parts.push(convert_content_part(part)?);
            }
        }
    }

    let content = if parts.is_empty() {
        Value::Null
    } else if text_only {
        Value::String(message.text())
    } else {
        Value::Array(parts)
    };
    obj.insert("content".to_string(), content);
    if !tool_calls.is_empty() {
        obj.insert("tool_calls".to_string(), Value::Array(tool_calls));
    }
    Ok(Value::Object(obj))
}

fn convert_content_part(part: &ContentPart) -> Result<Value, TornadoError> {
    match part {
        ContentPart::Text { text } => Ok(json!({ "type": "text", "text": text })),
        ContentPart::Image(ImageContent { source, detail }) => {
            let detail = detail.map(|d| d.as_str()).unwrap_or("auto");
            let url = match source {
                ImageSource::Url { url } => url.clone(),
                ImageSource::Base64 { data, mime_type } => {
                    let mime = mime_type.as_deref().unwrap_or("image/png");
                    format!("data:{mime};base64,{data}")
                }
                ImageSource::FileId { .. } => {
                    return Err(TornadoError::UnsupportedFeature {
                        provider: "openai_chat",
                        feature: "image file references",
                    });
                }
            };
            Ok(json!({ "type": "image_url", "image_url": { "url": url, "detail": detail } }))
        }
        ContentPart::Audio(MediaContent { source, mime_type }) => {
            let MediaSource::Inline { data } = source else {
                return Err(TornadoError::UnsupportedFeature {
                    provider: "openai_chat",
                    feature: "non-inline audio",
                });
            };
            let format = mime_type
                .as_deref()
                .map(|mime| mime.trim_start_matches("audio/"))
                .unwrap_or("wav");
            Ok(json!({ "type": "input_audio", "input_audio": { "data": data, "format": format } }))
        }
        ContentPart::Video(_) => Err(TornadoError::UnsupportedFeature {
            provider: "openai_chat",
            feature: "video input",
        }),
        ContentPart::File { file_id } => {
            Ok(json!({ "type": "file", "file": { "file_id": file_id } }))
        }
        ContentPart::Data { data } => Ok(data.clone()),
        ContentPart::ToolCall(_)
        | ContentPart::ToolResult(_)
        | ContentPart::Reasoning { .. }
        | ContentPart::Refusal { .. } => Err(TornadoError::validation(
            "content part cannot be sent inline",
        )),
    }
}

fn convert_tool_call(call: &ToolCall) -> Value {
    let mut obj = Map::new();
    if let Some(id) = &call.id {
        obj.insert("id".to_string(), Value::String(id.clone()));
    }
    obj.insert("type".to_string(), Value::String("function".to_string()));
    obj.insert(
        "function".to_string(),
        json!({ "name": call.name, "arguments": call.arguments_json() }),
    );
    Value::Object(obj)
}

fn convert_tools(tools: &[ToolDefinition]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            let mut function = Map::new();
            function.insert("name".to_string(), Value::String(tool.name.clone()));
            if let Some(description) = &tool.description {
                function.insert(
                    "description".to_string(),
                    Value::String(description.clone()),
                );
            }
            function.insert("parameters".to_string(), tool.parameters_or_empty());
            if let Some(strict) = tool.strict {
                function.insert("strict".to_string(), Value::Bool(strict));
            }
            json!({ "type": "function", "function": function })
        })
        .collect()
}

fn convert_tool_choice(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!("auto"),
        ToolChoice::Required => json!("required"),
        ToolChoice::None => json!("none"),
        ToolChoice::Function { name } => json!({
            "type": "function",
            "function": { "name": name }
        }),
    }
}

fn convert_response_format(format: &ResponseFormat) -> Value {
    match format {
        ResponseFormat::Text => json!({ "type": "text" }),
        ResponseFormat::JsonObject => json!({ "type": "json_object" }),
        ResponseFormat::JsonSchema {
            name,
            schema,
            strict,
        } => {
            let mut json_schema = json!({ "name": name, "schema": schema });
            if let Some(strict) = strict {
                json_schema["strict"] = Value::Bool(*strict);
            }
            json!({ "type": "json_schema", "json_schema": json_schema })
        }
    }
}
