use serde_json::{Map, Value, json};

use crate::error::TornadoError;
use crate::types::{
    ChatMessage, ChatRequest, ChatRole, ContentPart, ImageContent, ImageSource, MediaContent,
    MediaSource, ResponseFormat, ToolChoice, ToolDefinition,
};

pub(crate) fn build_gemini_body(request: &ChatRequest) -> Result<Value, TornadoError> {
    let mut body = Map::new();
    let mut system_parts = Vec::new();
    let mut contents = Vec::new();

    for (position, message) in request.messages.iter().enumerate() {
        match message.role {
            ChatRole::System => {
                let text = message.text();
                if !text.is_empty() {
                    system_parts.push(json!({ "text": text }));
                }
            }
            ChatRole::Tool => contents.push(convert_tool_message(message, position, request)?),
            ChatRole::User | ChatRole::Assistant => contents.push(convert_message(message)?),
        }
    }

    if contents.is_empty() {
        return Err(TornadoError::validation(
            "Gemini requires at least one non-system message",
        ));
    }
    body.insert("contents".to_string(), Value::Array(contents));
    if !system_parts.is_empty() {
        body.insert(
            "systemInstruction".to_string(),
            json!({ "parts": system_parts }),
        );
    }
    if let Some(config) = build_generation_config(request) {
        body.insert("generationConfig".to_string(), config);
    }
    if !request.tools.is_empty() {
        body.insert(
            "tools".to_string(),
            json!([{ "functionDeclarations": convert_tools(&request.tools) }]),
        );
    }
    if let Some(choice) = &request.tool_choice {
        body.insert(
            "toolConfig".to_string(),
            json!({ "functionCallingConfig": convert_tool_choice(choice) }),
        );
    }
    for (key, value) in &request.options.extra {
        body.insert(key.clone(), value.clone());
    }
    Ok(Value::Object(body))
}

fn convert_message(message: &ChatMessage) -> Result<Value, TornadoError> {
    let role = match message.role {
        ChatRole::Assistant => "model",
        _ => "user",
    };
    let mut parts = Vec::with_capacity(message.content.len());
    for part in &message.content {
        if let Some(converted) = convert_content_part(part, message.role)? {
            parts.push(converted);
        }
    }
    Ok(json!({ "role": role, "parts": parts }))
}

/// Tool results become `functionResponse` parts; Gemini matches them by
/// function name, recovered from the nearest earlier assistant call with the
/// same id.
fn convert_tool_message(
    message: &ChatMessage,
    position: usize,
    request: &ChatRequest,
) -> Result<Value, TornadoError> {
    let parts = message
        .tool_results()
        .map(|result| {
            let call_id = result
                .call_id
                .as_deref()
                .ok_or_else(|| TornadoError::validation("tool result is missing call_id"))?;
            let name = request.tool_name_for_call(position, call_id).ok_or_else(|| {
                TornadoError::validation(format!(
                    "no assistant tool call with id {call_id} precedes its result"
                ))
            })?;
            let response = match &result.output {
                Value::Object(_) => result.output.clone(),
                other => json!({ "content": other }),
            };
            Ok(json!({ "functionResponse": { "name": name, "response": response } }))
        })
        .collect::<Result<Vec<_>, TornadoError>>()?;
    if parts.is_empty() {
        return Err(TornadoError::validation(
            "tool message must contain at least one tool result",
        ));
    }
    Ok(json!({ "role": "user", "parts": parts }))
}

/// `Ok(None)` drops parts Gemini cannot take back: unsigned thoughts and
/// refusals.
fn convert_content_part(part: &ContentPart, role: ChatRole) -> Result<Option<Value>, TornadoError> {
    let value = match part {
        ContentPart::Text { text } => json!({ "text": text }),
        ContentPart::Image(ImageContent { source, .. }) => match source {
            ImageSource::Base64 { data, mime_type } => json!({
                "inlineData": { "mimeType": mime_type.as_deref().unwrap_or("image/png"), "data": data }
            }),
            ImageSource::Url { url } => file_data(url, None),
            ImageSource::FileId { file_id } => file_data(file_id, None),
        },
        ContentPart::Audio(media) | ContentPart::Video(media) => convert_media(media),
        ContentPart::File { file_id } => file_data(file_id, None),
        ContentPart::ToolCall(call) => {
            if role != ChatRole::Assistant {
                return Err(TornadoError::validation(
                    "tool calls are only valid on assistant messages",
                ));
            }
            let args = match &call.arguments {
                Value::String(raw) => crate::types::parse_tool_arguments(raw),
                Value::Null => json!({}),
                other => other.clone(),
            };
            json!({ "functionCall": { "name": call.name, "args": args } })
        }
        ContentPart::ToolResult(_) => {
            return Err(TornadoError::validation(
                "tool results must be sent with the tool role",
            ));
        }
        ContentPart::Reasoning {
            text,
            signature: Some(signature),
        } => json!({ "text": text, "thought": true, "thoughtSignature": signature }),
        ContentPart::Reasoning { signature: None, .. } | ContentPart::Refusal { .. } => {
            return Ok(None);
        }
        ContentPart::Data { data } => data.clone(),
    };
    Ok(Some(value))
}

fn convert_media(media: &MediaContent) -> Value {
    let MediaContent { source, mime_type } = media;
    match source {
        MediaSource::Inline { data } => json!({
            "inlineData": {
                "mimeType": mime_type.as_deref().unwrap_or("application/octet-stream"),
                "data": data
            }
        }),
        MediaSource::Url { url } => file_data(url, mime_type.as_deref()),
        MediaSource::FileId { file_id } => file_data(file_id, mime_type.as_deref()),
    }
}

fn file_data(uri: &str, mime_type: Option<&str>) -> Value {
    let mut data = Map::new();
    data.insert("fileUri".to_string(), Value::String(uri.to_string()));
    if let Some(mime) = mime_type {
        data.insert("mimeType".to_string(), Value::String(mime.to_string()));
    }
    json!({ "fileData": data })
}

fn build_generation_config(request: &ChatRequest) -> Option<Value> {
    let options = &request.options;
    let mut config = Map::new();
    if let Some(temperature) = options.temperature {
        config.insert("temperature".to_string(), Value::from(temperature));
    }
    if let Some(top_p) = options.top_p {
        config.insert("topP".to_string(), Value::from(top_p));
    }
    if let Some(max_tokens) = options.max_tokens {
        config.insert("maxOutputTokens".to_string(), Value::from(max_tokens));
    }
    if !options.stop.is_empty() {
        config.insert("stopSequences".to_string(), json!(options.stop));
    }
    if let Some(seed) = options.seed {
        config.insert("seed".to_string(), Value::from(seed));
    }
    if let Some(penalty) = options.presence_penalty {
        config.insert("presencePenalty".to_string(), Value::from(penalty));
    }
    if let Some(penalty) = options.frequency_penalty {
        config.insert("frequencyPenalty".to_string(), Value::from(penalty));
    }
    if let Some(budget) = options.reasoning_budget_tokens {
        config.insert(
            "thinkingConfig".to_string(),
            json!({ "thinkingBudget": budget }),
        );
    }
    match &request.response_format {
        Some(ResponseFormat::JsonObject) => {
            config.insert(
                "responseMimeType".to_string(),
                Value::String("application/json".to_string()),
            );
        }
        Some(ResponseFormat::JsonSchema { schema, .. }) => {
            config.insert(
                "responseMimeType".to_string(),
                Value::String("application/json".to_string()),
            );
            config.insert("responseSchema".to_string(), schema.clone());
        }
        Some(ResponseFormat::Text) | None => {}
    }

    if config.is_empty() {
        None
    } else {
        Some(Value::Object(config))
    }
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
            if let Some(parameters) = &tool.parameters {
                obj.insert("parameters".to_string(), parameters.clone());
            }
            Value::Object(obj)
        })
        .collect()
}

fn convert_tool_choice(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!({ "mode": "AUTO" }),
        ToolChoice::Required => json!({ "mode": "ANY" }),
        ToolChoice::None => json!({ "mode": "NONE" }),
        ToolChoice::Function { name } => json!({ "mode": "ANY", "allowedFunctionNames": [name] }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatOptions, ToolCall};

    #[test]
    fn roles_and_system_instruction() {
        let request = ChatRequest::new(vec![
            ChatMessage::system("You are terse."),
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
        ]);
        let body = build_gemini_body(&request).unwrap();
        assert_eq!(
            body["systemInstruction"],
            json!({"parts": [{"text": "You are terse."}]})
        );
        assert_eq!(body["contents"][0]["role"], json!("user"));
        assert_eq!(body["contents"][1]["role"], json!("model"));
        assert!(body.get("generationConfig").is_none());
    }

    #[test]
    fn function_response_resolves_name_from_call_id() {
        let request = ChatRequest::new(vec![
            ChatMessage::user("weather in Quito?"),
            ChatMessage::assistant_tool_calls(vec![ToolCall::new(
                "call_0",
                "get_weather",
                json!({"city": "Quito"}),
            )]),
            ChatMessage::tool_result("call_0", "18C and cloudy"),
        ]);
        let body = build_gemini_body(&request).unwrap();
        assert_eq!(
            body["contents"][1]["parts"][0],
            json!({"functionCall": {"name": "get_weather", "args": {"city": "Quito"}}})
        );
        assert_eq!(
            body["contents"][2],
            json!({"role": "user", "parts": [{"functionResponse": {"name": "get_weather", "response": {"content": "18C and cloudy"}}}]})
        );
    }

    #[test]
    fn repeated_synthetic_ids_resolve_to_their_own_round() {
        use crate::provider::google_gemini::response::map_response;
        use crate::provider::google_gemini::types::GeminiGenerateContentResponse;

        let turn = |name: &str| {
            let resp: GeminiGenerateContentResponse = serde_json::from_value(json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"functionCall": {"name": name, "args": {}}}]},
                    "finishReason": "STOP"
                }]
            }))
            .unwrap();
            map_response(resp, "google_gemini", "endpoint")
        };

        let mut request = ChatRequest::new(vec![ChatMessage::user("weather, then the time")]);
        for (name, output) in [("get_weather", "sunny"), ("get_time", "12:00")] {
            let result = turn(name);
            let call_id = result.tool_calls()[0].id.clone().unwrap();
            assert_eq!(call_id, "call_0");
            request.push(result.first_message().unwrap().clone());
            request.push(ChatMessage::tool_result(call_id, output));
        }

        let body = build_gemini_body(&request).unwrap();
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 5);
        assert_eq!(
            contents[2]["parts"][0]["functionResponse"],
            json!({"name": "get_weather", "response": {"content": "sunny"}})
        );
        assert_eq!(
            contents[4]["parts"][0]["functionResponse"],
            json!({"name": "get_time", "response": {"content": "12:00"}})
        );
    }

    #[test]
    fn parsed_thoughts_are_replayed_only_when_signed() {
        let message = ChatMessage::new(
            ChatRole::Assistant,
            vec![
                ContentPart::reasoning("unsigned", None),
                ContentPart::reasoning("signed", Some("c2ln".into())),
                ContentPart::Refusal {
                    text: "no".into(),
                },
                ContentPart::text("answer"),
            ],
        );
        let request = ChatRequest::new(vec![ChatMessage::user("q"), message]);
        let body = build_gemini_body(&request).unwrap();
        assert_eq!(
            body["contents"][1]["parts"],
            json!([
                {"text": "signed", "thought": true, "thoughtSignature": "c2ln"},
                {"text": "answer"}
            ])
        );
    }

    #[test]
    fn orphan_tool_result_is_rejected() {
        let request = ChatRequest::new(vec![
            ChatMessage::user("hi"),
            ChatMessage::tool_result("call_7", "x"),
        ]);
        assert!(matches!(
            build_gemini_body(&request),
            Err(TornadoError::Validation { .. })
        ));
    }

    #[test]
    fn generation_config_and_tools() {
        let request = ChatRequest::new(vec![ChatMessage::user("list")])
            .with_options(ChatOptions {
                temperature: Some(0.0),
                top_p: Some(0.9),
                max_tokens: Some(100),
                stop: vec!["\n\n".into()],
                seed: Some(1),
                reasoning_budget_tokens: Some(512),
                ..Default::default()
            })
            .with_response_format(ResponseFormat::JsonSchema {
                name: "list".into(),
                schema: json!({"type": "ARRAY"}),
                strict: None,
            })
            .with_tools(vec![ToolDefinition::function("lookup").with_description("find things")])
            .with_tool_choice(ToolChoice::Function {
                name: "lookup".into(),
            });
        let body = build_gemini_body(&request).unwrap();
        let config = &body["generationConfig"];
        assert_eq!(config["maxOutputTokens"], json!(100));
        assert_eq!(config["stopSequences"], json!(["\n\n"]));
        assert_eq!(config["responseMimeType"], json!("application/json"));
        assert_eq!(config["responseSchema"], json!({"type": "ARRAY"}));
        assert_eq!(config["thinkingConfig"]["thinkingBudget"], json!(512));
        assert_eq!(
            body["tools"][0]["functionDeclarations"][0]["description"],
            json!("find things")
        );
        assert_eq!(
            body["toolConfig"]["functionCallingConfig"],
            json!({"mode": "ANY", "allowedFunctionNames": ["lookup"]})
        );
    }

    #[test]
    fn media_parts_use_inline_or_file_data() {
        let message = ChatMessage::user("transcribe").with_part(ContentPart::Audio(MediaContent {
            source: MediaSource::Inline {
                data: "UklGR".into(),
            },
            mime_type: Some("audio/wav".into()),
        }));
        let video = ContentPart::Video(MediaContent {
            source: MediaSource::Url {
                url: "gs://bucket/clip.mp4".into(),
            },
            mime_type: Some("video/mp4".into()),
        });
        let body = build_gemini_body(&ChatRequest::new(vec![message.with_part(video)])).unwrap();
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts[1]["inlineData"]["mimeType"], json!("audio/wav"));
        assert_eq!(
            parts[2]["fileData"],
            json!({"fileUri": "gs://bucket/clip.mp4", "mimeType": "video/mp4"})
        );
    }
}
