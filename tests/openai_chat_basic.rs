use std::env;
use std::sync::Arc;

use dotenvy::dotenv;
use serde_json::json;
use tornado_llm::ChatProvider;
use tornado_llm::http::reqwest::ReqwestTransport;
use tornado_llm::provider::openai_chat::OpenAiChatProvider;
use tornado_llm::types::{
    ChatMessage, ChatOptions, ChatRequest, ContentPart, FinishReason, ImageContent, ImageDetail,
    ImageSource, ToolChoice, ToolDefinition,
};

const IMAGE_URL: &str = "https://upload.wikimedia.org/wikipedia/commons/thumb/d/dd/Gfp-wisconsin-madison-the-nature-boardwalk.jpg/640px-Gfp-wisconsin-madison-the-nature-boardwalk.jpg";

#[tokio::test]
#[ignore = "requires valid OpenAI-compatible endpoint"]
async fn openai_chat_basic_text_dialog_live() {
    dotenv().ok();
    let Some(provider) = build_provider_from_env() else {
        return;
    };

    let request = ChatRequest::new(vec![
        ChatMessage::system("You are a helpful assistant. Always answer in English."),
        ChatMessage::user("Introduce yourself in one sentence that starts with 'I'."),
    ]);

    let response = provider
        .chat(request)
        .await
        .expect("text dialog request should succeed");
    let text = response.text();
    assert!(
        text.contains('I'),
        "answer should contain 'I' to keep the check stable, got: {text}"
    );
    assert_eq!(response.finish_reason(), Some(&FinishReason::Stop));
}

#[tokio::test]
#[ignore = "requires valid OpenAI-compatible endpoint"]
async fn openai_chat_basic_image_understanding_dialog_live() {
    dotenv().ok();
    let Some(provider) = build_provider_from_env() else {
        return;
    };

    let request = ChatRequest::new(vec![
        ChatMessage::user("What is on the ground in this picture? Answer in one word.").with_part(
            ContentPart::Image(ImageContent {
                source: ImageSource::Url {
                    url: IMAGE_URL.to_string(),
                },
                detail: Some(ImageDetail::Low),
            }),
        ),
    ])
    .with_options(ChatOptions {
        max_tokens: Some(300),
        ..ChatOptions::default()
    });

    let response = provider
        .chat(request)
        .await
        .expect("image request should succeed");
    assert!(!response.text().is_empty(), "assistant should describe the image");
    assert_eq!(response.finish_reason(), Some(&FinishReason::Stop));
}

#[tokio::test]
#[ignore = "requires valid OpenAI-compatible endpoint"]
async fn openai_chat_basic_tool_call_dialog_live() {
    dotenv().ok();
    let Some(provider) = build_provider_from_env() else {
        return;
    };

    let request = ChatRequest::new(vec![ChatMessage::user(
        "What's the weather in Boston today? Call get_current_weather with Boston, MA.",
    )])
    .with_tools(vec![
        ToolDefinition::function("get_current_weather")
            .with_description("Current weather at a location")
            .with_parameters(json!({
                "type": "object",
                "properties": {
                    "location": {"type": "string", "description": "City and state, e.g. San Francisco, CA"},
                    "unit": {"type": "string", "enum": ["celsius", "fahrenheit"]}
                },
                "required": ["location"]
            })),
    ])
    .with_tool_choice(ToolChoice::Function {
        name: "get_current_weather".to_string(),
    });

    let response = provider.chat(request).await.expect("tool call should succeed");
    let calls = response.tool_calls();
    let call = calls.first().expect("response must contain a tool call");
    let location = call
        .arguments
        .get("location")
        .and_then(|value| value.as_str())
        .unwrap_or_default();
    assert!(
        location.contains("Boston"),
        "tool arguments should mention Boston, got: {location}"
    );
}

fn build_provider_from_env() -> Option<OpenAiChatProvider> {
    let Some(endpoint) = load_env_var("OPENAI_CHAT_ENDPOINT") else {
        eprintln!("skip live test: OPENAI_CHAT_ENDPOINT missing");
        return None;
    };
    let Some(api_key) = load_env_var("OPENAI_CHAT_KEY") else {
        eprintln!("skip live test: OPENAI_CHAT_KEY missing");
        return None;
    };
    let Some(model) = load_env_var("OPENAI_CHAT_MODEL") else {
        eprintln!("skip live test: OPENAI_CHAT_MODEL missing");
        return None;
    };

    let transport = Arc::new(ReqwestTransport::default_client().expect("reqwest client"));
    Some(
        OpenAiChatProvider::new(transport, api_key)
            .with_base_url(endpoint)
            .with_default_model(model),
    )
}

fn load_env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}
