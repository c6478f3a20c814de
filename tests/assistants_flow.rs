mod common;

use async_trait::async_trait;
use serde_json::{Value, json};
use tornado_llm::TornadoError;
use tornado_llm::assistants::{
    AssistantTool, AssistantsEndpoint, CreateAssistantRequest, CreateMessageRequest,
    CreateRunRequest, CreateThreadRequest, ListQuery, MessageDelta, OpenAiConnection, Run,
    RunStatus, RunStreamError, RunStreamHandler, RunStreaming, RunToolCall, ThreadMessage,
    ThreadsEndpoint, ToolOutput,
};
use tornado_llm::http::HttpMethod;
use tornado_llm::types::ToolDefinition;

use common::{Reply, ScriptedTransport, header, init_tracing};

fn connection(transport: std::sync::Arc<ScriptedTransport>) -> OpenAiConnection {
    init_tracing();
    OpenAiConnection::new(transport, "sk-mock").with_base_url("http://mock.openai")
}

/// SSE body in the Assistants format, closed by the `done` event.
fn run_stream(events: &[(&str, Value)]) -> Reply {
    let mut text = String::new();
    for (name, data) in events {
        text.push_str(&format!("event: {name}\ndata: {data}\n\n"));
    }
    text.push_str("event: done\ndata: [DONE]\n\n");
    Reply::sse_text(&text)
}

fn run(status: &str) -> Value {
    json!({
        "id": "run_1",
        "object": "thread.run",
        "thread_id": "thread_1",
        "assistant_id": "asst_1",
        "status": status
    })
}

fn requires_weather() -> Value {
    let mut run = run("requires_action");
    run["required_action"] = json!({
        "type": "submit_tool_outputs",
        "submit_tool_outputs": {"tool_calls": [{
            "id": "call_1",
            "type": "function",
            "function": {"name": "get_weather", "arguments": "{\"city\":\"Rome\"}"}
        }]}
    });
    run
}

fn message(status: &str, text: &str) -> Value {
    let content = if text.is_empty() {
        json!([])
    } else {
        json!([{"type": "text", "text": {"value": text, "annotations": []}}])
    };
    json!({
        "id": "msg_1",
        "object": "thread.message",
        "thread_id": "thread_1",
        "role": "assistant",
        "status": status,
        "content": content
    })
}

fn text_delta(value: &str) -> Value {
    json!({
        "id": "msg_1",
        "object": "thread.message.delta",
        "delta": {"content": [{"index": 0, "type": "text", "text": {"value": value}}]}
    })
}

#[derive(Default)]
struct WeatherHandler {
    text: String,
    statuses: Vec<RunStatus>,
    completed: Vec<String>,
    tool_requests: usize,
    errors: Vec<String>,
}

#[async_trait]
impl RunStreamHandler for WeatherHandler {
    async fn on_text_delta(&mut self, text: &str, _delta: &MessageDelta) {
        self.text.push_str(text);
    }

    async fn on_message_completed(&mut self, message: &ThreadMessage) {
        self.completed.push(message.text());
    }

    async fn on_run_status(&mut self, run: &Run) {
        self.statuses.push(run.status);
    }

    async fn on_tool_calls_required(
        &mut self,
        _run: &Run,
        calls: &[RunToolCall],
    ) -> Result<Vec<ToolOutput>, TornadoError> {
        self.tool_requests += 1;
        Ok(calls
            .iter()
            .map(|call| {
                let args = call.to_tool_call().arguments;
                let city = args["city"].as_str().unwrap_or("nowhere");
                ToolOutput::new(call.id.clone(), format!("{city}: sunny"))
            })
            .collect())
    }

    async fn on_error(&mut self, error: &RunStreamError) {
        self.errors.push(error.message.clone());
    }
}

#[tokio::test]
async fn assistant_crud_uses_v2_headers_and_paths() {
    let transport = ScriptedTransport::new(vec![
        Reply::json(
            200,
            json!({"id": "asst_1", "object": "assistant", "model": "gpt-4o", "name": "Forecaster",
                   "tools": [{"type": "function", "function": {"name": "get_weather"}}]}),
        ),
        Reply::json(
            200,
            json!({"object": "list", "data": [{"id": "asst_2", "model": "gpt-4o"}],
                   "first_id": "asst_2", "last_id": "asst_2", "has_more": false}),
        ),
        Reply::json(200, json!({"id": "asst_1", "object": "assistant.deleted", "deleted": true})),
    ]);
    let assistants = AssistantsEndpoint::new(connection(transport.clone()));

    let created = assistants
        .create(
            &CreateAssistantRequest::new("gpt-4o")
                .with_name("Forecaster")
                .with_instructions("Answer weather questions.")
                .with_tool(ToolDefinition::function("get_weather")),
        )
        .await
        .expect("create");
    assert_eq!(created.id, "asst_1");
    assert!(matches!(created.tools[0], AssistantTool::Function { .. }));

    let page = assistants
        .list(&ListQuery::limit(1).after("asst_1"))
        .await
        .expect("list");
    assert_eq!(page.data[0].id, "asst_2");
    assert!(!page.has_more);

    assert!(assistants.delete("asst_1").await.expect("delete").deleted);

    let requests = transport.requests();
    assert_eq!(requests[0].url, "http://mock.openai/v1/assistants");
    assert_eq!(header(&requests[0], "openai-beta"), Some("assistants=v2"));
    assert_eq!(header(&requests[0], "authorization"), Some("Bearer sk-mock"));
    let body = transport.request_body(0);
    assert_eq!(body["tools"][0]["type"], json!("function"));
    assert_eq!(body["tools"][0]["function"]["name"], json!("get_weather"));

    assert_eq!(requests[1].method, HttpMethod::Get);
    assert_eq!(requests[1].url, "http://mock.openai/v1/assistants?limit=1&after=asst_1");
    assert_eq!(requests[2].method, HttpMethod::Delete);
    assert_eq!(requests[2].url, "http://mock.openai/v1/assistants/asst_1");
}

#[tokio::test]
async fn thread_messages_and_polled_run() {
    let transport = ScriptedTransport::new(vec![
        Reply::json(200, json!({"id": "thread_1", "object": "thread", "created_at": 1})),
        Reply::json(200, message("completed", "")),
        Reply::json(200, run("queued")),
        Reply::json(200, run("completed")),
        Reply::json(
            200,
            json!({"object": "list", "data": [message("completed", "Bring sunglasses.")], "has_more": false}),
        ),
    ]);
    let threads = ThreadsEndpoint::new(connection(transport.clone()));

    let thread = threads
        .create_thread(&CreateThreadRequest::default())
        .await
        .expect("thread");
    threads
        .create_message(&thread.id, &CreateMessageRequest::user("Do I need sunglasses?"))
        .await
        .expect("message");
    let queued = threads
        .create_run(&thread.id, &CreateRunRequest::new("asst_1"))
        .await
        .expect("run");
    assert!(!queued.status.is_terminal());
    let finished = threads.retrieve_run(&thread.id, &queued.id).await.expect("poll");
    assert_eq!(finished.status, RunStatus::Completed);

    let messages = threads
        .list_messages(&thread.id, &ListQuery::default())
        .await
        .expect("messages");
    assert_eq!(messages.data[0].text(), "Bring sunglasses.");

    let requests = transport.requests();
    assert_eq!(requests[1].url, "http://mock.openai/v1/threads/thread_1/messages");
    assert_eq!(transport.request_body(1)["role"], json!("user"));
    assert_eq!(requests[2].url, "http://mock.openai/v1/threads/thread_1/runs");
    assert!(transport.request_body(2).get("stream").is_none());
    assert_eq!(requests[3].url, "http://mock.openai/v1/threads/thread_1/runs/run_1");
}

#[tokio::test]
async fn streamed_run_submits_tool_outputs_and_finishes() {
    let transport = ScriptedTransport::new(vec![
        run_stream(&[
            ("thread.run.created", run("queued")),
            ("thread.run.in_progress", run("in_progress")),
            ("thread.run.requires_action", requires_weather()),
        ]),
        run_stream(&[
            ("thread.run.in_progress", run("in_progress")),
            ("thread.message.created", message("in_progress", "")),
            ("thread.message.delta", text_delta("Rome is ")),
            ("thread.message.delta", text_delta("sunny.")),
            ("thread.message.completed", message("completed", "Rome is sunny.")),
            ("thread.run.completed", run("completed")),
        ]),
    ]);
    let threads = ThreadsEndpoint::new(connection(transport.clone()));
    let mut handler = WeatherHandler::default();

    let last = RunStreaming::new(&threads)
        .run("thread_1", &CreateRunRequest::new("asst_1"), &mut handler)
        .await
        .expect("streamed run")
        .expect("run snapshot");

    assert_eq!(last.status, RunStatus::Completed);
    assert_eq!(handler.tool_requests, 1);
    assert_eq!(handler.text, "Rome is sunny.");
    assert_eq!(handler.completed, vec!["Rome is sunny."]);
    assert_eq!(
        handler.statuses,
        vec![
            RunStatus::Queued,
            RunStatus::InProgress,
            RunStatus::RequiresAction,
            RunStatus::InProgress,
            RunStatus::Completed
        ]
    );

    let requests = transport.requests();
    assert_eq!(transport.request_body(0)["stream"], json!(true));
    assert_eq!(
        requests[1].url,
        "http://mock.openai/v1/threads/thread_1/runs/run_1/submit_tool_outputs"
    );
    let submitted = transport.request_body(1);
    assert_eq!(submitted["stream"], json!(true));
    assert_eq!(submitted["tool_outputs"][0]["tool_call_id"], json!("call_1"));
    assert_eq!(submitted["tool_outputs"][0]["output"], json!("Rome: sunny"));
}

#[tokio::test]
async fn handoffs_are_bounded() {
    let transport = ScriptedTransport::new(vec![
        run_stream(&[("thread.run.requires_action", requires_weather())]),
        run_stream(&[("thread.run.requires_action", requires_weather())]),
    ]);
    let threads = ThreadsEndpoint::new(connection(transport.clone()));
    let mut handler = WeatherHandler::default();

    let err = RunStreaming::new(&threads)
        .with_max_handoffs(1)
        .run("thread_1", &CreateRunRequest::new("asst_1"), &mut handler)
        .await
        .expect_err("second requires_action exceeds the bound");
    assert!(matches!(err, TornadoError::Provider { .. }));
    assert_eq!(handler.tool_requests, 2);
    assert_eq!(transport.requests().len(), 2);
}

#[tokio::test]
async fn error_event_reaches_handler_and_fails_the_run() {
    let transport = ScriptedTransport::new(vec![run_stream(&[
        ("thread.run.in_progress", run("in_progress")),
        ("error", json!({"error": {"code": "server_error", "message": "upstream hiccup"}})),
    ])]);
    let threads = ThreadsEndpoint::new(connection(transport));
    let mut handler = WeatherHandler::default();

    let err = RunStreaming::new(&threads)
        .run("thread_1", &CreateRunRequest::new("asst_1"), &mut handler)
        .await
        .expect_err("error event fails the run");
    assert!(matches!(err, TornadoError::Provider { ref message, .. } if message == "upstream hiccup"));
    assert_eq!(handler.errors, vec!["upstream hiccup"]);
}

#[tokio::test]
async fn invalid_ids_never_reach_the_network() {
    let transport = ScriptedTransport::new(Vec::new());
    let threads = ThreadsEndpoint::new(connection(transport.clone()));
    assert!(matches!(
        threads.retrieve_run("thread_1", "../runs").await,
        Err(TornadoError::Validation { .. })
    ));
    assert!(transport.requests().is_empty());
}
