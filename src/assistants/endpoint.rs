use std::collections::HashMap;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::TornadoError;
use crate::http::{
    DynHttpTransport, HttpBodyStream, delete_with_headers, ensure_stream_success, ensure_success,
    get_with_headers, parse_json, post_json_stream_with_headers, post_json_with_headers,
};
use crate::provider::openai_chat::openai_error_parser;
use crate::provider::versioned_endpoint;

use super::streaming::{RunEventStream, run_event_stream};
use super::types::{
    Assistant, CreateAssistantRequest, CreateMessageRequest, CreateRunRequest, CreateThreadRequest,
    DeletionStatus, ListQuery, ListResponse, ModifyAssistantRequest, Run, RunStep,
    SubmitToolOutputsRequest, Thread, ThreadMessage, ToolOutput,
};

pub(crate) const PROVIDER: &str = "openai_assistants";
const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Authenticated access to the OpenAI REST API, shared by the Assistants
/// and Threads endpoints. Every request carries `OpenAI-Beta: assistants=v2`.
#[derive(Clone)]
pub struct OpenAiConnection {
    transport: DynHttpTransport,
    base_url: String,
    api_key: String,
    organization: Option<String>,
    project: Option<String>,
}

impl OpenAiConnection {
    pub fn new(transport: DynHttpTransport, api_key: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            organization: None,
            project: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    fn url(&self, path: &str) -> String {
        versioned_endpoint(&self.base_url, "v1", path)
    }

    fn headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), format!("Bearer {}", self.api_key));
        headers.insert("OpenAI-Beta".to_string(), "assistants=v2".to_string());
        if let Some(org) = &self.organization {
            headers.insert("OpenAI-Organization".to_string(), org.clone());
        }
        if let Some(project) = &self.project {
            headers.insert("OpenAI-Project".to_string(), project.clone());
        }
        headers
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, TornadoError> {
        self.get_url(self.url(path)).await
    }

    /// GET on a list endpoint with cursor pagination.
    pub(crate) async fn get_list<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &ListQuery,
    ) -> Result<T, TornadoError> {
        self.get_url(query.apply_to(&self.url(path))?).await
    }

    async fn get_url<T: DeserializeOwned>(&self, url: String) -> Result<T, TornadoError> {
        tracing::debug!(provider = PROVIDER, url = %url, "GET");
        let response = get_with_headers(self.transport.as_ref(), url, self.headers()).await?;
        let text = ensure_success(response, openai_error_parser(PROVIDER))?;
        parse_json(PROVIDER, &text)
    }

    pub(crate) async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, TornadoError> {
        let url = self.url(path);
        tracing::debug!(provider = PROVIDER, url = %url, "POST");
        let response =
            post_json_with_headers(self.transport.as_ref(), url, self.headers(), body).await?;
        let text = ensure_success(response, openai_error_parser(PROVIDER))?;
        parse_json(PROVIDER, &text)
    }

    pub(crate) async fn delete_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, TornadoError> {
        let url = self.url(path);
        tracing::debug!(provider = PROVIDER, url = %url, "DELETE");
        let response = delete_with_headers(self.transport.as_ref(), url, self.headers()).await?;
        let text = ensure_success(response, openai_error_parser(PROVIDER))?;
        parse_json(PROVIDER, &text)
    }

    pub(crate) async fn post_stream<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<HttpBodyStream, TornadoError> {
        let url = self.url(path);
        tracing::debug!(provider = PROVIDER, url = %url, "POST (stream)");
        let response =
            post_json_stream_with_headers(self.transport.as_ref(), url, self.headers(), body)
                .await?;
        let response = ensure_stream_success(response, openai_error_parser(PROVIDER)).await?;
        Ok(response.body)
    }
}

/// Rejects ids that would produce a malformed path.
fn require_id<'a>(field: &str, id: &'a str) -> Result<&'a str, TornadoError> {
    if id.is_empty() || id.contains('/') {
        Err(TornadoError::validation(format!("invalid {field}: {id:?}")))
    } else {
        Ok(id)
    }
}

/// `/v1/assistants`.
#[derive(Clone)]
pub struct AssistantsEndpoint {
    connection: OpenAiConnection,
}

impl AssistantsEndpoint {
    pub fn new(connection: OpenAiConnection) -> Self {
        Self { connection }
    }

    pub async fn create(&self, request: &CreateAssistantRequest) -> Result<Assistant, TornadoError> {
        self.connection.post_json("assistants", request).await
    }

    pub async fn retrieve(&self, assistant_id: &str) -> Result<Assistant, TornadoError> {
        let id = require_id("assistant_id", assistant_id)?;
        self.connection.get_json(&format!("assistants/{id}")).await
    }

    pub async fn list(&self, query: &ListQuery) -> Result<ListResponse<Assistant>, TornadoError> {
        self.connection.get_list("assistants", query).await
    }

    pub async fn modify(
        &self,
        assistant_id: &str,
        request: &ModifyAssistantRequest,
    ) -> Result<Assistant, TornadoError> {
        let id = require_id("assistant_id", assistant_id)?;
        self.connection
            .post_json(&format!("assistants/{id}"), request)
            .await
    }

    pub async fn delete(&self, assistant_id: &str) -> Result<DeletionStatus, TornadoError> {
        let id = require_id("assistant_id", assistant_id)?;
        self.connection.delete_json(&format!("assistants/{id}")).await
    }
}

/// `/v1/threads` with its messages, runs and run steps.
#[derive(Clone)]
pub struct ThreadsEndpoint {
    connection: OpenAiConnection,
}

impl ThreadsEndpoint {
    pub fn new(connection: OpenAiConnection) -> Self {
        Self { connection }
    }

    pub async fn create_thread(&self, request: &CreateThreadRequest) -> Result<Thread, TornadoError> {
        self.connection.post_json("threads", request).await
    }

    pub async fn retrieve_thread(&self, thread_id: &str) -> Result<Thread, TornadoError> {
        let id = require_id("thread_id", thread_id)?;
        self.connection.get_json(&format!("threads/{id}")).await
    }

    pub async fn delete_thread(&self, thread_id: &str) -> Result<DeletionStatus, TornadoError> {
        let id = require_id("thread_id", thread_id)?;
        self.connection.delete_json(&format!("threads/{id}")).await
    }

    pub async fn create_message(
        &self,
        thread_id: &str,
        request: &CreateMessageRequest,
    ) -> Result<ThreadMessage, TornadoError> {
        let id = require_id("thread_id", thread_id)?;
        self.connection
            .post_json(&format!("threads/{id}/messages"), request)
            .await
    }

    pub async fn list_messages(
        &self,
        thread_id: &str,
        query: &ListQuery,
    ) -> Result<ListResponse<ThreadMessage>, TornadoError> {
        let id = require_id("thread_id", thread_id)?;
        self.connection
            .get_list(&format!("threads/{id}/messages"), query)
            .await
    }

    pub async fn retrieve_message(
        &self,
        thread_id: &str,
        message_id: &str,
    ) -> Result<ThreadMessage, TornadoError> {
        let id = require_id("thread_id", thread_id)?;
        let message_id = require_id("message_id", message_id)?;
        self.connection
            .get_json(&format!("threads/{id}/messages/{message_id}"))
            .await
    }

    pub async fn create_run(
        &self,
        thread_id: &str,
        request: &CreateRunRequest,
    ) -> Result<Run, TornadoError> {
        let id = require_id("thread_id", thread_id)?;
        let mut request = request.clone();
        request.stream = None;
        self.connection
            .post_json(&format!("threads/{id}/runs"), &request)
            .await
    }

    pub async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run, TornadoError> {
        let path = run_path(thread_id, run_id, "")?;
        self.connection.get_json(&path).await
    }

    pub async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<Run, TornadoError> {
        let path = run_path(thread_id, run_id, "/cancel")?;
        self.connection
            .post_json(&path, &serde_json::json!({}))
            .await
    }

    pub async fn list_run_steps(
        &self,
        thread_id: &str,
        run_id: &str,
        query: &ListQuery,
    ) -> Result<ListResponse<RunStep>, TornadoError> {
        let path = run_path(thread_id, run_id, "/steps")?;
        self.connection.get_list(&path, query).await
    }

    pub async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run, TornadoError> {
        let path = run_path(thread_id, run_id, "/submit_tool_outputs")?;
        let body = SubmitToolOutputsRequest {
            tool_outputs: outputs,
            stream: None,
        };
        self.connection.post_json(&path, &body).await
    }

    /// Creates a run with `stream: true` and returns its typed event stream.
    pub async fn stream_run(
        &self,
        thread_id: &str,
        request: &CreateRunRequest,
    ) -> Result<RunEventStream, TornadoError> {
        let id = require_id("thread_id", thread_id)?;
        let mut request = request.clone();
        request.stream = Some(true);
        let body = self
            .connection
            .post_stream(&format!("threads/{id}/runs"), &request)
            .await?;
        Ok(run_event_stream(body))
    }

    /// Submits tool outputs and continues the run as a stream.
    pub async fn submit_tool_outputs_stream(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<RunEventStream, TornadoError> {
        let path = run_path(thread_id, run_id, "/submit_tool_outputs")?;
        let body = SubmitToolOutputsRequest {
            tool_outputs: outputs,
            stream: Some(true),
        };
        let body = self.connection.post_stream(&path, &body).await?;
        Ok(run_event_stream(body))
    }
}

fn run_path(thread_id: &str, run_id: &str, suffix: &str) -> Result<String, TornadoError> {
    let thread_id = require_id("thread_id", thread_id)?;
    let run_id = require_id("run_id", run_id)?;
    Ok(format!("threads/{thread_id}/runs/{run_id}{suffix}"))
}
