use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_core::Stream;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::TornadoError;

/// HTTP methods understood by the transport abstraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

/// Minimal HTTP request shared by every provider and endpoint.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Builds a POST request carrying a JSON body.
    ///
    /// # Examples
    ///
    /// ```
    /// use tornado_llm::http::{HttpMethod, HttpRequest};
    ///
    /// let request = HttpRequest::post_json("https://example.com", br"{}".to_vec());
    /// assert_eq!(request.method, HttpMethod::Post);
    /// assert_eq!(request.headers.get("Content-Type"), Some(&"application/json".to_string()));
    /// ```
    pub fn post_json(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: HashMap::from([("Content-Type".to_string(), "application/json".to_string())]),
            body: Some(body),
            timeout: None,
        }
    }

    /// Builds a body-less request such as GET or DELETE.
    pub fn empty(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
        }
    }

    /// Merges `headers` into the request, replacing values with the same name.
    ///
    /// ```
    /// use std::collections::HashMap;
    /// use tornado_llm::http::HttpRequest;
    ///
    /// let request = HttpRequest::post_json("https://example.com", br"{}".to_vec())
    ///     .with_headers(HashMap::from([("Authorization".into(), "Bearer test".into())]));
    /// assert_eq!(request.headers.get("Authorization"), Some(&"Bearer test".to_string()));
    /// assert_eq!(request.headers.get("Content-Type"), Some(&"application/json".to_string()));
    /// ```
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Fully buffered HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Converts the body into a UTF-8 string.
    ///
    /// ```
    /// use tornado_llm::http::HttpResponse;
    ///
    /// let response = HttpResponse { status: 200, headers: Default::default(), body: b"ok".to_vec() };
    /// assert_eq!(response.into_string().unwrap(), "ok");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`TornadoError::Transport`] when the body is not valid UTF-8.
    pub fn into_string(self) -> Result<String, TornadoError> {
        String::from_utf8(self.body).map_err(|err| TornadoError::transport(err.to_string()))
    }
}

/// HTTP response whose body is consumed incrementally.
pub struct HttpStreamResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: HttpBodyStream,
}

impl HttpStreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Drains the body so a failed status can be reported with its payload.
    pub async fn into_response(self) -> Result<HttpResponse, TornadoError> {
        use futures_util::StreamExt;

        let mut body = Vec::new();
        let mut stream = self.body;
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk?);
        }
        Ok(HttpResponse {
            status: self.status,
            headers: self.headers,
            body,
        })
    }
}

/// Body stream returned by [`HttpTransport::send_stream`].
pub type HttpBodyStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, TornadoError>> + Send>>;

pub(crate) fn find_header<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Seam between providers and the concrete HTTP client.
///
/// The crate ships [`reqwest::ReqwestTransport`]; tests substitute in-memory
/// implementations that replay canned vendor payloads.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends a request and resolves once the full response is buffered.
    ///
    /// # Examples
    ///
    /// ```
    /// # use async_trait::async_trait;
    /// # use tornado_llm::http::{HttpTransport, HttpRequest, HttpResponse, HttpStreamResponse};
    /// # use tornado_llm::error::TornadoError;
    /// # use futures_util::stream;
    /// struct MemoryTransport;
    ///
    /// #[async_trait]
    /// impl HttpTransport for MemoryTransport {
    ///     async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TornadoError> {
    ///         Ok(HttpResponse { status: 200, headers: request.headers, body: b"ok".to_vec() })
    ///     }
    ///     async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, TornadoError> {
    ///         Ok(HttpStreamResponse { status: 200, headers: request.headers, body: Box::pin(stream::empty()) })
    ///     }
    /// }
    ///
    /// # tokio::runtime::Runtime::new().unwrap().block_on(async {
    /// let response = MemoryTransport
    ///     .send(HttpRequest::post_json("https://example.com", br"{}".to_vec()))
    ///     .await
    ///     .unwrap();
    /// assert_eq!(response.status, 200);
    /// # });
    /// ```
    ///
    /// # Errors
    ///
    /// Network failures map to [`TornadoError::Transport`]. Non-2xx statuses are
    /// returned as responses, not errors.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TornadoError>;

    /// Sends a request and returns the body as a byte stream.
    async fn send_stream(&self, request: HttpRequest)
    -> Result<HttpStreamResponse, TornadoError>;
}

/// Thread-safe handle to a transport implementation.
pub type DynHttpTransport = Arc<dyn HttpTransport>;

fn serialize_body<T: Serialize>(body: &T) -> Result<Vec<u8>, TornadoError> {
    serde_json::to_vec(body).map_err(|err| TornadoError::Validation {
        message: format!("failed to serialize request: {err}"),
    })
}

/// Serializes `body` to JSON and POSTs it with the given headers.
///
/// ```
/// # use std::collections::HashMap;
/// # use async_trait::async_trait;
/// # use tornado_llm::http::{post_json_with_headers, HttpTransport, HttpRequest, HttpResponse, HttpStreamResponse};
/// # use tornado_llm::error::TornadoError;
/// # use serde_json::json;
/// struct MockTransport;
///
/// #[async_trait]
/// impl HttpTransport for MockTransport {
///     async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TornadoError> {
///         assert_eq!(request.headers.get("X-Test"), Some(&"ok".to_string()));
///         Ok(HttpResponse { status: 200, headers: request.headers, body: request.body.unwrap_or_default() })
///     }
///     async fn send_stream(&self, _request: HttpRequest) -> Result<HttpStreamResponse, TornadoError> {
///         unimplemented!()
///     }
/// }
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let headers = HashMap::from([("X-Test".to_string(), "ok".to_string())]);
/// let response = post_json_with_headers(&MockTransport, "https://example.com", headers, &json!({"ping": "pong"}))
///     .await
///     .unwrap();
/// assert_eq!(response.status, 200);
/// # });
/// ```
///
/// # Errors
///
/// Returns [`TornadoError::Validation`] if serialization fails, otherwise whatever
/// [`HttpTransport::send`] reports.
pub async fn post_json_with_headers<T: Serialize>(
    transport: &dyn HttpTransport,
    url: impl Into<String>,
    headers: HashMap<String, String>,
    body: &T,
) -> Result<HttpResponse, TornadoError> {
    let request = HttpRequest::post_json(url, serialize_body(body)?).with_headers(headers);
    tracing::trace!(url = %request.url, "POST");
    transport.send(request).await
}

/// Streaming counterpart of [`post_json_with_headers`], used for SSE endpoints.
pub async fn post_json_stream_with_headers<T: Serialize>(
    transport: &dyn HttpTransport,
    url: impl Into<String>,
    headers: HashMap<String, String>,
    body: &T,
) -> Result<HttpStreamResponse, TornadoError> {
    let mut headers = headers;
    headers
        .entry("Accept".to_string())
        .or_insert_with(|| "text/event-stream".to_string());
    let request = HttpRequest::post_json(url, serialize_body(body)?).with_headers(headers);
    tracing::trace!(url = %request.url, "POST (stream)");
    transport.send_stream(request).await
}

/// Issues a GET request with the given headers.
pub async fn get_with_headers(
    transport: &dyn HttpTransport,
    url: impl Into<String>,
    headers: HashMap<String, String>,
) -> Result<HttpResponse, TornadoError> {
    send_empty(transport, HttpMethod::Get, url.into(), headers).await
}

/// Issues a DELETE request with the given headers.
pub async fn delete_with_headers(
    transport: &dyn HttpTransport,
    url: impl Into<String>,
    headers: HashMap<String, String>,
) -> Result<HttpResponse, TornadoError> {
    send_empty(transport, HttpMethod::Delete, url.into(), headers).await
}

async fn send_empty(
    transport: &dyn HttpTransport,
    method: HttpMethod,
    url: String,
    headers: HashMap<String, String>,
) -> Result<HttpResponse, TornadoError> {
    let request = HttpRequest::empty(method, url).with_headers(headers);
    tracing::trace!(method = method.as_str(), url = %request.url, "request");
    transport.send(request).await
}

/// Returns the body text of a 2xx response, or the classified vendor error.
///
/// `parse_error` maps a vendor error body to a [`TornadoError`]. It receives the
/// HTTP status, the raw body and the parsed `Retry-After` hint.
pub(crate) fn ensure_success<F>(response: HttpResponse, parse_error: F) -> Result<String, TornadoError>
where
    F: FnOnce(u16, &str, Option<Duration>) -> TornadoError,
{
    let status = response.status;
    let retry_after = crate::provider::retry::retry_after_from_headers(&response.headers);
    let text = response.into_string()?;
    if (200..300).contains(&status) {
        Ok(text)
    } else {
        Err(parse_error(status, &text, retry_after))
    }
}

/// Streaming counterpart of [`ensure_success`]: failed responses are drained
/// and classified, successful ones are handed back untouched.
pub(crate) async fn ensure_stream_success<F>(
    response: HttpStreamResponse,
    parse_error: F,
) -> Result<HttpStreamResponse, TornadoError>
where
    F: FnOnce(u16, &str, Option<Duration>) -> TornadoError,
{
    if response.is_success() {
        return Ok(response);
    }
    let response = response.into_response().await?;
    let status = response.status;
    let retry_after = crate::provider::retry::retry_after_from_headers(&response.headers);
    let text = String::from_utf8_lossy(&response.body).into_owned();
    Err(parse_error(status, &text, retry_after))
}

/// Deserializes a vendor JSON payload.
pub(crate) fn parse_json<T: DeserializeOwned>(
    provider: &'static str,
    text: &str,
) -> Result<T, TornadoError> {
    serde_json::from_str(text).map_err(|err| TornadoError::Provider {
        provider,
        message: format!("failed to parse response: {err}"),
    })
}

pub mod reqwest;
