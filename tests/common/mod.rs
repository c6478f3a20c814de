#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::stream;
use serde_json::Value;
use tornado_llm::TornadoError;
use tornado_llm::http::{HttpRequest, HttpResponse, HttpStreamResponse, HttpTransport};

/// Canned reply served by [`ScriptedTransport`].
pub struct Reply {
    pub status: u16,
    pub headers: HashMap<String, String>,
    /// Streamed replies are split into these pieces.
    pub chunks: Vec<Vec<u8>>,
}

impl Reply {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            chunks: vec![body.to_string().into_bytes()],
        }
    }

    /// SSE body split at every event boundary so decoders see partial reads.
    pub fn sse(events: &[(&str, Value)]) -> Self {
        let chunks = events
            .iter()
            .map(|(name, data)| {
                let mut frame = String::new();
                if !name.is_empty() {
                    frame.push_str(&format!("event: {name}\n"));
                }
                frame.push_str(&format!("data: {data}\n\n"));
                frame.into_bytes()
            })
            .collect();
        Self {
            status: 200,
            headers: HashMap::from([("content-type".into(), "text/event-stream".into())]),
            chunks,
        }
    }

    /// Raw SSE text, delivered in one piece.
    pub fn sse_text(text: &str) -> Self {
        Self {
            status: 200,
            headers: HashMap::from([("content-type".into(), "text/event-stream".into())]),
            chunks: vec![text.as_bytes().to_vec()],
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }
}

/// Serves replies in order and records every request it receives.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_body(&self, index: usize) -> Value {
        let requests = self.requests.lock().unwrap();
        let body = requests[index].body.as_deref().expect("request has a body");
        serde_json::from_slice(body).expect("request body is JSON")
    }

    fn next(&self, request: HttpRequest) -> Reply {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted reply left")
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TornadoError> {
        let reply = self.next(request);
        Ok(HttpResponse {
            status: reply.status,
            headers: reply.headers,
            body: reply.chunks.concat(),
        })
    }

    async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, TornadoError> {
        let reply = self.next(request);
        Ok(HttpStreamResponse {
            status: reply.status,
            headers: reply.headers,
            body: Box::pin(stream::iter(reply.chunks.into_iter().map(Ok))),
        })
    }
}

/// Finds a header regardless of its case.
pub fn header<'a>(request: &'a HttpRequest, name: &str) -> Option<&'a str> {
    request
        .headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
