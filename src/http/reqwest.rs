use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, Method};

use crate::error::TornadoError;

use super::{
    DynHttpTransport, HttpBodyStream, HttpMethod, HttpRequest, HttpResponse, HttpStreamResponse,
    HttpTransport,
};

/// Default [`HttpTransport`] backed by `reqwest` with rustls.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Wraps a preconfigured `reqwest::Client`.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn default_client() -> Result<Self, TornadoError> {
        Self::build(Client::builder())
    }

    /// Client with an overall request timeout. Individual requests may still
    /// override it through [`HttpRequest::timeout`].
    pub fn with_timeout(timeout: Duration) -> Result<Self, TornadoError> {
        Self::build(Client::builder().timeout(timeout))
    }

    fn build(builder: reqwest::ClientBuilder) -> Result<Self, TornadoError> {
        builder
            .user_agent(concat!("tornado-llm/", env!("CARGO_PKG_VERSION")))
            .build()
            .map(Self::new)
            .map_err(|err| TornadoError::transport(format!("failed to create reqwest client: {err}")))
    }

    fn method(method: HttpMethod) -> Method {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
        }
    }

    fn build_request(&self, request: HttpRequest) -> Result<reqwest::RequestBuilder, TornadoError> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
            timeout,
        } = request;
        let mut builder = self.client.request(Self::method(method), &url);

        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        for (name, value) in headers {
            let header_name = reqwest::header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| TornadoError::transport(format!("invalid header name: {err}")))?;
            let header_value = reqwest::header::HeaderValue::from_str(&value).map_err(|err| {
                TornadoError::transport(format!("invalid header value for {header_name}: {err}"))
            })?;
            builder = builder.header(header_name, header_value);
        }

        if let Some(body) = body {
            builder = builder.body(body);
        }

        Ok(builder)
    }

    fn headers_to_map(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
        headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect()
    }

    async fn dispatch(&self, request: HttpRequest) -> Result<reqwest::Response, TornadoError> {
        let response = self
            .build_request(request)?
            .send()
            .await
            .map_err(|err| TornadoError::transport(err.to_string()))?;
        tracing::debug!(status = response.status().as_u16(), url = %response.url(), "http response");
        Ok(response)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TornadoError> {
        let response = self.dispatch(request).await?;
        let status = response.status().as_u16();
        let headers = Self::headers_to_map(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|err| TornadoError::transport(err.to_string()))?
            .to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, TornadoError> {
        let response = self.dispatch(request).await?;
        let status = response.status().as_u16();
        let headers = Self::headers_to_map(response.headers());
        let stream = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|err| TornadoError::transport(err.to_string()))
        });
        let body: HttpBodyStream = Box::pin(stream);

        Ok(HttpStreamResponse {
            status,
            headers,
            body,
        })
    }
}

/// Shared reqwest transport with default settings.
pub fn default_dyn_transport() -> Result<DynHttpTransport, TornadoError> {
    Ok(Arc::new(ReqwestTransport::default_client()?))
}
