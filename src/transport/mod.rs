//! The HTTP seam. The client never talks to the network directly; it hands a
//! fully-built [`HttpRequest`] to a [`Transport`], which tests replace with an
//! in-memory fake.

pub mod http;
pub mod sse;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::error::{ChatError, Result};

pub use http::ReqwestTransport;
pub use sse::{SseDecoder, SseEvent};

pub type EventStream = BoxStream<'static, Result<SseEvent>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    /// Fired to abort the request while it is in flight.
    pub cancel: Option<CancellationToken>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self { method: HttpMethod::Get, url: url.into(), headers: Vec::new(), body: None, cancel: None }
    }

    pub fn post(url: impl Into<String>, body: String) -> Self {
        Self { method: HttpMethod::Post, url: url.into(), headers: Vec::new(), body: Some(body), cancel: None }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> &str {
        &self.body
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Turns a non-success response into an [`ChatError::Api`].
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }
        Err(api_error(self.status, self.status_text, &self.body))
    }
}

pub(crate) fn api_error(status: u16, status_text: String, reason: &str) -> ChatError {
    let code = if status != 0 { status.to_string() } else { status_text.clone() };
    ChatError::Api {
        status: Some(status),
        status_text,
        message: format!("OpenAI error {code}: {reason}"),
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends the request and reads the whole body.
    async fn send(&self, req: HttpRequest) -> Result<HttpResponse>;

    /// Sends the request and yields the body as server-sent events. A
    /// non-success status is reported as an error before any event.
    async fn send_streaming(&self, req: HttpRequest) -> Result<EventStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_for_status_keeps_body_as_reason() {
        let resp = HttpResponse { status: 401, status_text: "Unauthorized".into(), body: "bad key".into() };
        match resp.error_for_status() {
            Err(ChatError::Api { status, status_text, message }) => {
                assert_eq!(status, Some(401));
                assert_eq!(status_text, "Unauthorized");
                assert_eq!(message, "OpenAI error 401: bad key");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn header_lookup_ignores_case() {
        let req = HttpRequest::get("http://x").header("Authorization", "Bearer k");
        assert_eq!(req.header_value("authorization"), Some("Bearer k"));
        assert_eq!(req.header_value("OpenAI-Organization"), None);
    }
}
