use std::future::Future;

use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use super::{EventStream, HttpMethod, HttpRequest, HttpResponse, Transport, api_error, sse};
use crate::error::{ChatError, Result};

/// Default transport backed by `reqwest`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| ChatError::Config(format!("cannot build http client: {e}")))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn builder(&self, req: &HttpRequest) -> reqwest::RequestBuilder {
        let mut rb = match req.method {
            HttpMethod::Get => self.client.get(&req.url),
            HttpMethod::Post => self.client.post(&req.url),
        };
        for (k, v) in &req.headers {
            rb = rb.header(k.as_str(), v.as_str());
        }
        if let Some(body) = &req.body {
            rb = rb.body(body.clone());
        }
        rb
    }
}

// Dropping the request future is what actually aborts a reqwest call.
async fn until_cancelled<T>(
    cancel: Option<&CancellationToken>,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(ChatError::Cancelled),
            r = fut => r,
        },
        None => fut.await,
    }
}

/// Ends `events` when `token` fires, with a final `Cancelled` item so a
/// cancelled body is never mistaken for a server that closed early.
fn cancellable(events: EventStream, token: CancellationToken) -> EventStream {
    let fired = token.clone();
    let tail = stream::once(async move { fired.is_cancelled() })
        .filter_map(|cancelled| async move { cancelled.then_some(Err(ChatError::Cancelled)) });
    events.take_until(token.cancelled_owned()).chain(tail).boxed()
}

fn status_text(status: reqwest::StatusCode) -> String {
    status.canonical_reason().unwrap_or_default().to_string()
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, req: HttpRequest) -> Result<HttpResponse> {
        let rb = self.builder(&req);
        until_cancelled(req.cancel.as_ref(), async move {
            let resp = rb.send().await?;
            let status = resp.status();
            let body = resp.text().await?;
            Ok(HttpResponse { status: status.as_u16(), status_text: status_text(status), body })
        })
        .await
    }

    async fn send_streaming(&self, req: HttpRequest) -> Result<EventStream> {
        let rb = self.builder(&req).header(reqwest::header::ACCEPT, "text/event-stream");
        let resp = until_cancelled(req.cancel.as_ref(), async move { Ok(rb.send().await?) }).await?;
        let status = resp.status();
        if !status.is_success() {
            let reason = until_cancelled(req.cancel.as_ref(), async move { Ok(resp.text().await?) }).await?;
            return Err(api_error(status.as_u16(), status_text(status), &reason));
        }
        let events = sse::decode_event_stream(resp.bytes_stream().boxed());
        Ok(match req.cancel {
            Some(token) => cancellable(events, token),
            None => events,
        })
    }
}
