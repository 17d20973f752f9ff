//! In-memory transport for unit tests.

use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::{StreamExt, stream};

use super::{EventStream, HttpRequest, HttpResponse, SseEvent, Transport, api_error};
use crate::error::Result;

pub(crate) struct FakeTransport {
    status: u16,
    body: String,
    events: Vec<String>,
    sent: Mutex<Vec<HttpRequest>>,
}

impl FakeTransport {
    pub(crate) fn responding(status: u16, body: &str) -> Self {
        Self { status, body: body.to_string(), events: Vec::new(), sent: Mutex::new(Vec::new()) }
    }

    pub(crate) fn streaming(events: &[&str]) -> Self {
        Self {
            status: 200,
            body: String::new(),
            events: events.iter().map(|e| e.to_string()).collect(),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn sent(&self) -> Vec<HttpRequest> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, req: HttpRequest) -> Result<HttpResponse> {
        self.sent.lock().unwrap().push(req);
        Ok(HttpResponse { status: self.status, status_text: String::new(), body: self.body.clone() })
    }

    async fn send_streaming(&self, req: HttpRequest) -> Result<EventStream> {
        self.sent.lock().unwrap().push(req);
        if !(200..300).contains(&self.status) {
            return Err(api_error(self.status, String::new(), &self.body));
        }
        let events: Vec<Result<SseEvent>> = self.events.iter().map(|d| Ok(SseEvent::message(d.clone()))).collect();
        Ok(stream::iter(events).boxed())
    }
}
