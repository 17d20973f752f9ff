use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::warn;

use super::{CompletionFetcher, Feed, ProgressFn, StreamAccumulator};
use crate::error::{ChatError, Result};
use crate::message::CompletionResult;
use crate::transport::{HttpRequest, Transport};

/// Server-sent-events completion. The progress subscriber sees the
/// cumulative result after every content delta.
#[derive(Clone)]
pub struct StreamedFetcher {
    transport: Arc<dyn Transport>,
}

impl StreamedFetcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl CompletionFetcher for StreamedFetcher {
    fn name(&self) -> &str {
        "streamed"
    }

    async fn fetch(&self, req: HttpRequest, progress: Option<&ProgressFn>) -> Result<CompletionResult> {
        let cancel = req.cancel.clone();
        let mut events = self.transport.send_streaming(req).await?;
        let mut acc = StreamAccumulator::new();

        while let Some(event) = events.next().await {
            let event = event?;
            match acc.feed(&event.data) {
                Ok(Feed::Done(result)) => return Ok(result),
                Ok(Feed::Updated) => {
                    if let Some(on_progress) = progress
                        && let Err(e) = on_progress(acc.current())
                    {
                        acc.fail();
                        return Err(ChatError::Progress(e.to_string()));
                    }
                }
                Ok(Feed::Pending) => {}
                Err(e) => {
                    warn!(error = %e, data = %event.data, "unexpected chat completion stream event");
                    return Err(e);
                }
            }
        }
        if cancel.is_some_and(|token| token.is_cancelled()) {
            return Err(ChatError::Cancelled);
        }
        Err(ChatError::StreamClosed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::fetch::ProgressError;
    use crate::message::Role;
    use crate::transport::testing::FakeTransport;
    use tokio_util::sync::CancellationToken;

    const A: &str = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
    const B: &str = r#"{"choices":[{"delta":{"content":"Hel"}}]}"#;
    const C: &str = r#"{"choices":[{"delta":{"content":"lo "}}]}"#;

    fn run(events: &[&str]) -> StreamedFetcher {
        StreamedFetcher::new(Arc::new(FakeTransport::streaming(events)))
    }

    #[tokio::test]
    async fn progress_sees_cumulative_content() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let progress: ProgressFn = Arc::new(move |r: &CompletionResult| -> Result<(), ProgressError> {
            sink.lock().unwrap().push(r.content.clone());
            Ok(())
        });

        let r = run(&[A, B, C, "[DONE]"])
            .fetch(HttpRequest::post("http://api", "{}".into()), Some(&progress))
            .await
            .unwrap();
        assert_eq!(r.content, "Hello");
        assert_eq!(r.role, Role::Assistant);
        assert_eq!(*seen.lock().unwrap(), vec!["Hel".to_string(), "Hello ".to_string()]);
    }

    #[tokio::test]
    async fn works_without_a_subscriber() {
        let r = run(&[B, "[DONE]"]).fetch(HttpRequest::post("http://api", "{}".into()), None).await.unwrap();
        assert_eq!(r.content, "Hel");
    }

    #[tokio::test]
    async fn malformed_event_rejects_without_partial_result() {
        let err = run(&[B, "not-json", "[DONE]"])
            .fetch(HttpRequest::post("http://api", "{}".into()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::StreamParse(_)));
    }

    #[tokio::test]
    async fn failing_subscriber_rejects_the_call() {
        let progress: ProgressFn = Arc::new(|_r: &CompletionResult| -> Result<(), ProgressError> { Err("display closed".into()) });
        let err = run(&[B, C, "[DONE]"])
            .fetch(HttpRequest::post("http://api", "{}".into()), Some(&progress))
            .await
            .unwrap_err();
        match err {
            ChatError::Progress(msg) => assert_eq!(msg, "display closed"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn stream_ending_without_sentinel_is_an_error() {
        let err = run(&[B, C]).fetch(HttpRequest::post("http://api", "{}".into()), None).await.unwrap_err();
        assert!(matches!(err, ChatError::StreamClosed));
    }

    #[tokio::test]
    async fn cancelled_stream_reports_cancellation_not_closure() {
        let token = CancellationToken::new();
        token.cancel();
        let mut req = HttpRequest::post("http://api", "{}".into());
        req.cancel = Some(token);
        let err = run(&[B]).fetch(req, None).await.unwrap_err();
        assert!(matches!(err, ChatError::Cancelled));
    }
}
