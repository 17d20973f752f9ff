use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{CompletionFetcher, ProgressFn};
use crate::error::{ChatError, Result};
use crate::message::{CompletionResult, Role};
use crate::transport::{HttpRequest, Transport};

/// One request, one JSON completion object back.
#[derive(Clone)]
pub struct SingleShotFetcher {
    transport: Arc<dyn Transport>,
    debug: bool,
}

impl SingleShotFetcher {
    pub fn new(transport: Arc<dyn Transport>, debug: bool) -> Self {
        Self { transport, debug }
    }
}

fn error_detail(body: &Value) -> String {
    let detail = &body["detail"];
    if let Some(msg) = detail["message"].as_str() {
        return msg.to_string();
    }
    match detail {
        Value::Null => "unknown".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl CompletionFetcher for SingleShotFetcher {
    fn name(&self) -> &str {
        "single-shot"
    }

    async fn fetch(&self, req: HttpRequest, _progress: Option<&ProgressFn>) -> Result<CompletionResult> {
        let resp = self.transport.send(req).await?.error_for_status()?;
        let body: Value = resp.json()?;
        if self.debug {
            debug!(response = %body, "chat completion response");
        }

        let message = match body.pointer("/choices/0/message") {
            Some(m) if !m.is_null() => m,
            _ => {
                return Err(ChatError::Api {
                    status: Some(resp.status),
                    status_text: resp.status_text.clone(),
                    message: format!("OpenAI error: {}", error_detail(&body)),
                });
            }
        };

        let mut result = CompletionResult::assistant(message["content"].as_str().unwrap_or_default());
        if let Some(role) = message.get("role").and_then(|r| serde_json::from_value::<Role>(r.clone()).ok()) {
            result.role = role;
        }
        result.raw_response = Some(body);
        Ok(result)
    }
}
