use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};
use crate::message::ChatMessage;
use crate::window::WindowResult;

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo-0301";

// Keys owned by the request itself; an override may not smuggle them in.
const RESERVED_KEYS: [&str; 4] = ["max_tokens", "messages", "stream", "n"];

/// Generation parameters sent with every completion request.
///
/// Every field is optional so the same type serves as client defaults and as
/// per-call overrides; see [`CompletionParams::merged`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Any other body field the API accepts (e.g. `logit_bias`).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CompletionParams {
    pub fn defaults() -> Self {
        Self {
            model: Some(DEFAULT_MODEL.into()),
            temperature: Some(0.8),
            top_p: Some(1.0),
            presence_penalty: Some(1.0),
            ..Default::default()
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Shallow merge: every field set in `overrides` wins.
    pub fn merged(&self, overrides: &CompletionParams) -> CompletionParams {
        let mut extra = self.extra.clone();
        for (k, v) in &overrides.extra {
            extra.insert(k.clone(), v.clone());
        }
        CompletionParams {
            model: overrides.model.clone().or_else(|| self.model.clone()),
            temperature: overrides.temperature.or(self.temperature),
            top_p: overrides.top_p.or(self.top_p),
            presence_penalty: overrides.presence_penalty.or(self.presence_penalty),
            frequency_penalty: overrides.frequency_penalty.or(self.frequency_penalty),
            stop: overrides.stop.clone().or_else(|| self.stop.clone()),
            user: overrides.user.clone().or_else(|| self.user.clone()),
            extra,
        }
    }
}

/// Body of `POST /v1/chat/completions`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    #[serde(flatten)]
    pub params: CompletionParams,
    pub max_tokens: u32,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
}

/// Clamp the tokens left after the prompt into `[1, max_response_tokens]`.
pub fn response_token_cap(remaining: i64, max_response_tokens: u32) -> u32 {
    remaining.min(i64::from(max_response_tokens)).max(1) as u32
}

pub fn build_completion_request(
    window: &WindowResult,
    defaults: &CompletionParams,
    overrides: Option<&CompletionParams>,
    max_response_tokens: u32,
    stream: bool,
) -> Result<ChatCompletionRequest> {
    if window.kept_messages.is_empty() {
        return Err(ChatError::EmptyConversation);
    }
    let mut params = match overrides {
        Some(o) => defaults.merged(o),
        None => defaults.clone(),
    };
    for key in RESERVED_KEYS {
        params.extra.remove(key);
    }
    Ok(ChatCompletionRequest {
        params,
        max_tokens: response_token_cap(window.remaining_response_tokens, max_response_tokens),
        messages: window.kept_messages.clone(),
        stream,
    })
}
