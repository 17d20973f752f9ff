use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("config: {0}")]
    Config(String),
    #[error("[] is too short - 'messages'")]
    EmptyConversation,
    #[error("{message}")]
    Api {
        status: Option<u16>,
        status_text: String,
        message: String,
    },
    #[error("stream parse: {0}")]
    StreamParse(String),
    #[error("event stream closed before [DONE]")]
    StreamClosed,
    #[error("OpenAI timed out waiting for response after {0:?}")]
    Timeout(Duration),
    #[error("request cancelled")]
    Cancelled,
    #[error("tokenizer: {0}")]
    Tokenizer(String),
    #[error("progress callback: {0}")]
    Progress(String),
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("decode: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ChatError {
    /// Status code carried by an API error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ChatError::Api { status, .. } => *status,
            ChatError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ChatError::Timeout(_))
    }
}

pub type Result<T, E = ChatError> = std::result::Result<T, E>;
