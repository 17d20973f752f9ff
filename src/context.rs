use std::sync::Arc;

use crate::error::Result;
use crate::message::ChatMessage;
use crate::tokenizer::Tokenizer;

/// Renders one message of a conversation as text. Receives the message, its
/// index and the whole conversation.
pub type NormalizeFn = Arc<dyn Fn(&ChatMessage, usize, &[ChatMessage]) -> String + Send + Sync>;

pub fn default_normalize_message(message: &ChatMessage, _index: usize, _all: &[ChatMessage]) -> String {
    format!("{}\n{}", message.role, message.content)
}

/// Delimiters wrapped around normalized messages before tokenizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Separator {
    pub prefix: String,
    pub suffix: String,
    pub infix: String,
}

impl Default for Separator {
    fn default() -> Self {
        Self {
            prefix: "$\n".into(),
            suffix: "\n$\n".into(),
            infix: "\n$\n".into(),
        }
    }
}

pub fn normalize_messages<F>(messages: &[ChatMessage], normalize: F, separator: &Separator) -> String
where
    F: Fn(&ChatMessage, usize, &[ChatMessage]) -> String,
{
    let parts: Vec<String> = messages
        .iter()
        .enumerate()
        .map(|(i, m)| normalize(m, i, messages))
        .collect();
    format!("{}{}{}", separator.prefix, parts.join(&separator.infix), separator.suffix)
}

/// Token counting over normalized conversations.
#[derive(Clone)]
pub struct TokenEstimator {
    tokenizer: Arc<dyn Tokenizer>,
    normalize: NormalizeFn,
    separator: Separator,
}

impl TokenEstimator {
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self {
            tokenizer,
            normalize: Arc::new(default_normalize_message),
            separator: Separator::default(),
        }
    }

    pub fn with_normalizer(mut self, normalize: NormalizeFn) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn with_separator(mut self, separator: Separator) -> Self {
        self.separator = separator;
        self
    }

    pub fn normalize(&self, messages: &[ChatMessage]) -> String {
        normalize_messages(messages, self.normalize.as_ref(), &self.separator)
    }

    pub fn estimate(&self, messages: &[ChatMessage]) -> Result<usize> {
        self.tokenizer.count(&self.normalize(messages))
    }

    /// Like [`estimate`](Self::estimate) with a one-off normalizer and/or separator.
    pub fn estimate_with(
        &self,
        messages: &[ChatMessage],
        normalize: Option<&NormalizeFn>,
        separator: Option<&Separator>,
    ) -> Result<usize> {
        let text = self.normalize_with(messages, normalize, separator);
        self.tokenizer.count(&text)
    }

    pub fn normalize_with(
        &self,
        messages: &[ChatMessage],
        normalize: Option<&NormalizeFn>,
        separator: Option<&Separator>,
    ) -> String {
        let normalize = normalize.unwrap_or(&self.normalize);
        normalize_messages(messages, normalize.as_ref(), separator.unwrap_or(&self.separator))
    }
}
