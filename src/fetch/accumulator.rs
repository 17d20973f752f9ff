//! Merges streamed completion deltas into one result.

use serde::Deserialize;

use crate::error::{ChatError, Result};
use crate::message::{CompletionResult, Role};

pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Deserialize)]
struct DeltaChunk {
    #[serde(default)]
    choices: Vec<DeltaChoice>,
}

#[derive(Debug, Deserialize)]
struct DeltaChoice {
    // Some servers send `"delta": null` on keep-alive chunks.
    #[serde(default)]
    delta: Option<Delta>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    role: Option<Role>,
    content: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorState {
    Accumulating,
    Done,
    Failed,
}

/// Outcome of feeding one event payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Feed {
    /// Nothing a subscriber needs to see (empty choices, role-only delta).
    Pending,
    /// Content grew; [`StreamAccumulator::current`] holds the cumulative result.
    Updated,
    Done(CompletionResult),
}

#[derive(Debug)]
pub struct StreamAccumulator {
    result: CompletionResult,
    state: AccumulatorState,
}

impl Default for StreamAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self { result: CompletionResult::assistant(""), state: AccumulatorState::Accumulating }
    }

    pub fn state(&self) -> AccumulatorState {
        self.state
    }

    pub fn current(&self) -> &CompletionResult {
        &self.result
    }

    pub fn feed(&mut self, data: &str) -> Result<Feed> {
        match self.state {
            AccumulatorState::Accumulating => {}
            AccumulatorState::Done => return Err(ChatError::StreamParse("event after [DONE]".into())),
            AccumulatorState::Failed => return Err(ChatError::StreamParse("stream already failed".into())),
        }

        if data == DONE_SENTINEL {
            self.state = AccumulatorState::Done;
            let trimmed = self.result.content.trim_end().len();
            self.result.content.truncate(trimmed);
            return Ok(Feed::Done(self.result.clone()));
        }

        let chunk: DeltaChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                self.state = AccumulatorState::Failed;
                return Err(ChatError::StreamParse(e.to_string()));
            }
        };
        let Some(delta) = chunk.choices.into_iter().next().and_then(|c| c.delta) else {
            return Ok(Feed::Pending);
        };
        if let Some(role) = delta.role {
            self.result.role = role;
        }
        match delta.content {
            Some(content) if !content.is_empty() => {
                self.result.content.push_str(&content);
                Ok(Feed::Updated)
            }
            _ => Ok(Feed::Pending),
        }
    }

    /// Marks the accumulator failed, dropping the partial content.
    pub fn fail(&mut self) {
        self.state = AccumulatorState::Failed;
        self.result = CompletionResult::assistant("");
    }
}
