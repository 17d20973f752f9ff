//! Fitting a conversation into a token budget shared between prompt and
//! response.
//!
//! The most recent message of every role is locked and always survives. The
//! remaining messages go through a greedy forward pass against a ceiling
//! fixed up front, then a repair loop drops the earliest unlocked user
//! messages (assistant messages once no user message is left) until the
//! reserved response floor is met or nothing more can be dropped.

use std::collections::HashSet;

use tracing::{debug, trace};

use crate::context::TokenEstimator;
use crate::error::Result;
use crate::message::{ChatMessage, Role};

/// Token ceiling shared by prompt and response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    pub max_model_tokens: u32,
    pub min_response_tokens: u32,
    pub max_response_tokens: u32,
}

impl Default for TokenBudget {
    fn default() -> Self {
        // 4096 minus a few spare tokens for estimation drift
        Self {
            max_model_tokens: 4090,
            min_response_tokens: 4,
            max_response_tokens: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowResult {
    pub kept_messages: Vec<ChatMessage>,
    pub excess_messages: Vec<ChatMessage>,
    pub prompt_tokens: usize,
    /// `max_model_tokens - prompt_tokens`; negative when even the locked
    /// messages overflow the budget.
    pub remaining_response_tokens: i64,
}

struct MessageStatus<'a> {
    message: &'a ChatMessage,
    discard: bool,
    locked: bool,
    tokens: usize,
}

pub struct ConversationWindower<'a> {
    estimator: &'a TokenEstimator,
}

impl<'a> ConversationWindower<'a> {
    pub fn new(estimator: &'a TokenEstimator) -> Self {
        Self { estimator }
    }

    pub fn window(
        &self,
        messages: &[ChatMessage],
        max_model_tokens: u32,
        min_response_tokens: u32,
    ) -> Result<WindowResult> {
        let max_model = i64::from(max_model_tokens);
        if messages.is_empty() {
            return Ok(WindowResult {
                kept_messages: Vec::new(),
                excess_messages: Vec::new(),
                prompt_tokens: 0,
                remaining_response_tokens: max_model,
            });
        }

        let full = self.estimator.estimate(messages)?;
        let ceiling = max_model - full as i64;

        let mut statuses: Vec<MessageStatus> = messages
            .iter()
            .map(|message| MessageStatus { message, discard: false, locked: false, tokens: 0 })
            .collect();

        let mut seen: HashSet<Role> = HashSet::new();
        for status in statuses.iter_mut().rev() {
            if seen.insert(status.message.role) {
                status.locked = true;
            }
        }

        // Singleton estimates pay the separator wrapping once per message, so
        // this pass is deliberately conservative; the repair loop below works
        // on exact counts.
        let mut running: i64 = 0;
        for status in statuses.iter_mut() {
            status.tokens = self.estimator.estimate(std::slice::from_ref(status.message))?;
            let cost = status.tokens as i64;
            if status.locked {
                running += cost;
                continue;
            }
            if running > ceiling || running + cost > ceiling {
                status.discard = true;
                trace!(role = %status.message.role, tokens = status.tokens, "dropped in fit pass");
            } else {
                running += cost;
            }
        }

        let mut prompt_tokens = self.kept_tokens(&statuses)?;
        while max_model - (prompt_tokens as i64) < i64::from(min_response_tokens) {
            let victim = statuses
                .iter()
                .position(|s| s.message.role == Role::User && !s.locked && !s.discard)
                .or_else(|| {
                    statuses
                        .iter()
                        .position(|s| s.message.role == Role::Assistant && !s.locked && !s.discard)
                });
            let Some(idx) = victim else { break };
            statuses[idx].discard = true;
            prompt_tokens = self.kept_tokens(&statuses)?;
            trace!(index = idx, prompt_tokens, "dropped in repair loop");
        }

        let (kept, excess): (Vec<_>, Vec<_>) = statuses.iter().partition(|s| !s.discard);
        let result = WindowResult {
            kept_messages: kept.into_iter().map(|s| s.message.clone()).collect(),
            excess_messages: excess.into_iter().map(|s| s.message.clone()).collect(),
            prompt_tokens,
            remaining_response_tokens: max_model - prompt_tokens as i64,
        };
        debug!(
            kept = result.kept_messages.len(),
            excess = result.excess_messages.len(),
            prompt_tokens = result.prompt_tokens,
            remaining = result.remaining_response_tokens,
            "conversation windowed"
        );
        Ok(result)
    }

    fn kept_tokens(&self, statuses: &[MessageStatus]) -> Result<usize> {
        let kept: Vec<ChatMessage> = statuses
            .iter()
            .filter(|s| !s.discard)
            .map(|s| s.message.clone())
            .collect();
        self.estimator.estimate(&kept)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::tokenizer::Tokenizer;

    struct CharTokenizer;

    impl Tokenizer for CharTokenizer {
        fn encode(&self, text: &str) -> Result<Vec<u32>> {
            Ok(text.chars().map(|c| c as u32).collect())
        }
    }

    fn estimator() -> TokenEstimator {
        TokenEstimator::new(Arc::new(CharTokenizer))
    }

    // With one token per char and the default separator:
    //   user message "xxxx"      -> 14 tokens alone
    //   assistant message "xxxx" -> 19 tokens alone
    //   whole conversation below -> 72 tokens
    fn conversation() -> Vec<ChatMessage> {
        vec![
            ChatMessage::user("aaaa"),
            ChatMessage::assistant("bbbb"),
            ChatMessage::user("cccc"),
            ChatMessage::assistant("dddd"),
            ChatMessage::user("eeee"),
        ]
    }

    fn contents(messages: &[ChatMessage]) -> Vec<&str> {
        messages.iter().map(|m| m.content.as_str()).collect()
    }

    #[test]
    fn empty_input_yields_empty_window() {
        let est = estimator();
        let r = ConversationWindower::new(&est).window(&[], 4090, 4).unwrap();
        assert!(r.kept_messages.is_empty());
        assert!(r.excess_messages.is_empty());
        assert_eq!(r.prompt_tokens, 0);
        assert_eq!(r.remaining_response_tokens, 4090);
    }

    #[test]
    fn roomy_budget_keeps_everything() {
        let est = estimator();
        let messages = conversation();
        let r = ConversationWindower::new(&est).window(&messages, 4090, 4).unwrap();
        assert_eq!(r.kept_messages, messages);
        assert!(r.excess_messages.is_empty());
        assert_eq!(r.prompt_tokens, 72);
        assert_eq!(r.remaining_response_tokens, 4090 - 72);
    }

    #[test]
    fn fit_pass_skips_over_messages_that_do_not_fit() {
        let est = estimator();
        // ceiling = 100 - 72 = 28: first user (14) fits, assistant (19) would
        // overflow, second user (14) still fits exactly
        let r = ConversationWindower::new(&est).window(&conversation(), 100, 4).unwrap();
        assert_eq!(contents(&r.kept_messages), vec!["aaaa", "cccc", "dddd", "eeee"]);
        assert_eq!(contents(&r.excess_messages), vec!["bbbb"]);
        assert_eq!(r.prompt_tokens, 55);
        assert_eq!(r.remaining_response_tokens, 45);
    }

    #[test]
    fn repair_loop_drops_earliest_user_first() {
        let est = estimator();
        let w = ConversationWindower::new(&est);

        let r = w.window(&conversation(), 119, 50).unwrap();
        assert_eq!(contents(&r.excess_messages), vec!["aaaa"]);
        assert_eq!(r.prompt_tokens, 60);
        assert_eq!(r.remaining_response_tokens, 59);

        let r = w.window(&conversation(), 119, 70).unwrap();
        assert_eq!(contents(&r.kept_messages), vec!["bbbb", "dddd", "eeee"]);
        assert_eq!(contents(&r.excess_messages), vec!["aaaa", "cccc"]);
        assert_eq!(r.remaining_response_tokens, 71);
    }

    #[test]
    fn repair_loop_falls_back_to_assistant_then_gives_up() {
        let est = estimator();
        let r = ConversationWindower::new(&est).window(&conversation(), 119, 90).unwrap();
        assert_eq!(contents(&r.kept_messages), vec!["dddd", "eeee"]);
        assert_eq!(contents(&r.excess_messages), vec!["aaaa", "bbbb", "cccc"]);
        assert_eq!(r.prompt_tokens, 31);
        // floor not reachable, best effort is returned rather than an error
        assert_eq!(r.remaining_response_tokens, 88);
    }

    #[test]
    fn overflowing_conversation_keeps_only_locked_messages() {
        let est = estimator();
        let r = ConversationWindower::new(&est).window(&conversation(), 50, 4).unwrap();
        assert_eq!(contents(&r.kept_messages), vec!["dddd", "eeee"]);
        assert_eq!(r.excess_messages.len(), 3);
        assert_eq!(r.remaining_response_tokens, 50 - 31);
    }

    #[test]
    fn single_message_is_never_dropped() {
        let est = estimator();
        let messages = vec![ChatMessage::user("aaaa")];
        let r = ConversationWindower::new(&est).window(&messages, 5, 4).unwrap();
        assert_eq!(r.kept_messages, messages);
        assert_eq!(r.prompt_tokens, 14);
        assert_eq!(r.remaining_response_tokens, -9);
    }

    #[test]
    fn system_and_user_pair_counts_the_joined_text() {
        let est = estimator();
        let messages = vec![
            ChatMessage::system("You are a helpful assistant."),
            ChatMessage::user("hi, what date in today?"),
        ];
        let r = ConversationWindower::new(&est).window(&messages, 4090, 4).unwrap();
        assert_eq!(r.kept_messages, messages);
        let full = est.estimate(&messages).unwrap();
        let singles: usize = messages.iter().map(|m| est.estimate(std::slice::from_ref(m)).unwrap()).sum();
        assert_eq!(r.prompt_tokens, full);
        assert_ne!(r.prompt_tokens, singles);
    }

    #[test]
    fn kept_and_excess_partition_the_input_in_order() {
        let est = estimator();
        let messages = conversation();
        for max in [40u32, 60, 80, 100, 119, 200] {
            for min in [0u32, 10, 50, 90] {
                let r = ConversationWindower::new(&est).window(&messages, max, min).unwrap();
                assert_eq!(r.kept_messages.len() + r.excess_messages.len(), messages.len());
                let mut kept = r.kept_messages.iter();
                let mut excess = r.excess_messages.iter();
                let mut next_kept = kept.next();
                let mut next_excess = excess.next();
                for m in &messages {
                    if next_kept == Some(m) {
                        next_kept = kept.next();
                    } else {
                        assert_eq!(next_excess, Some(m));
                        next_excess = excess.next();
                    }
                }
                // latest message of each role is always present
                assert!(r.kept_messages.iter().any(|m| m.content == "dddd"));
                assert!(r.kept_messages.iter().any(|m| m.content == "eeee"));
            }
        }
    }
}
