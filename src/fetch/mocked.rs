use async_trait::async_trait;

use super::{CompletionFetcher, ProgressFn};
use crate::error::Result;
use crate::message::CompletionResult;
use crate::transport::HttpRequest;

pub const MOCK_REPLIES: [&str; 2] = [
    "I agree",
    "Please don't expect too much from me, I'm just an AI langue model",
];

/// Answers without touching the network.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockedFetcher;

#[async_trait]
impl CompletionFetcher for MockedFetcher {
    fn name(&self) -> &str {
        "mocked"
    }

    async fn fetch(&self, _req: HttpRequest, _progress: Option<&ProgressFn>) -> Result<CompletionResult> {
        let reply = if rand::random::<bool>() { MOCK_REPLIES[0] } else { MOCK_REPLIES[1] };
        Ok(CompletionResult::assistant(reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;

    #[tokio::test]
    async fn always_answers_with_a_placeholder() {
        for _ in 0..20 {
            let r = MockedFetcher.fetch(HttpRequest::get("http://unused"), None).await.unwrap();
            assert_eq!(r.role, Role::Assistant);
            assert!(MOCK_REPLIES.contains(&r.content.as_str()));
            assert!(r.raw_response.is_none());
        }
    }
}
