pub mod accumulator;
pub mod mocked;
pub mod single_shot;
pub mod streamed;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::message::CompletionResult;
use crate::transport::HttpRequest;

pub use accumulator::{AccumulatorState, Feed, StreamAccumulator};
pub use mocked::MockedFetcher;
pub use single_shot::SingleShotFetcher;
pub use streamed::StreamedFetcher;

pub type ProgressError = Box<dyn std::error::Error + Send + Sync>;

/// Receives the cumulative result every time streamed content grows.
pub type ProgressFn = Arc<dyn Fn(&CompletionResult) -> Result<(), ProgressError> + Send + Sync>;

/// One way of turning a completion request into a result.
#[async_trait]
pub trait CompletionFetcher: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, req: HttpRequest, progress: Option<&ProgressFn>) -> Result<CompletionResult>;
}
