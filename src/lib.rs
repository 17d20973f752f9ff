//! Client-side conversation manager for a token-budgeted chat-completion API.
//!
//! A conversation is windowed to fit the model's token budget (the most
//! recent message of every role is always kept), turned into a completion
//! request, and sent through one of three fetch strategies: mocked,
//! single-shot or streamed.
//!
//! ```no_run
//! # async fn demo() -> Result<(), rusty_chatgpt::ChatError> {
//! use rusty_chatgpt::{ChatClient, ChatMessage, SendOptions};
//!
//! let client = ChatClient::builder("sk-...").build()?;
//! let reply = client
//!     .create_chat_completions(
//!         &[ChatMessage::system("You are a helpful assistant."), ChatMessage::user("hi")],
//!         SendOptions::default().on_progress(|partial| {
//!             eprint!("\r{}", partial.content);
//!             Ok(())
//!         }),
//!     )
//!     .await?;
//! println!("{}", reply.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod fetch;
pub mod message;
pub mod request;
pub mod tokenizer;
pub mod transport;
pub mod window;

pub use client::{ChatClient, ChatClientBuilder, SendOptions};
pub use context::{NormalizeFn, Separator, TokenEstimator};
pub use error::{ChatError, Result};
pub use fetch::{ProgressError, ProgressFn};
pub use message::{ChatMessage, CompletionResult, ModelInfo, Role};
pub use request::CompletionParams;
pub use tokenizer::{HeuristicTokenizer, TiktokenTokenizer, Tokenizer};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
pub use window::{TokenBudget, WindowResult};
