//! The public entry point: windowing, request building and fetch strategy
//! selection behind one `create_chat_completions` call.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::context::{NormalizeFn, Separator, TokenEstimator, default_normalize_message};
use crate::error::{ChatError, Result};
use crate::fetch::{CompletionFetcher, MockedFetcher, ProgressError, ProgressFn, SingleShotFetcher, StreamedFetcher};
use crate::message::{ChatMessage, CompletionResult, ModelInfo};
use crate::request::{CompletionParams, build_completion_request};
use crate::tokenizer::{TiktokenTokenizer, Tokenizer};
use crate::transport::{HttpRequest, ReqwestTransport, Transport};
use crate::window::{ConversationWindower, TokenBudget, WindowResult};

pub const DEFAULT_API_BASE_URL: &str = "https://api.openai.com";

/// Per-call options for [`ChatClient::create_chat_completions`].
#[derive(Clone, Default)]
pub struct SendOptions {
    pub timeout: Option<Duration>,
    /// Supplying a subscriber switches the call to the streamed strategy.
    pub on_progress: Option<ProgressFn>,
    pub cancel: Option<CancellationToken>,
    pub completion_params: Option<CompletionParams>,
    pub max_response_tokens: Option<u32>,
    pub min_response_tokens: Option<u32>,
}

impl SendOptions {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn on_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(&CompletionResult) -> Result<(), ProgressError> + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(f));
        self
    }

    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn completion_params(mut self, params: CompletionParams) -> Self {
        self.completion_params = Some(params);
        self
    }

    pub fn max_response_tokens(mut self, n: u32) -> Self {
        self.max_response_tokens = Some(n);
        self
    }

    pub fn min_response_tokens(mut self, n: u32) -> Self {
        self.min_response_tokens = Some(n);
        self
    }
}

pub struct ChatClientBuilder {
    api_key: String,
    api_base_url: String,
    debug: bool,
    mock: bool,
    completion_params: CompletionParams,
    budget: TokenBudget,
    tokenizer: Option<Arc<dyn Tokenizer>>,
    normalize: Option<NormalizeFn>,
    transport: Option<Arc<dyn Transport>>,
}

impl ChatClientBuilder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base_url: DEFAULT_API_BASE_URL.into(),
            debug: false,
            mock: false,
            completion_params: CompletionParams::defaults(),
            budget: TokenBudget::default(),
            tokenizer: None,
            normalize: None,
            transport: None,
        }
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Answer every call with a canned reply instead of hitting the API.
    pub fn mock(mut self, mock: bool) -> Self {
        self.mock = mock;
        self
    }

    /// Merged over the built-in defaults.
    pub fn completion_params(mut self, params: CompletionParams) -> Self {
        self.completion_params = CompletionParams::defaults().merged(&params);
        self
    }

    pub fn max_model_tokens(mut self, n: u32) -> Self {
        self.budget.max_model_tokens = n;
        self
    }

    pub fn max_response_tokens(mut self, n: u32) -> Self {
        self.budget.max_response_tokens = n;
        self
    }

    pub fn min_response_tokens(mut self, n: u32) -> Self {
        self.budget.min_response_tokens = n;
        self
    }

    pub fn tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    pub fn normalizer(mut self, normalize: NormalizeFn) -> Self {
        self.normalize = Some(normalize);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<ChatClient> {
        if self.api_key.trim().is_empty() {
            return Err(ChatError::Config("OpenAI missing required apiKey".into()));
        }
        if self.budget.min_response_tokens > self.budget.max_response_tokens {
            return Err(ChatError::Config(format!(
                "min_response_tokens ({}) exceeds max_response_tokens ({})",
                self.budget.min_response_tokens, self.budget.max_response_tokens
            )));
        }
        let tokenizer = match self.tokenizer {
            Some(t) => t,
            None => Arc::new(TiktokenTokenizer::r50k()?),
        };
        let transport = match self.transport {
            Some(t) => t,
            None => Arc::new(ReqwestTransport::new()?),
        };
        let estimator = TokenEstimator::new(tokenizer)
            .with_normalizer(self.normalize.unwrap_or_else(|| Arc::new(default_normalize_message)));
        Ok(ChatClient {
            api_key: self.api_key,
            api_base_url: self.api_base_url.trim_end_matches('/').to_string(),
            debug: self.debug,
            mock: self.mock,
            completion_params: self.completion_params,
            budget: self.budget,
            estimator,
            transport,
        })
    }
}

/// Client for a token-budgeted chat-completion API.
///
/// Holds only fixed configuration; concurrent calls on a shared client do
/// not interfere with each other.
#[derive(Clone)]
pub struct ChatClient {
    api_key: String,
    api_base_url: String,
    debug: bool,
    mock: bool,
    completion_params: CompletionParams,
    budget: TokenBudget,
    estimator: TokenEstimator,
    transport: Arc<dyn Transport>,
}

impl ChatClient {
    pub fn builder(api_key: impl Into<String>) -> ChatClientBuilder {
        ChatClientBuilder::new(api_key)
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn set_api_key(&mut self, api_key: impl Into<String>) {
        self.api_key = api_key.into();
    }

    pub fn budget(&self) -> TokenBudget {
        self.budget
    }

    pub fn completion_params(&self) -> &CompletionParams {
        &self.completion_params
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url, path)
    }

    /// Lists the models visible to the API key; also a cheap way to check
    /// that the key is valid.
    pub async fn list_models(&self, organization: Option<&str>) -> Result<Vec<ModelInfo>> {
        #[derive(serde::Deserialize)]
        struct Resp {
            data: Vec<ModelInfo>,
        }

        let mut req = HttpRequest::get(self.endpoint("/v1/models"))
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key));
        if let Some(org) = organization.filter(|o| !o.is_empty()) {
            req = req.header("OpenAI-Organization", org);
        }
        let resp = self.transport.send(req).await?.error_for_status()?;
        let resp: Resp = resp.json()?;
        Ok(resp.data)
    }

    pub fn normalize_messages(&self, messages: &[ChatMessage]) -> String {
        self.estimator.normalize(messages)
    }

    pub fn normalize_messages_with(
        &self,
        messages: &[ChatMessage],
        normalize: Option<&NormalizeFn>,
        separator: Option<&Separator>,
    ) -> String {
        self.estimator.normalize_with(messages, normalize, separator)
    }

    pub fn estimate_token_usage(&self, messages: &[ChatMessage]) -> Result<usize> {
        self.estimator.estimate(messages)
    }

    pub fn estimate_token_usage_with(
        &self,
        messages: &[ChatMessage],
        normalize: Option<&NormalizeFn>,
        separator: Option<&Separator>,
    ) -> Result<usize> {
        self.estimator.estimate_with(messages, normalize, separator)
    }

    /// Selects which messages fit the model budget.
    pub fn window_messages(&self, messages: &[ChatMessage], min_response_tokens: Option<u32>) -> Result<WindowResult> {
        let min = min_response_tokens.filter(|n| *n > 0).unwrap_or(self.budget.min_response_tokens);
        ConversationWindower::new(&self.estimator).window(messages, self.budget.max_model_tokens, min)
    }

    fn fetcher(&self, streaming: bool) -> Box<dyn CompletionFetcher> {
        if self.mock {
            Box::new(MockedFetcher)
        } else if streaming {
            Box::new(StreamedFetcher::new(self.transport.clone()))
        } else {
            Box::new(SingleShotFetcher::new(self.transport.clone(), self.debug))
        }
    }

    /// Sends the conversation, trimmed to the token budget, and returns the
    /// completion. With `on_progress` set the response is streamed and the
    /// subscriber sees the partial result as it grows.
    pub async fn create_chat_completions(
        &self,
        messages: &[ChatMessage],
        opts: SendOptions,
    ) -> Result<CompletionResult> {
        if messages.is_empty() {
            return Err(ChatError::EmptyConversation);
        }
        let window = self.window_messages(messages, opts.min_response_tokens)?;
        self.complete_window(&window, opts).await
    }

    /// Sends a conversation already trimmed by [`ChatClient::window_messages`],
    /// so callers that inspect the window do not tokenize twice.
    /// `opts.min_response_tokens` is not consulted here.
    pub async fn complete_window(&self, window: &WindowResult, opts: SendOptions) -> Result<CompletionResult> {
        let streaming = opts.on_progress.is_some();
        let max_response = opts
            .max_response_tokens
            .filter(|n| *n > 0)
            .unwrap_or(self.budget.max_response_tokens);

        let body = build_completion_request(
            window,
            &self.completion_params,
            opts.completion_params.as_ref(),
            max_response,
            streaming,
        )?;
        let body = serde_json::to_string(&body)?;
        if self.debug {
            debug!(tokens = window.prompt_tokens, body = %body, "sendMessage");
        }

        // A child token lets the timeout abort the transport without
        // cancelling the caller's own token.
        let cancel = match &opts.cancel {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        let mut req = HttpRequest::post(self.endpoint("/v1/chat/completions"), body)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key));
        req.cancel = Some(cancel.clone());

        let fetcher = self.fetcher(streaming);
        let fut = fetcher.fetch(req, opts.on_progress.as_ref());
        // A zero timeout means none, like the other per-call zeros.
        match opts.timeout.filter(|d| !d.is_zero()) {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => {
                    cancel.cancel();
                    debug!(fetcher = fetcher.name(), ?limit, "chat completion timed out");
                    Err(ChatError::Timeout(limit))
                }
            },
            None => fut.await,
        }
    }
}
