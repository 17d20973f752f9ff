use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "rusty-chatgpt", author, version, about = "Token-budgeted ChatGPT client", long_about = None)]
pub struct Cli {
    /// Optional path to a config file (toml)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Log request and response bodies
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a conversation and print the completion
    Chat(ChatArgs),
    /// List models visible to the API key
    ListModels(ListModelsArgs),
    /// Estimate token usage and show what the budget would keep
    Tokens(ConversationArgs),
    /// Print the normalized text used for token estimation
    Normalize(ConversationArgs),
    /// Print the default config path
    ConfigPath,
    /// Create an example config file if missing
    InitConfig,
}

#[derive(Args, Debug, Clone)]
pub struct ConversationArgs {
    /// User message appended to the conversation
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Optional system message placed first
    #[arg(long)]
    pub system: Option<String>,

    /// JSON file holding an array of {role, content[, name]} messages
    #[arg(long)]
    pub conversation: Option<String>,

    /// Answer with canned replies, never call the API
    #[arg(long)]
    pub mock: bool,
}

#[derive(Args, Debug)]
pub struct ChatArgs {
    #[command(flatten)]
    pub conversation: ConversationArgs,

    /// Stream tokens as they arrive
    #[arg(long)]
    pub stream: bool,

    /// Model name; if not given, the configured default is used
    #[arg(short, long)]
    pub model: Option<String>,

    /// Temperature (0.0 - 2.0)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Upper bound for response tokens
    #[arg(long)]
    pub max_response_tokens: Option<u32>,

    /// Tokens that must stay free for the response
    #[arg(long)]
    pub min_response_tokens: Option<u32>,

    /// Abort the request after this many milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

#[derive(Args, Debug)]
pub struct ListModelsArgs {
    /// Query models of a specific organization
    #[arg(long)]
    pub organization: Option<String>,
}
