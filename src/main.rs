mod cli;

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{ChatArgs, Cli, Commands, ConversationArgs};
use colored::*;
use rusty_chatgpt::config::Config;
use rusty_chatgpt::{ChatClient, ChatMessage, CompletionParams, SendOptions};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("rusty_chatgpt=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_messages(args: &ConversationArgs) -> Result<Vec<ChatMessage>> {
    let mut messages: Vec<ChatMessage> = Vec::new();
    if let Some(sys) = &args.system {
        messages.push(ChatMessage::system(sys.clone()));
    }
    if let Some(path) = &args.conversation {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading conversation {path}"))?;
        let history: Vec<ChatMessage> =
            serde_json::from_str(&text).with_context(|| "parsing conversation json")?;
        messages.extend(history);
    }
    if let Some(prompt) = &args.prompt {
        messages.push(ChatMessage::user(prompt.clone()));
    }
    if messages.is_empty() {
        anyhow::bail!("nothing to send (use --prompt, --system or --conversation)");
    }
    Ok(messages)
}

fn build_client(cfg: &Config, debug: bool, mock: bool) -> Result<ChatClient> {
    // Offline runs do not need a real key.
    let builder = match cfg.client_builder() {
        Ok(b) => b,
        Err(_) if mock => ChatClient::builder("NOT_NEEDED"),
        Err(e) => return Err(e),
    };
    let mock = mock || cfg.openai().mock.unwrap_or(false);
    let debug = debug || cfg.openai().debug.unwrap_or(false);
    Ok(builder.debug(debug).mock(mock).build()?)
}

async fn chat(cfg: &Config, cmd: ChatArgs, debug: bool) -> Result<()> {
    let messages = load_messages(&cmd.conversation)?;
    let client = build_client(cfg, debug, cmd.conversation.mock)?;

    let params = CompletionParams {
        model: cmd.model,
        temperature: cmd.temperature,
        ..Default::default()
    };

    let mut opts = SendOptions::default().completion_params(params);
    if let Some(n) = cmd.max_response_tokens {
        opts = opts.max_response_tokens(n);
    }
    if let Some(n) = cmd.min_response_tokens {
        opts = opts.min_response_tokens(n);
    }
    if let Some(t) = cmd.timeout_ms.map(Duration::from_millis).or_else(|| cfg.openai().timeout()) {
        opts = opts.timeout(t);
    }

    let window = client.window_messages(&messages, cmd.min_response_tokens)?;
    if !window.excess_messages.is_empty() {
        eprintln!(
            "{}",
            format!(
                "[context] dropped {} message(s) to fit the budget (~{} prompt tokens)",
                window.excess_messages.len(),
                window.prompt_tokens
            )
            .yellow()
        );
    }

    if cmd.stream {
        let printed = Arc::new(AtomicUsize::new(0));
        let cursor = printed.clone();
        opts = opts.on_progress(move |partial| {
            // The subscriber sees the whole content so far; print only the new tail.
            let from = cursor.swap(partial.content.len(), Ordering::SeqCst);
            let mut out = std::io::stdout();
            write!(out, "{}", &partial.content[from..])?;
            out.flush()?;
            Ok(())
        });
        let result = client.complete_window(&window, opts).await?;
        let shown = printed.load(Ordering::SeqCst);
        if shown < result.content.len() {
            print!("{}", &result.content[shown..]);
        }
        println!();
    } else {
        let result = client.complete_window(&window, opts).await?;
        println!("{}", result.content);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.debug);
    let cfg = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Chat(cmd) => chat(&cfg, cmd, cli.debug).await?,
        Commands::ListModels(args) => {
            let client = build_client(&cfg, cli.debug, false)?;
            let org = args.organization.or_else(|| cfg.openai().organization);
            let models = client.list_models(org.as_deref()).await?;
            for model in &models {
                let permission = model
                    .permission
                    .first()
                    .map(|p| p.to_string())
                    .unwrap_or_default();
                println!("[{}|{}]{}", model.id.green(), model.created, permission);
            }
            println!("you have permission on {} models.", models.len());
        }
        Commands::Tokens(args) => {
            let messages = load_messages(&args)?;
            let client = build_client(&cfg, cli.debug, true)?;
            let count = client.estimate_token_usage(&messages)?;
            let window = client.window_messages(&messages, None)?;
            println!("{} {}", "tokens:".bold(), count);
            println!(
                "{} kept {} / dropped {} (prompt {} tokens, {} left for the response)",
                "window:".bold(),
                window.kept_messages.len(),
                window.excess_messages.len(),
                window.prompt_tokens,
                window.remaining_response_tokens
            );
        }
        Commands::Normalize(args) => {
            let messages = load_messages(&args)?;
            let client = build_client(&cfg, cli.debug, true)?;
            print!("{}", client.normalize_messages(&messages));
        }
        Commands::ConfigPath => {
            let p = Config::default_path()?;
            println!("{}", p.display());
        }
        Commands::InitConfig => {
            let p = Config::write_example_if_absent()?;
            println!("Wrote example config to {}", p.display());
        }
    }

    Ok(())
}
