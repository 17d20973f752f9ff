use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::client::{ChatClientBuilder, DEFAULT_API_BASE_URL};
use crate::request::CompletionParams;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub openai: Option<OpenAiConfig>,
    pub completion: Option<CompletionParams>,
    pub budget: Option<BudgetConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub organization: Option<String>,
    pub debug: Option<bool>,
    /// Answer with canned replies, never call the API
    pub mock: Option<bool>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BudgetConfig {
    pub max_model_tokens: Option<u32>,
    pub max_response_tokens: Option<u32>,
    pub min_response_tokens: Option<u32>,
}

impl Config {
    pub fn load(path: Option<&str>) -> Result<Self> {
        if let Some(p) = path {
            let text = fs::read_to_string(p).with_context(|| format!("reading config at {p}"))?;
            return parse(&text).with_context(|| "parsing config");
        }
        let default = Self::default_path()?;
        if default.exists() {
            let text = fs::read_to_string(&default)
                .with_context(|| format!("reading config at {}", default.display()))?;
            parse(&text).with_context(|| "parsing config")
        } else {
            Ok(Self::default())
        }
    }

    pub fn default_path() -> Result<PathBuf> {
        let base = dirs::config_dir().ok_or_else(|| anyhow!("cannot resolve config dir"))?;
        Ok(base.join("rusty-chatgpt").join("config.toml"))
    }

    pub fn write_example_if_absent() -> Result<PathBuf> {
        let path = Self::default_path()?;
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let example = r#"# rusty-chatgpt config (TOML)

[openai]
# api_key can be omitted to use env var OPENAI_API_KEY
api_key = ""
base_url = "https://api.openai.com"
# organization = "org-..."
debug = false
mock = false
# timeout_ms = 60000

[completion]
model = "gpt-3.5-turbo-0301"
temperature = 0.8
top_p = 1.0
presence_penalty = 1.0

[budget]
# 4096 minus a few spare tokens for estimation drift
max_model_tokens = 4090
max_response_tokens = 1024
min_response_tokens = 4
"#;
            fs::write(&path, example)?;
        }
        Ok(path)
    }

    pub fn openai(&self) -> OpenAiConfig {
        self.openai.clone().unwrap_or_default()
    }

    /// Builder pre-filled from the file; tokenizer and transport stay default.
    pub fn client_builder(&self) -> Result<ChatClientBuilder> {
        let oc = self.openai();
        let key = oc
            .effective_api_key()
            .ok_or_else(|| anyhow!("no API key: set [openai].api_key or OPENAI_API_KEY"))?;
        let mut builder = ChatClientBuilder::new(key)
            .api_base_url(oc.base_url.clone().unwrap_or_else(|| DEFAULT_API_BASE_URL.into()))
            .debug(oc.debug.unwrap_or(false))
            .mock(oc.mock.unwrap_or(false));
        if let Some(params) = &self.completion {
            builder = builder.completion_params(params.clone());
        }
        if let Some(b) = &self.budget {
            if let Some(n) = b.max_model_tokens {
                builder = builder.max_model_tokens(n);
            }
            if let Some(n) = b.max_response_tokens {
                builder = builder.max_response_tokens(n);
            }
            if let Some(n) = b.min_response_tokens {
                builder = builder.min_response_tokens(n);
            }
        }
        Ok(builder)
    }
}

fn parse(text: &str) -> Result<Config> {
    toml::from_str(text).map_err(|e| anyhow!(e))
}

impl OpenAiConfig {
    pub fn effective_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}
