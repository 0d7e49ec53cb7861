use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};

/// How the model signals tool calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallEncoding {
    /// Native function calling. Preferred.
    #[default]
    Structured,
    /// `FUNCTION:` / `PARAMS:` plain-text fallback for backends without
    /// structured output, parsed strictly (see the `marker` module).
    Marker,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    8081
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub tool_call_encoding: ToolCallEncoding,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key: None,
            endpoint: None,
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            max_retries: default_max_retries(),
            tool_call_encoding: ToolCallEncoding::default(),
        }
    }
}

fn default_model() -> String {
    "gemini-1.5-flash-001".into()
}

fn default_temperature() -> f32 {
    0.5
}

fn default_max_output_tokens() -> u32 {
    5000
}

fn default_max_retries() -> u32 {
    6
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatConfig {
    /// Upper bound on model-invocation rounds per user message.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: default_max_tool_rounds(),
            system_prompt: default_system_prompt(),
        }
    }
}

fn default_max_tool_rounds() -> usize {
    4
}

fn default_system_prompt() -> String {
    "You are an expert in answering questions about Japanese anime and able to give useful \
     recommendations. Do not use emoji. Use the available anime search tools as much as \
     possible, and ground your answers in their results. Politely refuse questions that are \
     not about anime."
        .into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let cfg: Self = toml::from_str(&raw)
            .map_err(|err| ChatError::Protocol(format!("failed to parse configuration: {err}")))?;
        Ok(cfg)
    }

    /// Load from `path`, then apply `ANICHAT_*` environment overrides. The
    /// file is optional; a missing file yields defaults plus overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut cfg = if path.as_ref().exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        if let Ok(host) = env::var("ANICHAT_HOST") {
            cfg.server.host = host;
        }
        if let Ok(port) = env::var("ANICHAT_PORT") {
            if let Ok(parsed) = port.parse::<u16>() {
                cfg.server.port = parsed;
            }
        }
        if let Ok(key) = env::var("ANICHAT_GEMINI_API_KEY") {
            cfg.model.api_key = Some(key);
        }
        if let Ok(endpoint) = env::var("ANICHAT_GEMINI_ENDPOINT") {
            cfg.model.endpoint = Some(endpoint);
        }
        if let Ok(model) = env::var("ANICHAT_MODEL") {
            cfg.model.model = model;
        }
        if let Ok(encoding) = env::var("ANICHAT_TOOL_CALL_ENCODING") {
            cfg.model.tool_call_encoding = match encoding.to_ascii_lowercase().as_str() {
                "marker" => ToolCallEncoding::Marker,
                _ => ToolCallEncoding::Structured,
            };
        }
        if let Ok(rounds) = env::var("ANICHAT_MAX_TOOL_ROUNDS") {
            if let Ok(parsed) = rounds.parse::<usize>() {
                cfg.chat.max_tool_rounds = parsed.max(1);
            }
        }
        Ok(cfg)
    }
}
