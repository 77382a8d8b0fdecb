use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::Side;

pub const DEFAULT_BASE_URL: &str = "http://localhost:1234";
pub const DEFAULT_MODEL: &str = "openai/gpt-oss-20b";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Side played by the automated move source.
    pub cpu_side: Side,
    /// Pause a host may insert before asking the move source.
    pub think_delay_ms: u64,
    pub oracle: OracleConfig,
}

impl GameConfig {
    pub fn think_delay(&self) -> Duration {
        Duration::from_millis(self.think_delay_ms)
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            cpu_side: Side::White,
            think_delay_ms: 1000,
            oracle: OracleConfig::default(),
        }
    }
}

/// Chat-completions endpoint used to suggest moves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_ms: u64,
    pub system_prompt: String,
}

impl OracleConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 4096,
            temperature: 0.7,
            timeout_ms: 30_000,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}
