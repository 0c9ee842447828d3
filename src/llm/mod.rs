//! LLM text generation
//!
//! Providers implement [`LlmClient`]. A client is only built when the
//! configured API key variable is set; without one the LLM phase falls back
//! to heuristic path lists.

mod anthropic;
mod openai;

pub use anthropic::AnthropicClient;
pub use openai::OpenAiClient;

use crate::config::{LlmConfig, LlmProviderKind};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// A text completion backend
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String>;
}

/// Sampling settings shared by the providers
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl From<&LlmConfig> for GenerationSettings {
    fn from(config: &LlmConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

/// Builds the configured provider, or `None` when no API key is available
pub fn client_from_config(config: &LlmConfig) -> Option<Arc<dyn LlmClient>> {
    let api_key = match std::env::var(&config.api_key_env) {
        Ok(key) if !key.trim().is_empty() => key,
        _ => {
            debug!("{} not set, LLM phase uses heuristic patterns", config.api_key_env);
            return None;
        }
    };

    let built: anyhow::Result<Arc<dyn LlmClient>> = match config.provider {
        LlmProviderKind::OpenAi => OpenAiClient::new(api_key, config)
            .map(|c| Arc::new(c) as Arc<dyn LlmClient>),
        LlmProviderKind::Anthropic => AnthropicClient::new(api_key, config)
            .map(|c| Arc::new(c) as Arc<dyn LlmClient>),
    };

    match built {
        Ok(client) => Some(client),
        Err(e) => {
            warn!("Failed to build LLM client: {:#}", e);
            None
        }
    }
}
