//! LLM Module - text generation behind a provider trait
//! The router, SQL translator, answerer and merger all go through `LLMProvider`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmSettings;
use crate::error::Result;

pub mod external;

pub use external::ExternalProvider;

/// Core trait for LLM providers
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Generate a completion for a single user prompt
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String>;

    /// Get provider info
    fn info(&self) -> ProviderInfo;
}

/// Generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub max_tokens: usize,
    pub temperature: f32,
    pub stop_sequences: Vec<String>,
}

impl GenerationConfig {
    /// Same settings with a different completion budget.
    pub fn with_max_tokens(&self, max_tokens: usize) -> Self {
        Self {
            max_tokens,
            ..self.clone()
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.0,
            stop_sequences: vec![],
        }
    }
}

impl From<&LlmSettings> for GenerationConfig {
    fn from(settings: &LlmSettings) -> Self {
        Self {
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            stop_sequences: vec![],
        }
    }
}

/// Provider information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: String,
    pub model: String,
    pub endpoint: String,
}
