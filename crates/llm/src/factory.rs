//! Backend factory
//!
//! Builds the configured backend from [`LlmSettings`].

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use call_assist_config::LlmSettings;

use crate::backend::{LlmBackend, LlmConfig, OllamaBackend};
use crate::claude::{ClaudeBackend, ClaudeConfig};
use crate::LlmError;

/// LLM provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProvider {
    /// Local models served by Ollama
    #[default]
    Ollama,
    /// Anthropic Messages API
    Claude,
}

impl FromStr for LlmProvider {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" | "local" => Ok(LlmProvider::Ollama),
            "claude" | "anthropic" => Ok(LlmProvider::Claude),
            other => Err(LlmError::Configuration(format!(
                "Unknown LLM provider '{}'",
                other
            ))),
        }
    }
}

/// Create the backend described by `settings`
pub fn create_backend(settings: &LlmSettings) -> Result<Arc<dyn LlmBackend>, LlmError> {
    let provider: LlmProvider = settings.provider.parse()?;
    let timeout = Duration::from_millis(settings.timeout_ms);

    tracing::info!(
        provider = ?provider,
        model = %settings.model,
        "Creating LLM backend"
    );

    match provider {
        LlmProvider::Ollama => {
            let backend = OllamaBackend::new(LlmConfig {
                model: settings.model.clone(),
                endpoint: settings.endpoint.clone(),
                max_tokens: settings.max_tokens,
                temperature: settings.temperature,
                timeout,
                max_retries: settings.max_retries,
                initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
                ..Default::default()
            })?;
            Ok(Arc::new(backend))
        }
        LlmProvider::Claude => {
            let api_key = settings
                .api_key
                .clone()
                .filter(|k| !k.is_empty())
                .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
                .ok_or_else(|| {
                    LlmError::Configuration("Claude requires ANTHROPIC_API_KEY".to_string())
                })?;

            let mut config = ClaudeConfig::new(api_key)
                .with_model(settings.model.clone())
                .with_max_tokens(settings.max_tokens)
                .with_temperature(settings.temperature)
                .with_timeout(timeout);
            // The Ollama default endpoint is meaningless for Claude
            if settings.endpoint.starts_with("https://") {
                config = config.with_endpoint(settings.endpoint.clone());
            }

            Ok(Arc::new(ClaudeBackend::new(config)?))
        }
    }
}
