//! Language-model backends
//!
//! Features:
//! - Backend trait shared by every provider
//! - Ollama (local) and Claude (Anthropic Messages API) backends
//! - Retry with exponential backoff for transient failures
//! - Factory building a backend from settings

pub mod backend;
pub mod claude;
pub mod factory;
pub mod prompt;

pub use backend::{FinishReason, GenerationResult, LlmBackend, LlmConfig, OllamaBackend};
pub use claude::{ClaudeBackend, ClaudeConfig};
pub use factory::{create_backend, LlmProvider};
pub use prompt::{Message, Role};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}
