//! Configuration management for the call guidance engine
//!
//! Supports loading configuration from:
//! - YAML/TOML files (`config/default`, `config/{env}`)
//! - Environment variables (CALL_ASSIST_ prefix, `__` separator)
//! - Segment journey catalogs in YAML, falling back to the built-in trees

pub mod journeys;
pub mod settings;

pub use journeys::JourneyCatalog;
pub use settings::{
    load_settings, ClassifierConfig, GatewayConfig, LlmSettings, ObservabilityConfig,
    ServerConfig, Settings, StreamingConfig,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Invalid journey catalog: {0}")]
    Journey(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<call_assist_core::Error> for ConfigError {
    fn from(err: call_assist_core::Error) -> Self {
        ConfigError::Journey(err.to_string())
    }
}
