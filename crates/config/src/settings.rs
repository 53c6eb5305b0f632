//! Main settings module

use call_assist_core::SpeakerRole;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// HTTP server and session registry
    #[serde(default)]
    pub server: ServerConfig,

    /// Tiered classifier thresholds
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Streaming wrapper behaviour
    #[serde(default)]
    pub streaming: StreamingConfig,

    /// Tier 2 language-model backend
    #[serde(default)]
    pub llm: LlmSettings,

    /// Realtime gateway
    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Optional YAML journey catalog; built-in journeys are used when unset
    #[serde(default)]
    pub journeys_path: Option<String>,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum concurrent call sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Idle time after which a session is ended by the cleanup task
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,

    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// CORS allowed origins; empty means any
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_max_sessions() -> usize {
    500
}
fn default_session_timeout() -> u64 {
    3600
}
fn default_cleanup_interval() -> u64 {
    60
}
fn default_request_timeout() -> u64 {
    30
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_sessions: default_max_sessions(),
            session_timeout_secs: default_session_timeout(),
            cleanup_interval_secs: default_cleanup_interval(),
            request_timeout_secs: default_request_timeout(),
            cors_enabled: true,
            cors_origins: Vec::new(),
        }
    }
}

/// Tiered classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Tier 1 confidence at or above which Tier 2 is skipped
    #[serde(default = "default_tier1_min_confidence")]
    pub tier1_min_confidence: u8,

    /// Whether Tier 2 may be consulted at all
    #[serde(default = "default_true")]
    pub use_tier2: bool,

    #[serde(default = "default_tier2_timeout_ms")]
    pub tier2_timeout_ms: u64,

    /// Cap on "did you mean" alternatives
    #[serde(default = "default_max_alternatives")]
    pub max_alternatives: usize,
}

fn default_tier1_min_confidence() -> u8 {
    70
}
fn default_tier2_timeout_ms() -> u64 {
    2000
}
fn default_max_alternatives() -> usize {
    3
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            tier1_min_confidence: default_tier1_min_confidence(),
            use_tier2: true,
            tier2_timeout_ms: default_tier2_timeout_ms(),
            max_alternatives: default_max_alternatives(),
        }
    }
}

/// Streaming classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Quiet period before the full Tier 1 + Tier 2 pass
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Tier 1 confidence that triggers an immediate emission
    #[serde(default = "default_immediate_emit_confidence")]
    pub immediate_emit_confidence: u8,
}

fn default_debounce_ms() -> u64 {
    500
}
fn default_immediate_emit_confidence() -> u8 {
    50
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            immediate_emit_confidence: default_immediate_emit_confidence(),
        }
    }
}

/// Tier 2 backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// `ollama` or `claude`
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Falls back to ANTHROPIC_API_KEY for the Claude provider
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_llm_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
}

fn default_provider() -> String {
    "ollama".to_string()
}
fn default_model() -> String {
    "qwen2.5:3b-instruct".to_string()
}
fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}
fn default_max_tokens() -> usize {
    200
}
fn default_llm_timeout_ms() -> u64 {
    5000
}
fn default_max_retries() -> u32 {
    1
}
fn default_initial_backoff_ms() -> u64 {
    100
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            endpoint: default_endpoint(),
            api_key: None,
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            timeout_ms: default_llm_timeout_ms(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
        }
    }
}

/// Realtime gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Speaker roles fed to classification and extraction
    #[serde(default = "default_classify_roles")]
    pub classify_speaker_roles: Vec<SpeakerRole>,

    /// Capacity of the outbound broadcast channel
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,

    /// Save a snapshot on every station change and at session end
    #[serde(default = "default_true")]
    pub persist_snapshots: bool,
}

fn default_classify_roles() -> Vec<SpeakerRole> {
    vec![SpeakerRole::Caller]
}
fn default_broadcast_capacity() -> usize {
    1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            classify_speaker_roles: default_classify_roles(),
            broadcast_capacity: default_broadcast_capacity(),
            persist_snapshots: true,
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level, used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,

    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_classifier()?;
        self.validate_streaming()?;
        self.validate_llm()?;
        self.validate_gateway()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.max_sessions == 0 {
            return Err(invalid("server.max_sessions", "Must be greater than zero"));
        }
        if self.server.session_timeout_secs == 0 {
            return Err(invalid(
                "server.session_timeout_secs",
                "Must be greater than zero",
            ));
        }
        if self.server.cleanup_interval_secs == 0 {
            return Err(invalid(
                "server.cleanup_interval_secs",
                "Must be greater than zero",
            ));
        }
        Ok(())
    }

    fn validate_classifier(&self) -> Result<(), ConfigError> {
        let c = &self.classifier;
        if c.tier1_min_confidence > 100 {
            return Err(invalid(
                "classifier.tier1_min_confidence",
                format!("Must be between 0 and 100, got {}", c.tier1_min_confidence),
            ));
        }
        if c.use_tier2 && c.tier2_timeout_ms == 0 {
            return Err(invalid(
                "classifier.tier2_timeout_ms",
                "Must be greater than zero when Tier 2 is enabled",
            ));
        }
        Ok(())
    }

    fn validate_streaming(&self) -> Result<(), ConfigError> {
        let s = &self.streaming;
        if !(50..=5000).contains(&s.debounce_ms) {
            return Err(invalid(
                "streaming.debounce_ms",
                format!("Must be between 50 and 5000, got {}", s.debounce_ms),
            ));
        }
        if s.immediate_emit_confidence > 100 {
            return Err(invalid(
                "streaming.immediate_emit_confidence",
                format!(
                    "Must be between 0 and 100, got {}",
                    s.immediate_emit_confidence
                ),
            ));
        }
        Ok(())
    }

    fn validate_llm(&self) -> Result<(), ConfigError> {
        match self.llm.provider.to_lowercase().as_str() {
            "ollama" | "local" | "claude" | "anthropic" => {}
            other => {
                return Err(invalid(
                    "llm.provider",
                    format!("Unsupported provider '{}'", other),
                ))
            }
        }
        if self.llm.model.trim().is_empty() {
            return Err(invalid("llm.model", "Must not be empty"));
        }
        Ok(())
    }

    fn validate_gateway(&self) -> Result<(), ConfigError> {
        if self.gateway.broadcast_capacity == 0 {
            return Err(invalid(
                "gateway.broadcast_capacity",
                "Must be greater than zero",
            ));
        }
        Ok(())
    }
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.into(),
    }
}

/// Load settings from files and environment
///
/// Sources in increasing precedence: `config/default`, `config/{env}`, then
/// `CALL_ASSIST__SECTION__KEY` environment variables.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("CALL_ASSIST")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.server.max_sessions, 500);
        assert_eq!(settings.classifier.tier1_min_confidence, 70);
        assert_eq!(settings.gateway.classify_speaker_roles, vec![SpeakerRole::Caller]);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_debounce_range() {
        let mut settings = Settings::default();
        settings.streaming.debounce_ms = 10;
        assert!(settings.validate().is_err());

        settings.streaming.debounce_ms = 300;
        assert!(settings.validate().is_ok());

        settings.streaming.debounce_ms = 6000;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_confidence_range() {
        let mut settings = Settings::default();
        settings.classifier.tier1_min_confidence = 101;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("tier1_min_confidence"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let mut settings = Settings::default();
        settings.llm.provider = "mystery".into();
        assert!(settings.validate().is_err());

        settings.llm.provider = "Claude".into();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut settings = Settings::default();
        settings.server.max_sessions = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "streaming:\n  debounce_ms: 400\ngateway:\n  classify_speaker_roles: [caller, agent]\n";
        let settings: Settings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(settings.streaming.debounce_ms, 400);
        assert_eq!(settings.streaming.immediate_emit_confidence, 50);
        assert_eq!(settings.gateway.classify_speaker_roles.len(), 2);
        assert_eq!(settings.server.port, 8080);
    }
}
