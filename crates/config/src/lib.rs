//! Configuration loading, validation, and management for Turnstone.
//!
//! Loads configuration from `~/.turnstone/config.toml` with environment
//! variable overrides. Validates all settings at startup.
//!
//! Every knob the engine consumes at runtime lives here with a serde
//! default, so an empty config file is a fully working config.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.turnstone/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the LLM backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model assignments per engine role
    #[serde(default)]
    pub models: ModelsConfig,

    /// Hard resource ceilings for a turn
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Sampling temperatures per call kind
    #[serde(default)]
    pub temperatures: TemperaturesConfig,

    /// Intent router tuning
    #[serde(default)]
    pub router: RouterConfig,

    /// Scratchpad backend selection
    #[serde(default)]
    pub scratchpad: ScratchpadConfig,

    /// Long-term memory settings
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Provider transport settings
    #[serde(default)]
    pub provider: ProviderConfig,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}

/// Which model serves which engine role.
///
/// Routing and compression are cheap classification/summarization calls;
/// by default they share one small model while reasoning gets a stronger one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Model for the reasoning loop
    #[serde(default = "default_agent_model")]
    pub agent: String,

    /// Model for intent classification (temperature 0.0, JSON mode)
    #[serde(default = "default_utility_model")]
    pub router: String,

    /// Model for context compression and self-assessment
    #[serde(default = "default_utility_model")]
    pub compressor: String,
}

fn default_agent_model() -> String {
    "gpt-4o".into()
}
fn default_utility_model() -> String {
    "gpt-4o-mini".into()
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            agent: default_agent_model(),
            router: default_utility_model(),
            compressor: default_utility_model(),
        }
    }
}

/// Hard ceilings that bound a single turn.
///
/// A turn can never exceed these regardless of what the model asks for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum reasoning steps per turn
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Maximum tool calls dispatched from a single step
    #[serde(default = "default_max_tool_calls_per_step")]
    pub max_tool_calls_per_step: usize,

    /// Maximum cumulative tool calls per turn
    #[serde(default = "default_max_total_tool_calls")]
    pub max_total_tool_calls: usize,

    /// Working-history token budget; crossing it triggers compression
    #[serde(default = "default_context_limit_tokens")]
    pub context_limit_tokens: usize,

    /// User input above this is offloaded to the scratchpad before the
    /// turn opens; the conversation carries a preview and a `ref:` key
    #[serde(default = "default_user_input_limit_tokens")]
    pub user_input_limit_tokens: usize,

    /// Tool output above this is archived to the scratchpad
    #[serde(default = "default_tool_output_limit_tokens")]
    pub tool_output_limit_tokens: usize,

    /// Per-call tool execution timeout in seconds
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

fn default_max_steps() -> usize {
    15
}
fn default_max_tool_calls_per_step() -> usize {
    5
}
fn default_max_total_tool_calls() -> usize {
    30
}
fn default_context_limit_tokens() -> usize {
    6000
}
fn default_user_input_limit_tokens() -> usize {
    2000
}
fn default_tool_output_limit_tokens() -> usize {
    1500
}
fn default_tool_timeout_secs() -> u64 {
    60
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_tool_calls_per_step: default_max_tool_calls_per_step(),
            max_total_tool_calls: default_max_total_tool_calls(),
            context_limit_tokens: default_context_limit_tokens(),
            user_input_limit_tokens: default_user_input_limit_tokens(),
            tool_output_limit_tokens: default_tool_output_limit_tokens(),
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

/// Sampling temperatures per call kind.
///
/// Classification and summarization want determinism; chat wants warmth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemperaturesConfig {
    #[serde(default = "default_temp_router")]
    pub router: f32,

    #[serde(default = "default_temp_compress")]
    pub compress: f32,

    #[serde(default = "default_temp_agent")]
    pub agent: f32,

    #[serde(default = "default_temp_chat")]
    pub chat: f32,
}

fn default_temp_router() -> f32 {
    0.0
}
fn default_temp_compress() -> f32 {
    0.1
}
fn default_temp_agent() -> f32 {
    0.4
}
fn default_temp_chat() -> f32 {
    0.7
}

impl Default for TemperaturesConfig {
    fn default() -> Self {
        Self {
            router: default_temp_router(),
            compress: default_temp_compress(),
            agent: default_temp_agent(),
            chat: default_temp_chat(),
        }
    }
}

/// Intent router tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Below this estimated tool probability, short messages skip routing
    #[serde(default = "default_calibration_threshold")]
    pub calibration_threshold: f64,

    /// Fast-path eligibility: message length ceiling in characters
    #[serde(default = "default_fast_path_max_chars")]
    pub fast_path_max_chars: usize,

    /// Messages longer than this are head/tail truncated before classification
    #[serde(default = "default_classify_max_chars")]
    pub classify_max_chars: usize,
}

fn default_calibration_threshold() -> f64 {
    0.2
}
fn default_fast_path_max_chars() -> usize {
    220
}
fn default_classify_max_chars() -> usize {
    2000
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            calibration_threshold: default_calibration_threshold(),
            fast_path_max_chars: default_fast_path_max_chars(),
            classify_max_chars: default_classify_max_chars(),
        }
    }
}

/// Scratchpad backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScratchpadConfig {
    /// "memory" or "file"
    #[serde(default = "default_scratchpad_backend")]
    pub backend: String,

    /// Directory for the file backend (defaults under the config dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

fn default_scratchpad_backend() -> String {
    "memory".into()
}

impl Default for ScratchpadConfig {
    fn default() -> Self {
        Self {
            backend: default_scratchpad_backend(),
            dir: None,
        }
    }
}

/// Long-term memory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Whether to fetch/update long-term memory around each turn
    #[serde(default)]
    pub enabled: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { enabled: false }
    }
}

/// Provider transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Retry attempts for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff, in milliseconds
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

fn default_request_timeout_secs() -> u64 {
    120
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    1000
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("models", &self.models)
            .field("limits", &self.limits)
            .field("temperatures", &self.temperatures)
            .field("router", &self.router)
            .field("scratchpad", &self.scratchpad)
            .field("memory", &self.memory)
            .field("provider", &self.provider)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default location.
    ///
    /// Also checks environment variables for overrides:
    /// - `TURNSTONE_API_KEY` (falls back to `OPENAI_API_KEY`)
    /// - `TURNSTONE_BASE_URL`
    /// - `TURNSTONE_MODEL` (agent model)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("TURNSTONE_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(base_url) = std::env::var("TURNSTONE_BASE_URL") {
            config.base_url = base_url;
        }

        if let Ok(model) = std::env::var("TURNSTONE_MODEL") {
            config.models.agent = model;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".turnstone")
    }

    /// Directory for the file scratchpad backend.
    pub fn scratchpad_dir(&self) -> PathBuf {
        self.scratchpad
            .dir
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("scratchpad"))
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        for (name, t) in [
            ("router", self.temperatures.router),
            ("compress", self.temperatures.compress),
            ("agent", self.temperatures.agent),
            ("chat", self.temperatures.chat),
        ] {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::ValidationError(format!(
                    "temperatures.{name} must be between 0.0 and 2.0"
                )));
            }
        }

        if self.limits.max_steps == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_steps must be at least 1".into(),
            ));
        }

        if self.limits.max_tool_calls_per_step > self.limits.max_total_tool_calls {
            return Err(ConfigError::ValidationError(
                "limits.max_tool_calls_per_step cannot exceed max_total_tool_calls".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.router.calibration_threshold) {
            return Err(ConfigError::ValidationError(
                "router.calibration_threshold must be between 0.0 and 1.0".into(),
            ));
        }

        match self.scratchpad.backend.as_str() {
            "memory" | "file" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "scratchpad.backend must be \"memory\" or \"file\", got \"{other}\""
                )));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `init` command).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            models: ModelsConfig::default(),
            limits: LimitsConfig::default(),
            temperatures: TemperaturesConfig::default(),
            router: RouterConfig::default(),
            scratchpad: ScratchpadConfig::default(),
            memory: MemoryConfig::default(),
            provider: ProviderConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.limits.max_steps, 15);
        assert_eq!(config.limits.max_total_tool_calls, 30);
        assert_eq!(config.limits.max_tool_calls_per_step, 5);
        assert_eq!(config.limits.context_limit_tokens, 6000);
        assert!((config.temperatures.router - 0.0).abs() < f32::EPSILON);
        assert!((config.temperatures.agent - 0.4).abs() < f32::EPSILON);
        assert!((config.router.calibration_threshold - 0.2).abs() < f64::EPSILON);
        config.validate().unwrap();
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.limits.max_steps, config.limits.max_steps);
        assert_eq!(parsed.models.agent, config.models.agent);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.limits.max_steps, 15);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "base_url = \"http://localhost:8080/v1\"\n\n[limits]\nmax_steps = 5\n",
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.base_url, "http://localhost:8080/v1");
        assert_eq!(config.limits.max_steps, 5);
        assert_eq!(config.limits.max_total_tool_calls, 30);
    }

    #[test]
    fn rejects_bad_temperature() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[temperatures]\nagent = 3.5\n").unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn rejects_unknown_scratchpad_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[scratchpad]\nbackend = \"redis\"\n").unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn debug_redacts_api_key() {
        let mut config = AppConfig::default();
        config.api_key = Some("sk-secret-key".into());
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-secret-key"));
        assert!(debug.contains("[REDACTED]"));
    }
}
