//! Configuration loading, validation, and management for Conductor.
//!
//! Loads configuration from `~/.conductor/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding `agent.model`.
pub const ENV_MODEL: &str = "CONDUCTOR_MODEL";
/// Environment variable overriding `agent.max_iterations`.
pub const ENV_MAX_ITERATIONS: &str = "CONDUCTOR_MAX_ITERATIONS";
/// Environment variable overriding `logging.level`.
pub const ENV_LOG_LEVEL: &str = "CONDUCTOR_LOG_LEVEL";

/// Tool name pattern matching every tool in `execution.fatal_tools`.
pub const ALL_TOOLS: &str = "*";

/// The root configuration structure.
///
/// Maps directly to `~/.conductor/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model and loop defaults for agents
    #[serde(default)]
    pub agent: AgentSettings,

    /// Tool execution policy (wrapper chain)
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Structured output retries
    #[serde(default)]
    pub extraction: ExtractionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Iteration budget per run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_max_iterations() -> usize {
    5
}
fn default_system_prompt() -> String {
    "You are a helpful assistant. Use the available tools when they help, \
     and answer directly once you have what you need."
        .into()
}
fn default_true() -> bool {
    true
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_iterations: default_max_iterations(),
            system_prompt: default_system_prompt(),
        }
    }
}

/// How tool failures are handled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Tools whose handler errors abort the run. `"*"` = every tool,
    /// empty = none (failures are reported back to the model).
    #[serde(default = "default_fatal_tools")]
    pub fatal_tools: Vec<String>,

    /// Per-call timeout; absent = unbounded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Wrap calls in a tracing span
    #[serde(default = "default_true")]
    pub log_calls: bool,

    /// Record `duration_ms` on tool results
    #[serde(default = "default_true")]
    pub time_calls: bool,

    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_fatal_tools() -> Vec<String> {
    vec![ALL_TOOLS.into()]
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            fatal_tools: default_fatal_tools(),
            timeout_ms: None,
            log_calls: true,
            time_calls: true,
            retry: RetryConfig::default(),
        }
    }
}

impl ExecutionConfig {
    /// Whether every tool is fail-fast.
    pub fn all_fatal(&self) -> bool {
        self.fatal_tools.iter().any(|t| t == ALL_TOOLS)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per call (1 = no retry)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry; doubles each time
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    1
}
fn default_base_delay_ms() -> u64 {
    200
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Correction rounds after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_retries() -> u32 {
    2
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.conductor/config.toml).
    ///
    /// Environment variables override the file:
    /// - `CONDUCTOR_MODEL`
    /// - `CONDUCTOR_MAX_ITERATIONS`
    /// - `CONDUCTOR_LOG_LEVEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
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

    /// Apply overrides from an environment lookup.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup(ENV_MODEL).filter(|m| !m.trim().is_empty()) {
            self.agent.model = model;
        }

        if let Some(raw) = lookup(ENV_MAX_ITERATIONS) {
            self.agent.max_iterations = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "{ENV_MAX_ITERATIONS} must be a positive integer, got '{raw}'"
                ))
            })?;
        }

        if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|l| !l.trim().is_empty()) {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".conductor")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.agent.temperature) {
            return Err(ConfigError::ValidationError(
                "agent.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }

        if self.agent.model.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "agent.model must not be empty".into(),
            ));
        }

        if self.execution.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "execution.retry.max_attempts must be at least 1".into(),
            ));
        }

        if self.execution.timeout_ms == Some(0) {
            return Err(ConfigError::ValidationError(
                "execution.timeout_ms must be greater than 0".into(),
            ));
        }

        if tracing_subscriber::EnvFilter::try_new(&self.logging.level).is_err() {
            return Err(ConfigError::ValidationError(format!(
                "logging.level '{}' is not a valid filter directive",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `logging.level`. Returns `false` if a subscriber was
/// already installed.
pub fn init_tracing(logging: &LoggingConfig) -> bool {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    if logging.json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
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
