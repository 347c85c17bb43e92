//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/glutenconvert/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/glutenconvert/` (~/.config/glutenconvert/)
//! - Data: `$XDG_DATA_HOME/glutenconvert/` (~/.local/share/glutenconvert/)
//! - State/Logs: `$XDG_STATE_HOME/glutenconvert/` (~/.local/state/glutenconvert/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Inference service configuration
    #[serde(default)]
    pub inference: InferenceConfig,

    /// Chat behavior configuration
    #[serde(default)]
    pub chat: ChatConfig,

    /// Batch generation configuration
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Inference service configuration
///
/// The gateway refuses to start without an endpoint; the API key may come
/// from the config file or the `GLUTENCONVERT_API_KEY` environment variable.
#[derive(Debug, Deserialize, Clone)]
pub struct InferenceConfig {
    /// Service base URL (e.g. `https://inference.glutenconvert.app`)
    pub endpoint: Option<String>,

    /// API key (can also use env var)
    pub api_key: Option<String>,

    /// Model identifier sent with each request
    #[serde(default = "default_model")]
    pub model: String,

    /// HTTP request timeout in seconds
    #[serde(default = "default_inference_timeout")]
    pub timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            model: default_model(),
            timeout_secs: default_inference_timeout(),
        }
    }
}

impl InferenceConfig {
    /// Resolve the API key from config or environment
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("GLUTENCONVERT_API_KEY").ok())
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.is_none() {
            return Err(Error::Config(
                "inference.endpoint is required".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config(
                "inference.timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_inference_timeout() -> u64 {
    30
}

/// Chat behavior configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    /// Delay before the serving-size follow-up message is appended, in ms
    #[serde(default = "default_follow_up_delay")]
    pub follow_up_delay_ms: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            follow_up_delay_ms: default_follow_up_delay(),
        }
    }
}

fn default_follow_up_delay() -> u64 {
    500
}

/// Batch generation configuration
#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// Max attempts per individual recipe before skipping it
    #[serde(default = "default_item_retries")]
    pub item_retries: usize,

    /// Timeout for a single recipe-write attempt, in seconds
    #[serde(default = "default_item_timeout")]
    pub item_timeout_secs: u64,

    /// Pause between items to avoid rate limits, in ms
    #[serde(default = "default_item_pacing")]
    pub item_pacing_ms: u64,

    /// Consecutive item failures that escalate to a job-level failure
    #[serde(default = "default_failure_threshold")]
    pub consecutive_failure_threshold: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            item_retries: default_item_retries(),
            item_timeout_secs: default_item_timeout(),
            item_pacing_ms: default_item_pacing(),
            consecutive_failure_threshold: default_failure_threshold(),
        }
    }
}

impl GenerationConfig {
    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.item_retries == 0 {
            return Err(Error::Config(
                "generation.item_retries must be at least 1".to_string(),
            ));
        }
        if self.consecutive_failure_threshold == 0 {
            return Err(Error::Config(
                "generation.consecutive_failure_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_item_retries() -> usize {
    3
}

fn default_item_timeout() -> u64 {
    60
}

fn default_item_pacing() -> u64 {
    500
}

fn default_failure_threshold() -> usize {
    5
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.generation.validate()?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/glutenconvert/config.toml`
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("glutenconvert").join("config.toml")
    }

    /// Returns the data directory path (for the SQLite database)
    ///
    /// `$XDG_DATA_HOME/glutenconvert/`
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("glutenconvert")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/glutenconvert/`
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("glutenconvert")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/glutenconvert/data.db`
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("data.db")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/glutenconvert/glutenconvert.log`
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("glutenconvert.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.inference.endpoint.is_none());
        assert_eq!(config.chat.follow_up_delay_ms, 500);
        assert_eq!(config.generation.item_retries, 3);
        assert_eq!(config.generation.consecutive_failure_threshold, 5);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[inference]
endpoint = "https://inference.example.com"
model = "gpt-4o"
timeout_secs = 45

[generation]
item_retries = 5
item_pacing_ms = 250

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(
            config.inference.endpoint.as_deref(),
            Some("https://inference.example.com")
        );
        assert_eq!(config.inference.model, "gpt-4o");
        assert_eq!(config.inference.timeout_secs, 45);
        assert_eq!(config.generation.item_retries, 5);
        assert_eq!(config.generation.item_pacing_ms, 250);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_inference_validation() {
        let config = InferenceConfig::default();
        assert!(config.validate().is_err());

        let config = InferenceConfig {
            endpoint: Some("https://inference.example.com".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_generation_validation() {
        let config = GenerationConfig {
            item_retries: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        assert!(GenerationConfig::default().validate().is_ok());
    }
}
