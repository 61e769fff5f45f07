//! Configuration management for chatstitch
//!
//! Parses TOML configuration files and provides typed access to settings.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Upper bound for `client.read_timeout_seconds` and `client.connect_timeout_seconds`
pub const MAX_TIMEOUT_SECONDS: u64 = 3600;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub client: ClientConfig,
    pub chat: ChatConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Remote chat backend configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    pub base_url: String,
    #[serde(default = "default_chat_path")]
    pub chat_path: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    /// Longest silence allowed between received chunks; a stream that keeps
    /// producing data may run for any length of time
    #[serde(default = "default_read_timeout")]
    pub read_timeout_seconds: u64,
    /// Name of the environment variable holding the bearer token, if any
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl ClientConfig {
    /// Full URL of the chat endpoint (used for both streaming and kill requests)
    pub fn chat_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.chat_path)
    }

    /// Resolve the bearer token from the configured environment variable
    ///
    /// Returns `None` when no variable is configured or it is unset/empty.
    pub fn api_key(&self) -> Option<String> {
        let var = self.api_key_env.as_deref()?;
        match std::env::var(var) {
            Ok(value) if !value.trim().is_empty() => Some(value),
            _ => {
                tracing::debug!(env_var = %var, "API key environment variable not set");
                None
            }
        }
    }
}

fn default_chat_path() -> String {
    "/chat".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_read_timeout() -> u64 {
    300
}

/// Generation defaults applied to every outbound request
///
/// Fields are private; values are validated by `Config::validate()` and read
/// through accessors.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatConfig {
    model: String,
    #[serde(default = "default_temperature")]
    temperature: f64,
    #[serde(default = "default_max_tokens")]
    max_tokens: usize,
    #[serde(default)]
    system_prompt: Option<String>,
    #[serde(default = "default_time_zone")]
    time_zone: String,
}

impl ChatConfig {
    /// Model identifier sent as `model`
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Sampling temperature
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Maximum tokens to generate
    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// System prompt prepended to every request, if configured
    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    /// IANA time zone name reported in request options
    pub fn time_zone(&self) -> &str {
        &self.time_zone
    }
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> usize {
    2048
}

fn default_time_zone() -> String {
    "UTC".to_string()
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        // Phase 1: Read file (preserves io::Error context)
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|source| AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            })?;

        // Phase 2: Parse TOML (preserves toml::de::Error context)
        let config: Self =
            toml::from_str(&content).map_err(|source| AppError::ConfigParseFailed {
                path: path_display.clone(),
                source,
            })?;

        // Phase 3: Validate parsed config
        config
            .validate()
            .map_err(|e| AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        tracing::debug!(
            base_url = %config.client.base_url,
            model = %config.chat.model,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Validate configuration after parsing
    ///
    /// This is called automatically by `from_file()`, but can also be called
    /// explicitly when constructing Config via other means (e.g., in tests).
    pub fn validate(&self) -> AppResult<()> {
        let client = &self.client;

        if !client.base_url.starts_with("http://") && !client.base_url.starts_with("https://") {
            return Err(AppError::Config(format!(
                "client.base_url '{}' must start with 'http://' or 'https://'",
                client.base_url
            )));
        }

        if !client.chat_path.starts_with('/') {
            return Err(AppError::Config(format!(
                "client.chat_path '{}' must start with '/'",
                client.chat_path
            )));
        }

        for (name, seconds) in [
            ("connect_timeout_seconds", client.connect_timeout_seconds),
            ("read_timeout_seconds", client.read_timeout_seconds),
        ] {
            if seconds == 0 {
                return Err(AppError::Config(format!(
                    "client.{} must be greater than 0",
                    name
                )));
            }
            if seconds > MAX_TIMEOUT_SECONDS {
                return Err(AppError::Config(format!(
                    "client.{} cannot exceed {} seconds, got {}",
                    name, MAX_TIMEOUT_SECONDS, seconds
                )));
            }
        }

        if let Some(var) = &client.api_key_env
            && var.trim().is_empty()
        {
            return Err(AppError::Config(
                "client.api_key_env must not be empty when set".to_string(),
            ));
        }

        let chat = &self.chat;

        if chat.model.trim().is_empty() {
            return Err(AppError::Config("chat.model must not be empty".to_string()));
        }

        if chat.max_tokens == 0 {
            return Err(AppError::Config(
                "chat.max_tokens must be greater than 0".to_string(),
            ));
        }
        if chat.max_tokens > u32::MAX as usize {
            return Err(AppError::Config(format!(
                "chat.max_tokens={} exceeds u32::MAX ({})",
                chat.max_tokens,
                u32::MAX
            )));
        }

        // Standard LLM range
        if !chat.temperature.is_finite() || chat.temperature < 0.0 || chat.temperature > 2.0 {
            return Err(AppError::Config(format!(
                "chat.temperature {} must be a finite number between 0.0 and 2.0",
                chat.temperature
            )));
        }

        if chat.time_zone.trim().is_empty() {
            return Err(AppError::Config(
                "chat.time_zone must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Config {
        toml::from_str(toml).expect("should parse test config")
    }

    const MINIMAL: &str = r#"
[client]
base_url = "http://localhost:8080"

[chat]
model = "gpt-4o"
"#;

    #[test]
    fn test_minimal_config_applies_defaults() {
        let config = parse(MINIMAL);
        assert_eq!(config.client.chat_path, "/chat");
        assert_eq!(config.client.connect_timeout_seconds, 10);
        assert_eq!(config.client.read_timeout_seconds, 300);
        assert_eq!(config.chat.temperature(), 0.7);
        assert_eq!(config.chat.max_tokens(), 2048);
        assert_eq!(config.chat.time_zone(), "UTC");
        assert!(config.chat.system_prompt().is_none());
        assert_eq!(config.observability.log_level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_chat_url_joins_without_double_slash() {
        let mut config = parse(MINIMAL);
        config.client.base_url = "http://localhost:8080/".to_string();
        assert_eq!(config.client.chat_url(), "http://localhost:8080/chat");
    }

    #[test]
    fn test_rejects_base_url_without_scheme() {
        let mut config = parse(MINIMAL);
        config.client.base_url = "localhost:8080".to_string();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("base_url"), "got: {}", err);
    }

    #[test]
    fn test_rejects_chat_path_without_leading_slash() {
        let mut config = parse(MINIMAL);
        config.client.chat_path = "chat".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_and_excessive_timeout() {
        let mut config = parse(MINIMAL);
        config.client.read_timeout_seconds = 0;
        assert!(config.validate().is_err());

        config.client.read_timeout_seconds = MAX_TIMEOUT_SECONDS + 1;
        assert!(config.validate().is_err());

        config.client.read_timeout_seconds = MAX_TIMEOUT_SECONDS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_connect_timeout() {
        let mut config = parse(MINIMAL);
        config.client.connect_timeout_seconds = 0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("connect_timeout_seconds"), "got: {}", err);
    }

    #[test]
    fn test_rejects_invalid_temperature() {
        for bad in ["-0.1", "2.5", "nan"] {
            let toml = format!(
                "[client]\nbase_url = \"http://x\"\n[chat]\nmodel = \"m\"\ntemperature = {}\n",
                bad
            );
            let config = parse(&toml);
            assert!(config.validate().is_err(), "temperature {} accepted", bad);
        }
    }

    #[test]
    fn test_rejects_zero_max_tokens() {
        let config = parse(
            "[client]\nbase_url = \"http://x\"\n[chat]\nmodel = \"m\"\nmax_tokens = 0\n",
        );
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("max_tokens"));
    }

    #[test]
    fn test_rejects_empty_model() {
        let config = parse("[client]\nbase_url = \"http://x\"\n[chat]\nmodel = \"  \"\n");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_api_key_absent_when_not_configured() {
        let config = parse(MINIMAL);
        assert!(config.client.api_key().is_none());
    }
}
