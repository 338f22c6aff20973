//! Configuration types for the session engine

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration for the session engine
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Context window construction
    pub context: ContextConfig,

    /// Model gateway configuration
    pub gateway: GatewayConfig,

    /// Streaming turn behavior
    pub turn: TurnConfig,

    /// Inbound rate limiting (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitConfig>,
}

/// Context window configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Number of recent messages included in the model context
    pub window_size: usize,

    /// Persona/instruction text prepended as the system entry
    pub system_prompt: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            window_size: 15,
            system_prompt: "You are a helpful assistant.".to_string(),
        }
    }
}

/// Model gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Backend provider
    pub provider: GatewayProvider,

    /// Model identifier
    pub model: String,

    /// API key (if needed, prefer env vars)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL (for custom or self-hosted endpoints)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Sampling temperature, passed through to the backend unchanged
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum response length in tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_response_tokens: Option<usize>,

    /// Retry attempts when opening a gateway call fails transiently
    pub max_retries: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            provider: GatewayProvider::OpenAI,
            model: "gpt-4o".to_string(),
            api_key: None,
            base_url: None,
            temperature: None,
            max_response_tokens: None,
            max_retries: 3,
        }
    }
}

/// Model backend provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GatewayProvider {
    #[default]
    OpenAI,
    Anthropic,
}

/// Streaming turn configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    /// Overall turn timeout; expiry is treated like a client disconnect
    #[serde(with = "humantime_serde")]
    pub turn_timeout: Duration,

    /// Per-fragment transport write timeout
    #[serde(with = "humantime_serde")]
    pub write_timeout: Duration,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            turn_timeout: Duration::from_secs(120),
            write_timeout: Duration::from_secs(10),
        }
    }
}

/// Rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum requests per key within the window
    pub max_requests: usize,

    /// Window duration
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window: Duration::from_secs(60),
        }
    }
}

impl EngineConfig {
    /// Load configuration from file and environment variables.
    ///
    /// Loads in this order:
    /// 1. Default configuration
    /// 2. Configuration file (dialogos.toml or path from DIALOGOS_CONFIG_PATH)
    /// 3. Environment variable overrides
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file is invalid or validation fails.
    pub fn load() -> crate::error::Result<Self> {
        use figment::{
            Figment,
            providers::{Env, Format, Toml},
        };

        let mut figment = Figment::new()
            .merge(Toml::file("dialogos.toml"))
            .merge(Env::prefixed("DIALOGOS_").split("_"));

        // Check for custom config path
        if let Ok(path) = std::env::var("DIALOGOS_CONFIG_PATH") {
            figment = figment.merge(Toml::file(path));
        }

        let config: EngineConfig = figment.extract().map_err(|e| {
            crate::error::EngineError::Configuration(format!("failed to load configuration: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::error::Result<Self> {
        use figment::{
            Figment,
            providers::{Format, Toml},
        };

        let config: EngineConfig =
            Figment::new()
                .merge(Toml::file(path))
                .extract()
                .map_err(|e| {
                    crate::error::EngineError::Configuration(format!(
                        "failed to load configuration file: {}",
                        e
                    ))
                })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    fn validate(&self) -> crate::error::Result<()> {
        use crate::error::EngineError;

        if self.context.window_size == 0 {
            return Err(EngineError::Configuration(
                "context.window_size must be at least 1".to_string(),
            ));
        }
        if self.gateway.model.is_empty() {
            return Err(EngineError::Configuration(
                "gateway.model must not be empty".to_string(),
            ));
        }
        if self.turn.turn_timeout.is_zero() || self.turn.write_timeout.is_zero() {
            return Err(EngineError::Configuration(
                "turn timeouts must be non-zero".to_string(),
            ));
        }
        if let Some(rl) = &self.rate_limit {
            if rl.max_requests == 0 || rl.window.is_zero() {
                return Err(EngineError::Configuration(
                    "rate_limit.max_requests and rate_limit.window must be non-zero".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.context.window_size, 15);
        assert_eq!(config.gateway.provider, GatewayProvider::OpenAI);
        assert_eq!(config.turn.turn_timeout, Duration::from_secs(120));
        assert!(config.rate_limit.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let mut config = EngineConfig::default();
        config.context.window_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_model() {
        let mut config = EngineConfig::default();
        config.gateway.model = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_provider_deserializes_lowercase() {
        let config: GatewayConfig =
            serde_json::from_str(r#"{"provider": "anthropic", "model": "claude-sonnet-4-5"}"#)
                .unwrap();
        assert_eq!(config.provider, GatewayProvider::Anthropic);
    }

    #[test]
    fn test_turn_config_humantime() {
        let config: TurnConfig =
            serde_json::from_str(r#"{"turn_timeout": "90s", "write_timeout": "5s"}"#).unwrap();
        assert_eq!(config.turn_timeout, Duration::from_secs(90));
        assert_eq!(config.write_timeout, Duration::from_secs(5));
    }
}
