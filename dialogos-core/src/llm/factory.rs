//! Factory for creating model gateways from configuration
//!
//! Backend selection is polymorphism over the one [`ModelGateway`]
//! capability; call sites never branch on the provider.

use std::sync::Arc;

use crate::config::{GatewayConfig, GatewayProvider};
use crate::error::Result;
use crate::llm::ModelGateway;
use crate::llm::providers::{AnthropicGateway, OpenAIGateway};

/// Factory for creating model gateways
pub struct GatewayFactory;

impl GatewayFactory {
    /// Create a model gateway from configuration.
    ///
    /// API keys come from the config when present, otherwise from the
    /// provider's environment variable.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway cannot be created (e.g., missing
    /// API key).
    pub fn create(config: &GatewayConfig) -> Result<Arc<dyn ModelGateway>> {
        let model = if config.model.is_empty() {
            None
        } else {
            Some(config.model.clone())
        };

        match config.provider {
            GatewayProvider::OpenAI => {
                let gateway = if let Some(api_key) = &config.api_key {
                    let model = model.unwrap_or_else(|| "gpt-4o".to_string());
                    if let Some(base_url) = &config.base_url {
                        OpenAIGateway::with_base_url(api_key.clone(), model, base_url.clone())
                    } else {
                        OpenAIGateway::new(api_key.clone(), model)
                    }
                } else {
                    OpenAIGateway::from_env(model)?
                };
                Ok(Arc::new(gateway))
            }

            GatewayProvider::Anthropic => {
                let gateway = if let Some(api_key) = &config.api_key {
                    let model = model.unwrap_or_else(|| "claude-sonnet-4-5".to_string());
                    if let Some(base_url) = &config.base_url {
                        AnthropicGateway::with_base_url(api_key.clone(), model, base_url.clone())
                    } else {
                        AnthropicGateway::new(api_key.clone(), model)
                    }
                } else {
                    AnthropicGateway::from_env(model)?
                };
                Ok(Arc::new(gateway))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;

    #[test]
    fn test_create_openai_with_config_key() {
        let config = GatewayConfig {
            provider: GatewayProvider::OpenAI,
            model: "gpt-4o-mini".to_string(),
            api_key: Some("test-key".to_string()),
            ..Default::default()
        };

        let gateway = GatewayFactory::create(&config).unwrap();
        assert_eq!(gateway.model_info().provider, "openai");
        assert_eq!(gateway.model_info().model_id, "gpt-4o-mini");
    }

    #[test]
    fn test_create_anthropic_with_config_key() {
        let config = GatewayConfig {
            provider: GatewayProvider::Anthropic,
            model: "claude-sonnet-4-5".to_string(),
            api_key: Some("test-key".to_string()),
            base_url: Some("http://localhost:9999".to_string()),
            ..Default::default()
        };

        let gateway = GatewayFactory::create(&config).unwrap();
        assert_eq!(gateway.model_info().provider, "anthropic");
    }
}
