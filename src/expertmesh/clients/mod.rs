//! Provider specific [`ClientWrapper`](crate::client_wrapper::ClientWrapper) implementations.
//!
//! Each submodule offers a concrete client that speaks a particular vendor's API while
//! conforming to the uniform expertmesh contract. [`build_client`] picks one from a
//! [`ClientConfig`].

pub mod common;

pub mod gemini;
pub mod mock;
pub mod openai;

use crate::expertmesh::client_wrapper::ClientWrapper;
use crate::expertmesh::config::{ClientConfig, Provider};
use crate::expertmesh::error::ConfigError;
use std::sync::Arc;

/// Instantiate the client described by `config`.
pub fn build_client(config: &ClientConfig) -> Result<Arc<dyn ClientWrapper>, ConfigError> {
    let api_key = || {
        config.api_key.as_deref().ok_or_else(|| {
            ConfigError::Validation(format!("provider {:?} requires an api_key", config.provider))
        })
    };

    let client: Arc<dyn ClientWrapper> = match config.provider {
        Provider::OpenAI => {
            let client = match &config.base_url {
                Some(base_url) => {
                    openai::OpenAIClient::new_with_base_url(api_key()?, &config.model, base_url)
                }
                None => openai::OpenAIClient::new_with_model_string(api_key()?, &config.model),
            };
            Arc::new(client.with_timeout(config.timeout()))
        }
        Provider::Gemini => {
            let client = match &config.base_url {
                Some(base_url) => {
                    gemini::GeminiClient::new_with_base_url(api_key()?, &config.model, base_url)
                }
                None => gemini::GeminiClient::new_with_model_string(api_key()?, &config.model),
            };
            Arc::new(client.with_timeout(config.timeout()))
        }
        Provider::Mock => Arc::new(mock::MockClient::new().with_model(config.model.clone())),
    };

    log::info!(
        "expertmesh: built {:?} client for model {}",
        config.provider,
        client.model_name()
    );
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_provider_needs_no_key() {
        let client = build_client(&ClientConfig::mock()).unwrap();
        assert_eq!(client.model_name(), "mock-model");
    }

    #[test]
    fn test_remote_provider_without_key_is_rejected() {
        let config = ClientConfig {
            provider: Provider::OpenAI,
            ..ClientConfig::mock()
        };
        assert!(matches!(
            build_client(&config),
            Err(ConfigError::Validation(_))
        ));
    }
}
