//! Vector store gateway factory.
//!
//! Builds the gateway once at startup; the same instance is then handed to
//! every component that talks to the store.

use crate::gateway::VectorStoreGateway;
use crate::providers::{MemoryStore, PineconeClient};
use pinesink_core::{AppError, AppResult, SinkConfig};
use std::sync::Arc;

/// Create a gateway for the configured provider.
///
/// # Errors
/// Returns error if:
/// - Provider is unknown
/// - The Pinecone provider has no api key or control-plane URL
/// - HTTP client initialization fails
pub fn create_gateway(config: &SinkConfig) -> AppResult<Arc<dyn VectorStoreGateway>> {
    match config.provider_name().as_str() {
        "pinecone" => {
            if config.api_key.is_empty() {
                return Err(AppError::Config(
                    "Pinecone provider requires api_key".to_string(),
                ));
            }
            let controller_url = config.controller_url().ok_or_else(|| {
                AppError::Config(
                    "Pinecone provider requires environment or controller_url".to_string(),
                )
            })?;

            tracing::debug!("Using Pinecone control plane at {}", controller_url);
            let client = PineconeClient::new(controller_url, config.api_key.clone())?;
            Ok(Arc::new(client))
        }
        "memory" => {
            tracing::info!("Using in-memory vector store; nothing will be written to Pinecone");
            Ok(Arc::new(MemoryStore::new()))
        }
        _ => Err(AppError::Config(format!(
            "Unknown provider: {}",
            config.provider
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: &str) -> SinkConfig {
        SinkConfig {
            api_key: "FOO".to_string(),
            index_name: "docs".to_string(),
            environment: Some("us-west1-gcp".to_string()),
            provider: provider.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_pinecone_gateway() {
        let gateway = create_gateway(&config("pinecone")).unwrap();
        assert_eq!(gateway.provider_name(), "pinecone");
    }

    #[test]
    fn test_provider_matching_agrees_with_validation() {
        let config = config("Memory");
        assert!(config.validate().is_ok());
        let gateway = create_gateway(&config).unwrap();
        assert_eq!(gateway.provider_name(), "memory");
    }

    #[test]
    fn test_create_memory_gateway() {
        let gateway = create_gateway(&config("memory")).unwrap();
        assert_eq!(gateway.provider_name(), "memory");
    }

    #[test]
    fn test_pinecone_requires_api_key() {
        let mut config = config("pinecone");
        config.api_key.clear();
        match create_gateway(&config) {
            Err(err) => assert!(err.to_string().contains("requires api_key")),
            Ok(_) => panic!("Expected error for Pinecone without api key"),
        }
    }

    #[test]
    fn test_unknown_provider() {
        match create_gateway(&config("qdrant")) {
            Err(err) => assert!(err.to_string().contains("Unknown provider")),
            Ok(_) => panic!("Expected error for unknown provider"),
        }
    }
}
