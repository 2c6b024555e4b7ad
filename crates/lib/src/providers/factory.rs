//! # AI Provider Factory
//!
//! Builds boxed generation and embedding capabilities from configuration, so the
//! server and tests construct providers the same way.

use crate::{
    config::{EmbeddingConfig, ProviderConfig, ProviderKind, RetryConfig},
    errors::AiError,
    providers::ai::{
        gemini::GeminiProvider, local::LocalAiProvider, AiProvider, ApiEmbedder, Embedder,
        RetryingProvider,
    },
};
use tracing::info;

/// Returns the generateContent endpoint for a Gemini model.
pub fn gemini_api_url(model_name: &str) -> String {
    format!("https://generativelanguage.googleapis.com/v1beta/models/{model_name}:generateContent")
}

/// Creates a provider from its configuration, wrapped in the retry policy.
pub fn create_provider(
    config: &ProviderConfig,
    retry: &RetryConfig,
) -> Result<Box<dyn AiProvider>, AiError> {
    let provider: Box<dyn AiProvider> = match config.provider {
        ProviderKind::Gemini => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                AiError::MissingProvider(
                    "an api_key is required to use Gemini models".to_string(),
                )
            })?;
            let api_url = config
                .api_url
                .clone()
                .unwrap_or_else(|| gemini_api_url(&config.model_name));
            info!("Configuring Gemini provider with URL: {}", api_url);
            Box::new(RetryingProvider::new(
                GeminiProvider::new(api_url, api_key)?,
                retry.clone(),
            ))
        }
        ProviderKind::Local => {
            let api_url = config.api_url.clone().ok_or_else(|| {
                AiError::MissingProvider(
                    "api_url is not set for the local provider. Please set LOCAL_AI_API_URL."
                        .to_string(),
                )
            })?;
            info!("Configuring Local AI provider with URL: {}", api_url);
            Box::new(RetryingProvider::new(
                LocalAiProvider::new(
                    api_url,
                    config.api_key.clone(),
                    Some(config.model_name.clone()),
                )?,
                retry.clone(),
            ))
        }
    };
    Ok(provider)
}

/// Creates an embedder from its configuration.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>, AiError> {
    if config.dimension == 0 {
        return Err(AiError::MissingProvider(
            "embedding dimension must be greater than zero".to_string(),
        ));
    }
    info!(
        "Configuring embedder '{}' ({} dimensions)",
        config.model_name, config.dimension
    );
    Ok(Box::new(ApiEmbedder::new(
        config.api_url.clone(),
        config.model_name.clone(),
        config.api_key.clone(),
        config.dimension,
    )?))
}
