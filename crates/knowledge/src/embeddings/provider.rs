//! Embedding provider trait and factory.

use crate::embeddings::config::EmbeddingConfig;
use ragline_core::{AppError, AppResult};
use std::sync::Arc;

/// Trait for embedding providers.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Get provider name (e.g., "hashed", "ollama")
    fn provider_name(&self) -> &str;

    /// Get model identifier
    fn model_name(&self) -> &str;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Generate embeddings for multiple texts, one vector per text in order.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Generate embedding for a single text (convenience method).
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| AppError::Encoding("No embedding returned".to_string()))
    }
}

/// Load the provider named in `config`.
///
/// Remote providers are probed once so an unreachable service surfaces as
/// `ModelUnavailable` here rather than on the first query.
pub async fn create_provider(config: &EmbeddingConfig) -> AppResult<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "hashed" => Ok(Arc::new(super::providers::HashedProvider::new(
            config.dimensions,
        ))),

        "ollama" => {
            let provider = super::providers::OllamaProvider::new(config.clone()).await?;
            Ok(Arc::new(provider))
        }

        _ => Err(AppError::InvalidConfig(format!(
            "Unknown embedding provider: '{}'. Supported providers: ollama, hashed",
            config.provider
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_hashed_provider() {
        let config = EmbeddingConfig::default();

        let provider = create_provider(&config).await.unwrap();
        assert_eq!(provider.provider_name(), "hashed");
        assert_eq!(provider.dimensions(), 384);

        let embedding = provider.embed("test text").await.unwrap();
        assert_eq!(embedding.len(), 384);
    }

    #[tokio::test]
    async fn test_create_unknown_provider() {
        let config = EmbeddingConfig {
            provider: "unknown".to_string(),
            ..Default::default()
        };

        let err = create_provider(&config).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidConfig(_)));
        assert!(err.to_string().contains("Unknown embedding provider"));
    }
}
