//! Embedding configuration.

use ragline_core::{AppConfig, AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default Ollama base URL
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Everything needed to load an embedding model and drive it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    /// Provider name: "ollama" or "hashed"
    pub provider: String,

    /// Model identifier (provider-specific)
    pub model: String,

    /// Provider base URL, when the provider talks HTTP
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Embedding vector dimensions
    pub dimensions: usize,

    /// Texts per provider call
    pub batch_size: usize,

    /// Batches in flight at once
    pub concurrency: usize,

    /// Longer inputs are truncated to this many characters
    pub max_input_chars: usize,

    /// Per-request timeout in seconds
    pub request_timeout_seconds: u64,

    /// Attempts per request, including the first
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "hashed".to_string(),
            model: "hashed-trigram-v1".to_string(),
            endpoint: None,
            dimensions: 384,
            batch_size: 32,
            concurrency: 4,
            max_input_chars: 8192,
            request_timeout_seconds: 30,
            max_retries: 3,
        }
    }
}

impl EmbeddingConfig {
    /// Derive the embedding configuration from the application config.
    pub fn from_app(config: &AppConfig) -> Self {
        let embedding = &config.embedding;
        Self {
            provider: embedding.provider.clone(),
            model: embedding.model.clone(),
            endpoint: embedding.endpoint.clone(),
            dimensions: config.rag.embedding_dimension,
            batch_size: embedding.batch_size,
            concurrency: embedding.concurrency,
            max_input_chars: embedding.max_input_chars,
            request_timeout_seconds: embedding.request_timeout_seconds,
            max_retries: config.rag.max_retries,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn endpoint_or_default(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string())
            .trim_end_matches('/')
            .to_string()
    }

    /// Check that vectors from `other` can share a collection with this one.
    pub fn validate_consistency(&self, other: &Self) -> AppResult<()> {
        if self.dimensions != other.dimensions {
            return Err(AppError::DimensionMismatch {
                expected: self.dimensions,
                actual: other.dimensions,
            });
        }

        if self.provider != other.provider || self.model != other.model {
            return Err(AppError::InvalidConfig(format!(
                "Embedding model changed from '{}/{}' to '{}/{}'; re-ingest into a new collection",
                self.provider, self.model, other.provider, other.model
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_app_config() {
        let mut app = AppConfig::default();
        app.embedding.batch_size = 8;
        app.rag.embedding_dimension = 256;

        let config = EmbeddingConfig::from_app(&app);
        assert_eq!(config.provider, "ollama");
        assert_eq!(config.model, "nomic-embed-text");
        assert_eq!(config.dimensions, 256);
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.endpoint_or_default(), DEFAULT_OLLAMA_URL);
    }

    #[test]
    fn test_validate_consistency_dimension_mismatch() {
        let config1 = EmbeddingConfig::default();
        let config2 = EmbeddingConfig {
            dimensions: 768,
            ..config1.clone()
        };

        assert!(config1.validate_consistency(&config1.clone()).is_ok());
        assert!(matches!(
            config1.validate_consistency(&config2),
            Err(AppError::DimensionMismatch {
                expected: 384,
                actual: 768
            })
        ));
    }

    #[test]
    fn test_validate_consistency_model_change() {
        let config1 = EmbeddingConfig::default();
        let config2 = EmbeddingConfig {
            model: "other".to_string(),
            ..config1.clone()
        };

        let err = config1.validate_consistency(&config2).unwrap_err();
        assert!(err.to_string().contains("re-ingest"));
    }
}
