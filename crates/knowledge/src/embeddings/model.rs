//! Process-wide embedding model handle.

use crate::embeddings::{create_provider, EmbeddingConfig, EmbeddingProvider};
use ragline_core::{AppError, AppResult};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Loads the embedding model on first use and shares it afterwards.
///
/// Initialization runs at most once even under concurrent callers; a failed
/// load leaves the handle empty so a later call can try again. After a
/// successful load the provider is read-only and lives as long as the handle.
#[derive(Debug)]
pub struct ModelHandle {
    config: EmbeddingConfig,
    provider: OnceCell<Arc<dyn EmbeddingProvider>>,
}

impl ModelHandle {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self {
            config,
            provider: OnceCell::new(),
        }
    }

    /// A handle around an already constructed provider.
    pub fn preloaded(provider: Arc<dyn EmbeddingProvider>) -> Self {
        let config = EmbeddingConfig {
            provider: provider.provider_name().to_string(),
            model: provider.model_name().to_string(),
            dimensions: provider.dimensions(),
            ..Default::default()
        };
        Self {
            config,
            provider: OnceCell::new_with(Some(provider)),
        }
    }

    pub fn config(&self) -> &EmbeddingConfig {
        &self.config
    }

    pub fn is_loaded(&self) -> bool {
        self.provider.initialized()
    }

    /// Get the provider, loading it if needed.
    ///
    /// # Errors
    /// `ModelUnavailable` when loading fails; configuration errors pass
    /// through unchanged.
    pub async fn get(&self) -> AppResult<Arc<dyn EmbeddingProvider>> {
        let provider = self
            .provider
            .get_or_try_init(|| async {
                tracing::info!(
                    provider = %self.config.provider,
                    model = %self.config.model,
                    dimensions = self.config.dimensions,
                    "Loading embedding model"
                );
                create_provider(&self.config).await.map_err(|e| match e {
                    AppError::InvalidConfig(_)
                    | AppError::ModelUnavailable(_)
                    | AppError::DimensionMismatch { .. } => e,
                    other => AppError::ModelUnavailable(other.to_string()),
                })
            })
            .await?;
        Ok(Arc::clone(provider))
    }
}
