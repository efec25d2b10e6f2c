//! Embedding engine.
//!
//! [`Embedder`] turns texts into vectors through the provider held by a
//! shared [`ModelHandle`]. Inputs are split into batches that run
//! concurrently; output order always matches input order.

pub mod config;
pub mod model;
pub mod provider;
pub mod providers;

pub use config::EmbeddingConfig;
pub use model::ModelHandle;
pub use provider::{create_provider, EmbeddingProvider};

use futures::stream::{self, StreamExt, TryStreamExt};
use ragline_core::{AppError, AppResult};
use std::sync::Arc;

/// Vectors for a batch of texts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Embeddings {
    /// One vector per input text, in input order
    pub vectors: Vec<Vec<f32>>,

    /// Indices of inputs that were truncated before embedding
    pub truncated: Vec<usize>,
}

/// Batching, concurrency and validation around an embedding provider.
#[derive(Debug, Clone)]
pub struct Embedder {
    model: Arc<ModelHandle>,
    batch_size: usize,
    concurrency: usize,
    max_input_chars: usize,
}

impl Embedder {
    pub fn new(model: Arc<ModelHandle>) -> Self {
        let config = model.config();
        Self {
            batch_size: config.batch_size.max(1),
            concurrency: config.concurrency.max(1),
            max_input_chars: config.max_input_chars.max(1),
            model,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_max_input_chars(mut self, max_input_chars: usize) -> Self {
        self.max_input_chars = max_input_chars.max(1);
        self
    }

    pub fn model(&self) -> &Arc<ModelHandle> {
        &self.model
    }

    /// Embed `texts`, preserving order and length.
    ///
    /// # Errors
    /// * `ModelUnavailable` if the model cannot be loaded
    /// * `Encoding` if the provider returns the wrong number of vectors or
    ///   vectors of the wrong dimension
    pub async fn embed(&self, texts: &[String]) -> AppResult<Embeddings> {
        if texts.is_empty() {
            return Ok(Embeddings::default());
        }

        let provider = self.model.get().await?;
        let dimensions = provider.dimensions();

        let mut truncated = Vec::new();
        let prepared: Vec<String> = texts
            .iter()
            .enumerate()
            .map(|(index, text)| match truncate_chars(text, self.max_input_chars) {
                Some(cut) => {
                    tracing::warn!(
                        index,
                        original_chars = text.chars().count(),
                        max_input_chars = self.max_input_chars,
                        "Truncating embedding input"
                    );
                    truncated.push(index);
                    cut.to_string()
                }
                None => text.clone(),
            })
            .collect();

        tracing::debug!(
            texts = prepared.len(),
            batch_size = self.batch_size,
            concurrency = self.concurrency,
            provider = provider.provider_name(),
            "Embedding texts"
        );

        let batches: Vec<Vec<Vec<f32>>> = stream::iter(prepared.chunks(self.batch_size))
            .map(|batch| {
                let provider = Arc::clone(&provider);
                async move {
                    let vectors = provider.embed_batch(batch).await?;
                    if vectors.len() != batch.len() {
                        return Err(AppError::Encoding(format!(
                            "Provider returned {} vectors for {} texts",
                            vectors.len(),
                            batch.len()
                        )));
                    }
                    Ok(vectors)
                }
            })
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let vectors: Vec<Vec<f32>> = batches.into_iter().flatten().collect();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimensions) {
            return Err(AppError::Encoding(format!(
                "Provider returned a {}-dimensional vector, expected {}",
                bad.len(),
                dimensions
            )));
        }

        Ok(Embeddings { vectors, truncated })
    }

    /// Embed a single query as one batch.
    pub async fn embed_query(&self, query: &str) -> AppResult<Vec<f32>> {
        let mut embeddings = self.embed(&[query.to_string()]).await?;
        embeddings
            .vectors
            .pop()
            .ok_or_else(|| AppError::Encoding("No embedding returned for query".to_string()))
    }

    /// Dimension of the loaded model's vectors.
    pub async fn dimensions(&self) -> AppResult<usize> {
        Ok(self.model.get().await?.dimensions())
    }
}

/// The first `max_chars` characters of `text`, or `None` if it already fits.
fn truncate_chars(text: &str, max_chars: usize) -> Option<&str> {
    text.char_indices()
        .nth(max_chars)
        .map(|(byte_idx, _)| &text[..byte_idx])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::providers::HashedProvider;
    use std::sync::Mutex;

    /// Records batch sizes and can misbehave on demand.
    #[derive(Debug, Default)]
    struct RecordingProvider {
        batches: Mutex<Vec<usize>>,
        drop_last: bool,
    }

    #[async_trait::async_trait]
    impl EmbeddingProvider for RecordingProvider {
        fn provider_name(&self) -> &str {
            "recording"
        }

        fn model_name(&self) -> &str {
            "recording"
        }

        fn dimensions(&self) -> usize {
            2
        }

        async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
            self.batches.lock().unwrap().push(texts.len());
            let mut vectors: Vec<Vec<f32>> = texts
                .iter()
                .map(|t| vec![t.chars().count() as f32, 1.0])
                .collect();
            if self.drop_last {
                vectors.pop();
            }
            Ok(vectors)
        }
    }

    fn embedder(provider: Arc<dyn EmbeddingProvider>) -> Embedder {
        Embedder::new(Arc::new(ModelHandle::preloaded(provider)))
    }

    #[tokio::test]
    async fn test_order_and_length_preserved_across_batches() {
        let provider = Arc::new(RecordingProvider::default());
        let embedder = embedder(provider.clone())
            .with_batch_size(2)
            .with_concurrency(3);

        let texts: Vec<String> = (1..=5).map(|n| "x".repeat(n)).collect();
        let result = embedder.embed(&texts).await.unwrap();

        let lengths: Vec<f32> = result.vectors.iter().map(|v| v[0]).collect();
        assert_eq!(lengths, vec![1.0, 2.0, 3.0, 4.0, 5.0]);

        let mut batches = provider.batches.lock().unwrap().clone();
        batches.sort_unstable();
        assert_eq!(batches, vec![1, 2, 2]);
    }

    #[tokio::test]
    async fn test_truncation_is_reported() {
        let embedder = embedder(Arc::new(RecordingProvider::default())).with_max_input_chars(3);
        let texts = vec!["ab".to_string(), "äöüß".to_string()];

        let result = embedder.embed(&texts).await.unwrap();
        assert_eq!(result.truncated, vec![1]);
        assert_eq!(result.vectors[1][0], 3.0);
    }

    #[tokio::test]
    async fn test_wrong_count_is_encoding_error() {
        let provider = Arc::new(RecordingProvider {
            drop_last: true,
            ..Default::default()
        });
        let err = embedder(provider)
            .embed(&["a".to_string(), "b".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Encoding(_)));
    }

    #[tokio::test]
    async fn test_query_is_single_vector() {
        let embedder = embedder(Arc::new(HashedProvider::new(32)));
        let vector = embedder.embed_query("what is a vector index").await.unwrap();
        assert_eq!(vector.len(), 32);
        assert_eq!(embedder.dimensions().await.unwrap(), 32);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let embedder = embedder(Arc::new(HashedProvider::new(8)));
        assert_eq!(embedder.embed(&[]).await.unwrap(), Embeddings::default());
    }

    #[test]
    fn test_truncate_chars_on_boundary() {
        assert_eq!(truncate_chars("héllo", 2), Some("hé"));
        assert_eq!(truncate_chars("hi", 2), None);
    }
}
