//! Vector index abstraction.
//!
//! Defines the provider-agnostic [`VectorIndex`] trait, the records it
//! stores, and [`RetryingIndex`], which adds bounded retries for transient
//! store failures to any backend.

use crate::chunk::Chunk;
use crate::filter::{lookup_path, Filter, FilterTarget};
use crate::types::Metadata;
use async_trait::async_trait;
use ragline_core::{AppError, AppResult, RetryPolicy, SimilarityMetric};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::future::Future;
use std::time::Duration;

/// Name, dimension and metric of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSpec {
    pub name: String,
    pub dimension: usize,
    pub metric: SimilarityMetric,
}

impl CollectionSpec {
    pub fn new(name: impl Into<String>, dimension: usize, metric: SimilarityMetric) -> Self {
        Self {
            name: name.into(),
            dimension,
            metric,
        }
    }
}

/// A chunk with its embedding, as written to the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: String,
    pub source_id: String,
    pub position: u32,
    pub text: String,
    pub vector: Vec<f32>,
    pub metadata: Metadata,
}

impl EmbeddingRecord {
    pub fn from_chunk(chunk: Chunk, vector: Vec<f32>) -> Self {
        Self {
            id: chunk.id,
            source_id: chunk.source_id,
            position: chunk.position,
            text: chunk.text,
            vector,
            metadata: chunk.metadata,
        }
    }
}

/// A stored chunk without its vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub id: String,
    pub source_id: String,
    pub position: u32,
    pub text: String,
    pub metadata: Metadata,
}

/// One search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub source_id: String,
    pub position: u32,
    pub score: f32,
    pub text: String,
    pub metadata: Metadata,
}

/// Index statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub backend: String,
    pub collection: String,
    pub dimension: usize,
    pub metric: SimilarityMetric,
    pub records: usize,
    pub sources: usize,
}

fn record_field<'a>(
    path: &str,
    id: &'a str,
    source_id: &'a str,
    position: u32,
    text: &'a str,
    metadata: &'a Metadata,
) -> Option<Cow<'a, Value>> {
    match path {
        "id" => Some(Cow::Owned(Value::from(id))),
        "source_id" => Some(Cow::Owned(Value::from(source_id))),
        "position" => Some(Cow::Owned(Value::from(position))),
        "text" => Some(Cow::Owned(Value::from(text))),
        _ => lookup_path(metadata, path).map(Cow::Borrowed),
    }
}

impl FilterTarget for EmbeddingRecord {
    fn field(&self, path: &str) -> Option<Cow<'_, Value>> {
        record_field(path, &self.id, &self.source_id, self.position, &self.text, &self.metadata)
    }
}

impl FilterTarget for IndexedChunk {
    fn field(&self, path: &str) -> Option<Cow<'_, Value>> {
        record_field(path, &self.id, &self.source_id, self.position, &self.text, &self.metadata)
    }
}

impl From<EmbeddingRecord> for IndexedChunk {
    fn from(record: EmbeddingRecord) -> Self {
        Self {
            id: record.id,
            source_id: record.source_id,
            position: record.position,
            text: record.text,
            metadata: record.metadata,
        }
    }
}

/// Trait for vector index backends.
///
/// All methods take `&self`; each call is atomic with respect to other
/// calls on the same index.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Backend name for diagnostics ("memory", "lancedb")
    fn backend_name(&self) -> &str;

    fn spec(&self) -> &CollectionSpec;

    /// Create the collection if absent; opening an existing one with another
    /// dimension fails with `DimensionMismatch`.
    async fn ensure_collection(&self) -> AppResult<()>;

    /// Insert or overwrite records by id. The batch is validated before any
    /// write, so a rejected batch leaves the index unchanged.
    async fn upsert(&self, records: &[EmbeddingRecord]) -> AppResult<usize>;

    /// Top-`k` records by score, descending; ties go to the most recently
    /// upserted record.
    async fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&Filter>,
    ) -> AppResult<Vec<SearchHit>>;

    /// Remove every record of a source; returns how many were removed.
    async fn delete_by_source(&self, source_id: &str) -> AppResult<usize>;

    async fn delete_ids(&self, ids: &[String]) -> AppResult<usize>;

    /// Stored records ordered by source and position.
    async fn list(&self, filter: Option<&Filter>, limit: Option<usize>)
        -> AppResult<Vec<IndexedChunk>>;

    async fn count(&self) -> AppResult<usize>;

    async fn stats(&self) -> AppResult<IndexStats>;

    /// Remove all records, keeping the collection.
    async fn reset(&self) -> AppResult<()>;
}

/// Reject a batch containing a vector of the wrong dimension or with
/// non-finite components.
pub fn validate_batch(records: &[EmbeddingRecord], dimension: usize) -> AppResult<()> {
    for record in records {
        if record.vector.len() != dimension {
            return Err(AppError::DimensionMismatch {
                expected: dimension,
                actual: record.vector.len(),
            });
        }
        if record.vector.iter().any(|v| !v.is_finite()) {
            return Err(AppError::Encoding(format!(
                "Vector for chunk '{}' contains non-finite values",
                record.id
            )));
        }
    }
    Ok(())
}

/// Order hits by score descending, then by recency descending.
pub(crate) fn sort_hits<T>(hits: &mut [(SearchHit, T)])
where
    T: Ord,
{
    hits.sort_by(|(a, a_seq), (b, b_seq)| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b_seq.cmp(a_seq))
    });
}

/// Decorator that retries transient failures of the wrapped index.
///
/// With a timeout set, an attempt that does not finish in time counts as
/// `IndexUnavailable` and is retried like any other outage.
pub struct RetryingIndex<I> {
    inner: I,
    policy: RetryPolicy,
    timeout: Option<Duration>,
}

impl<I: VectorIndex> RetryingIndex<I> {
    pub fn new(inner: I, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn inner(&self) -> &I {
        &self.inner
    }

    async fn attempt<T>(&self, call: impl Future<Output = AppResult<T>>) -> AppResult<T> {
        let Some(limit) = self.timeout else {
            return call.await;
        };
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(AppError::IndexUnavailable(format!(
                "{} index did not respond within {:?}",
                self.inner.backend_name(),
                limit
            ))),
        }
    }
}

#[async_trait]
impl<I: VectorIndex> VectorIndex for RetryingIndex<I> {
    fn backend_name(&self) -> &str {
        self.inner.backend_name()
    }

    fn spec(&self) -> &CollectionSpec {
        self.inner.spec()
    }

    async fn ensure_collection(&self) -> AppResult<()> {
        Ok(self
            .policy
            .run("index.ensure_collection", |_| self.attempt(self.inner.ensure_collection()))
            .await?)
    }

    async fn upsert(&self, records: &[EmbeddingRecord]) -> AppResult<usize> {
        Ok(self
            .policy
            .run("index.upsert", |_| self.attempt(self.inner.upsert(records)))
            .await?)
    }

    async fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&Filter>,
    ) -> AppResult<Vec<SearchHit>> {
        Ok(self
            .policy
            .run("index.search", |_| self.attempt(self.inner.search(query, k, filter)))
            .await?)
    }

    async fn delete_by_source(&self, source_id: &str) -> AppResult<usize> {
        Ok(self
            .policy
            .run("index.delete_by_source", |_| {
                self.attempt(self.inner.delete_by_source(source_id))
            })
            .await?)
    }

    async fn delete_ids(&self, ids: &[String]) -> AppResult<usize> {
        Ok(self
            .policy
            .run("index.delete_ids", |_| self.attempt(self.inner.delete_ids(ids)))
            .await?)
    }

    async fn list(
        &self,
        filter: Option<&Filter>,
        limit: Option<usize>,
    ) -> AppResult<Vec<IndexedChunk>> {
        Ok(self
            .policy
            .run("index.list", |_| self.attempt(self.inner.list(filter, limit)))
            .await?)
    }

    async fn count(&self) -> AppResult<usize> {
        Ok(self.policy.run("index.count", |_| self.attempt(self.inner.count())).await?)
    }

    async fn stats(&self) -> AppResult<IndexStats> {
        Ok(self.policy.run("index.stats", |_| self.attempt(self.inner.stats())).await?)
    }

    async fn reset(&self) -> AppResult<()> {
        Ok(self.policy.run("index.reset", |_| self.attempt(self.inner.reset())).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_index::MemoryIndex;
    use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

    fn record(id: &str, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            id: id.to_string(),
            source_id: "s".to_string(),
            position: 0,
            text: id.to_string(),
            vector,
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn test_validate_batch() {
        assert!(validate_batch(&[record("a", vec![1.0, 0.0])], 2).is_ok());
        assert!(matches!(
            validate_batch(&[record("a", vec![1.0])], 2),
            Err(AppError::DimensionMismatch {
                expected: 2,
                actual: 1
            })
        ));
        assert!(matches!(
            validate_batch(&[record("a", vec![f32::NAN, 0.0])], 2),
            Err(AppError::Encoding(_))
        ));
    }

    #[test]
    fn test_record_fields_for_filters() {
        let mut r = record("abc", vec![0.0]);
        r.metadata.insert("lang".into(), "en".into());

        assert!(Filter::eq("id", "abc").matches(&r));
        assert!(Filter::eq("lang", "en").matches(&r));
        assert!(Filter::eq("position", 0).matches(&r));
    }

    /// Fails with `IndexUnavailable` for the first `failures` searches.
    struct Flaky {
        inner: MemoryIndex,
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl VectorIndex for Flaky {
        fn backend_name(&self) -> &str {
            "flaky"
        }
        fn spec(&self) -> &CollectionSpec {
            self.inner.spec()
        }
        async fn ensure_collection(&self) -> AppResult<()> {
            self.inner.ensure_collection().await
        }
        async fn upsert(&self, records: &[EmbeddingRecord]) -> AppResult<usize> {
            self.inner.upsert(records).await
        }
        async fn search(
            &self,
            query: &[f32],
            k: usize,
            filter: Option<&Filter>,
        ) -> AppResult<Vec<SearchHit>> {
            let call = self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            if call < self.failures {
                return Err(AppError::IndexUnavailable("connection refused".into()));
            }
            self.inner.search(query, k, filter).await
        }
        async fn delete_by_source(&self, source_id: &str) -> AppResult<usize> {
            self.inner.delete_by_source(source_id).await
        }
        async fn delete_ids(&self, ids: &[String]) -> AppResult<usize> {
            self.inner.delete_ids(ids).await
        }
        async fn list(
            &self,
            filter: Option<&Filter>,
            limit: Option<usize>,
        ) -> AppResult<Vec<IndexedChunk>> {
            self.inner.list(filter, limit).await
        }
        async fn count(&self) -> AppResult<usize> {
            self.inner.count().await
        }
        async fn stats(&self) -> AppResult<IndexStats> {
            self.inner.stats().await
        }
        async fn reset(&self) -> AppResult<()> {
            self.inner.reset().await
        }
    }

    fn flaky(failures: u32) -> Flaky {
        Flaky {
            inner: MemoryIndex::new(CollectionSpec::new("t", 2, SimilarityMetric::Cosine)),
            failures,
            calls: AtomicU32::new(0),
        }
    }

    #[tokio::test]
    async fn test_retrying_index_recovers() {
        let index = RetryingIndex::new(flaky(2), RetryPolicy::new(3, Duration::from_millis(1)));
        index.upsert(&[record("a", vec![1.0, 0.0])]).await.unwrap();

        let hits = index.search(&[1.0, 0.0], 1, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(index.inner().calls.load(AtomicOrdering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retrying_index_surfaces_after_exhaustion() {
        let index = RetryingIndex::new(flaky(5), RetryPolicy::new(2, Duration::from_millis(1)));
        let err = index.search(&[1.0, 0.0], 1, None).await.unwrap_err();
        assert!(matches!(err, AppError::IndexUnavailable(_)));
        assert_eq!(index.inner().calls.load(AtomicOrdering::SeqCst), 2);
    }

    /// Searches that never finish.
    struct Stalled(MemoryIndex);

    #[async_trait]
    impl VectorIndex for Stalled {
        fn backend_name(&self) -> &str {
            "stalled"
        }
        fn spec(&self) -> &CollectionSpec {
            self.0.spec()
        }
        async fn ensure_collection(&self) -> AppResult<()> {
            Ok(())
        }
        async fn upsert(&self, records: &[EmbeddingRecord]) -> AppResult<usize> {
            self.0.upsert(records).await
        }
        async fn search(
            &self,
            _query: &[f32],
            _k: usize,
            _filter: Option<&Filter>,
        ) -> AppResult<Vec<SearchHit>> {
            std::future::pending().await
        }
        async fn delete_by_source(&self, source_id: &str) -> AppResult<usize> {
            self.0.delete_by_source(source_id).await
        }
        async fn delete_ids(&self, ids: &[String]) -> AppResult<usize> {
            self.0.delete_ids(ids).await
        }
        async fn list(
            &self,
            filter: Option<&Filter>,
            limit: Option<usize>,
        ) -> AppResult<Vec<IndexedChunk>> {
            self.0.list(filter, limit).await
        }
        async fn count(&self) -> AppResult<usize> {
            self.0.count().await
        }
        async fn stats(&self) -> AppResult<IndexStats> {
            self.0.stats().await
        }
        async fn reset(&self) -> AppResult<()> {
            self.0.reset().await
        }
    }

    #[tokio::test]
    async fn test_timed_out_call_is_index_unavailable() {
        let stalled = Stalled(MemoryIndex::new(CollectionSpec::new(
            "t",
            2,
            SimilarityMetric::Cosine,
        )));
        let index = RetryingIndex::new(stalled, RetryPolicy::new(2, Duration::from_millis(1)))
            .with_timeout(Duration::from_millis(20));

        let err = index.search(&[1.0, 0.0], 1, None).await.unwrap_err();
        assert!(matches!(err, AppError::IndexUnavailable(_)));
        assert_eq!(index.count().await.unwrap(), 0);
    }
}
