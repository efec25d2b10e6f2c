//! In-process vector index.

use crate::filter::Filter;
use crate::vector_index::{
    sort_hits, validate_batch, CollectionSpec, EmbeddingRecord, IndexStats, IndexedChunk,
    SearchHit, VectorIndex,
};
use async_trait::async_trait;
use ragline_core::{AppError, AppResult};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct State {
    /// Record and the sequence number of its latest upsert
    records: HashMap<String, (EmbeddingRecord, u64)>,
    next_seq: u64,
}

/// Brute-force index held in memory; contents are lost when dropped.
#[derive(Debug)]
pub struct MemoryIndex {
    spec: CollectionSpec,
    state: RwLock<State>,
}

impl MemoryIndex {
    pub fn new(spec: CollectionSpec) -> Self {
        Self {
            spec,
            state: RwLock::new(State::default()),
        }
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    fn backend_name(&self) -> &str {
        "memory"
    }

    fn spec(&self) -> &CollectionSpec {
        &self.spec
    }

    async fn ensure_collection(&self) -> AppResult<()> {
        Ok(())
    }

    async fn upsert(&self, records: &[EmbeddingRecord]) -> AppResult<usize> {
        validate_batch(records, self.spec.dimension)?;

        let mut state = self.state.write().await;
        for record in records {
            let seq = state.next_seq;
            state.next_seq += 1;
            state
                .records
                .insert(record.id.clone(), (record.clone(), seq));
        }

        tracing::debug!(count = records.len(), "Upserted records into memory index");
        Ok(records.len())
    }

    async fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&Filter>,
    ) -> AppResult<Vec<SearchHit>> {
        if query.len() != self.spec.dimension {
            return Err(AppError::DimensionMismatch {
                expected: self.spec.dimension,
                actual: query.len(),
            });
        }

        let state = self.state.read().await;
        let mut scored: Vec<(SearchHit, u64)> = state
            .records
            .values()
            .filter(|(record, _)| filter.map_or(true, |f| f.matches(record)))
            .map(|(record, seq)| {
                let hit = SearchHit {
                    id: record.id.clone(),
                    source_id: record.source_id.clone(),
                    position: record.position,
                    score: self.spec.metric.score(query, &record.vector),
                    text: record.text.clone(),
                    metadata: record.metadata.clone(),
                };
                (hit, *seq)
            })
            .collect();

        sort_hits(&mut scored);
        Ok(scored.into_iter().take(k).map(|(hit, _)| hit).collect())
    }

    async fn delete_by_source(&self, source_id: &str) -> AppResult<usize> {
        let mut state = self.state.write().await;
        let before = state.records.len();
        state
            .records
            .retain(|_, (record, _)| record.source_id != source_id);
        Ok(before - state.records.len())
    }

    async fn delete_ids(&self, ids: &[String]) -> AppResult<usize> {
        let mut state = self.state.write().await;
        Ok(ids
            .iter()
            .filter(|id| state.records.remove(id.as_str()).is_some())
            .count())
    }

    async fn list(
        &self,
        filter: Option<&Filter>,
        limit: Option<usize>,
    ) -> AppResult<Vec<IndexedChunk>> {
        let state = self.state.read().await;
        let mut chunks: Vec<IndexedChunk> = state
            .records
            .values()
            .filter(|(record, _)| filter.map_or(true, |f| f.matches(record)))
            .map(|(record, _)| IndexedChunk::from(record.clone()))
            .collect();

        chunks.sort_by(|a, b| {
            a.source_id
                .cmp(&b.source_id)
                .then(a.position.cmp(&b.position))
        });
        if let Some(limit) = limit {
            chunks.truncate(limit);
        }
        Ok(chunks)
    }

    async fn count(&self) -> AppResult<usize> {
        Ok(self.state.read().await.records.len())
    }

    async fn stats(&self) -> AppResult<IndexStats> {
        let state = self.state.read().await;
        let sources: HashSet<&str> = state
            .records
            .values()
            .map(|(record, _)| record.source_id.as_str())
            .collect();

        Ok(IndexStats {
            backend: self.backend_name().to_string(),
            collection: self.spec.name.clone(),
            dimension: self.spec.dimension,
            metric: self.spec.metric,
            records: state.records.len(),
            sources: sources.len(),
        })
    }

    async fn reset(&self) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.records.clear();
        tracing::info!(collection = %self.spec.name, "Reset memory index");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Metadata;
    use ragline_core::SimilarityMetric;

    fn index() -> MemoryIndex {
        MemoryIndex::new(CollectionSpec::new("test", 2, SimilarityMetric::Cosine))
    }

    fn record(id: &str, source: &str, vector: [f32; 2]) -> EmbeddingRecord {
        let mut metadata = Metadata::new();
        metadata.insert("source_id".into(), source.into());
        EmbeddingRecord {
            id: id.to_string(),
            source_id: source.to_string(),
            position: 0,
            text: format!("text of {}", id),
            vector: vector.to_vec(),
            metadata,
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let index = index();
        let batch = vec![record("a", "s1", [1.0, 0.0]), record("b", "s1", [0.0, 1.0])];

        index.upsert(&batch).await.unwrap();
        index.upsert(&batch).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 2);

        let mut changed = record("a", "s1", [0.0, 1.0]);
        changed.text = "new text".to_string();
        index.upsert(&[changed]).await.unwrap();

        let hits = index.search(&[0.0, 1.0], 1, Some(&Filter::eq("id", "a"))).await.unwrap();
        assert_eq!(hits[0].text, "new text");
        assert_eq!(index.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_bad_vector_leaves_contents_unchanged() {
        let index = index();
        index.upsert(&[record("a", "s1", [1.0, 0.0])]).await.unwrap();

        let mut bad = record("b", "s1", [1.0, 0.0]);
        bad.vector.push(0.5);
        let err = index
            .upsert(&[record("c", "s1", [0.5, 0.5]), bad])
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::DimensionMismatch { expected: 2, actual: 3 }));
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_search_orders_by_score_then_recency() {
        let index = index();
        index
            .upsert(&[
                record("old", "s1", [1.0, 0.0]),
                record("far", "s1", [0.0, 1.0]),
                record("new", "s2", [2.0, 0.0]),
            ])
            .await
            .unwrap();

        let hits = index.search(&[1.0, 0.0], 3, None).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old", "far"]);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_search_with_filter_and_query_dimension() {
        let index = index();
        index
            .upsert(&[record("a", "s1", [1.0, 0.0]), record("b", "s2", [1.0, 0.1])])
            .await
            .unwrap();

        let hits = index
            .search(&[1.0, 0.0], 5, Some(&Filter::eq("source_id", "s2")))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "b");

        assert!(matches!(
            index.search(&[1.0], 5, None).await,
            Err(AppError::DimensionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_list_stats_reset() {
        let index = index();
        index
            .upsert(&[
                record("a", "s1", [1.0, 0.0]),
                record("b", "s1", [0.0, 1.0]),
                record("c", "s2", [1.0, 1.0]),
            ])
            .await
            .unwrap();

        let stats = index.stats().await.unwrap();
        assert_eq!((stats.records, stats.sources), (3, 2));

        assert_eq!(index.delete_by_source("s1").await.unwrap(), 2);
        assert_eq!(
            index
                .delete_ids(&["c".to_string(), "zzz".to_string()])
                .await
                .unwrap(),
            1
        );
        assert!(index.list(None, None).await.unwrap().is_empty());

        index.upsert(&[record("d", "s3", [1.0, 0.0])]).await.unwrap();
        index.reset().await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
    }
}
