//! Tests for RAG ranking correctness.

use crate::memory_index::MemoryIndex;
use crate::rag::rank_hits;
use crate::types::Metadata;
use crate::vector_index::{CollectionSpec, EmbeddingRecord, SearchHit, VectorIndex};
use ragline_core::SimilarityMetric;

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper to create a test record with embedding.
    fn create_test_record(id: &str, text: &str, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            id: id.to_string(),
            source_id: "source1".to_string(),
            position: 0,
            text: text.to_string(),
            vector,
            metadata: Metadata::new(),
        }
    }

    /// Helper to create a normalized embedding.
    fn normalize(v: &[f32]) -> Vec<f32> {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter().map(|x| x / norm).collect()
        } else {
            v.to_vec()
        }
    }

    async fn index_with(dimension: usize, records: Vec<EmbeddingRecord>) -> MemoryIndex {
        let index = MemoryIndex::new(CollectionSpec::new(
            "ranking",
            dimension,
            SimilarityMetric::Cosine,
        ));
        index.upsert(&records).await.unwrap();
        index
    }

    async fn ranked(index: &MemoryIndex, query: &[f32], k: usize) -> Vec<SearchHit> {
        let hits = index.search(query, k * 2, None).await.unwrap();
        rank_hits(hits, k, None)
    }

    #[tokio::test]
    async fn test_relevant_query_returns_high_scores() {
        // Query will be about "rust programming"
        let index = index_with(
            4,
            vec![
                create_test_record(
                    "chunk1",
                    "Rust is a systems programming language",
                    normalize(&[1.0, 0.5, 0.2, 0.1]),
                ),
                create_test_record(
                    "chunk2",
                    "Cooking recipes for pasta",
                    normalize(&[-0.3, -0.8, 0.4, -0.2]),
                ),
            ],
        )
        .await;

        let results = ranked(&index, &normalize(&[0.9, 0.4, 0.3, 0.1]), 5).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "chunk1", "Most relevant chunk should be first");
        assert!(
            results[0].score > 0.8,
            "Relevant chunk score should be high: {}",
            results[0].score
        );
        assert!(results[0].score > results[1].score, "Scores should be ordered");
    }

    #[tokio::test]
    async fn test_unrelated_query_returns_low_scores() {
        let index = index_with(
            4,
            vec![create_test_record(
                "chunk1",
                "Rust programming language features",
                normalize(&[1.0, 0.0, 0.0, 0.0]),
            )],
        )
        .await;

        // Orthogonal query, about cooking
        let results = ranked(&index, &normalize(&[0.0, 1.0, 0.0, 0.0]), 5).await;

        assert_eq!(results.len(), 1);
        assert!(
            results[0].score < 0.5,
            "Unrelated chunk score should be low: {}",
            results[0].score
        );

        // A relevance cutoff removes it
        let hits = index.search(&[0.0, 1.0, 0.0, 0.0], 5, None).await.unwrap();
        assert!(rank_hits(hits, 5, Some(0.3)).is_empty());
    }

    #[tokio::test]
    async fn test_scores_are_ordered_descending() {
        let index = index_with(
            3,
            vec![
                create_test_record("chunk1", "Text A", normalize(&[1.0, 0.0, 0.0])),
                create_test_record("chunk2", "Text B", normalize(&[0.7, 0.7, 0.0])),
                create_test_record("chunk3", "Text C", normalize(&[0.0, 1.0, 0.0])),
                create_test_record("chunk4", "Text D", normalize(&[-1.0, 0.0, 0.0])),
            ],
        )
        .await;

        let results = ranked(&index, &normalize(&[1.0, 0.0, 0.0]), 10).await;

        for i in 1..results.len() {
            assert!(
                results[i - 1].score >= results[i].score,
                "Scores should be ordered: {} >= {}",
                results[i - 1].score,
                results[i].score
            );
        }

        assert_eq!(results[0].id, "chunk1");
        assert!(
            results[0].score > 0.99,
            "Perfect match should have score near 1.0"
        );
    }

    #[tokio::test]
    async fn test_negative_similarity_chunks() {
        let index = index_with(
            3,
            vec![create_test_record(
                "chunk1",
                "Opposite content",
                normalize(&[-1.0, 0.0, 0.0]),
            )],
        )
        .await;

        let results = ranked(&index, &normalize(&[1.0, 0.0, 0.0]), 5).await;

        assert_eq!(results.len(), 1);
        assert!(
            results[0].score < 0.0,
            "Opposite vectors should have negative similarity"
        );
        assert!(
            results[0].score > -1.1 && results[0].score < -0.9,
            "Should be close to -1.0"
        );
    }

    #[tokio::test]
    async fn test_empty_index_returns_no_results() {
        let index = index_with(3, Vec::new()).await;
        let results = ranked(&index, &normalize(&[1.0, 0.0, 0.0]), 5).await;
        assert_eq!(results.len(), 0, "Empty index should return no results");
    }

    #[tokio::test]
    async fn test_top_k_limit_respected() {
        let records = (0..10)
            .map(|i| {
                create_test_record(
                    &format!("chunk{}", i),
                    &format!("Text {}", i),
                    normalize(&[1.0, i as f32 / 10.0, 0.0]),
                )
            })
            .collect();
        let index = index_with(3, records).await;

        let results = ranked(&index, &normalize(&[1.0, 0.0, 0.0]), 3).await;

        assert_eq!(results.len(), 3, "Should return exactly top_k results");
        assert_eq!(results[0].id, "chunk0");
    }
}
