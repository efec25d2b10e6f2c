//! Query-time retrieval.

use crate::embeddings::Embedder;
use crate::rag::ranking::{apply_budget, rank_hits};
use crate::rag::types::{Query, RetrievalResult, Stage, StageTiming};
use crate::vector_index::VectorIndex;
use ragline_core::config::RagSettings;
use ragline_core::{AppError, AppResult, BudgetUnit};
use std::sync::Arc;
use std::time::Instant;

/// Retrieval knobs, usually taken from [`RagSettings`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetrieverConfig {
    pub top_k: usize,
    pub overfetch_factor: usize,
    pub min_score: Option<f32>,
    pub context_budget: usize,
    pub budget_unit: BudgetUnit,
}

impl From<&RagSettings> for RetrieverConfig {
    fn from(settings: &RagSettings) -> Self {
        Self {
            top_k: settings.top_k,
            overfetch_factor: settings.overfetch_factor,
            min_score: settings.min_score,
            context_budget: settings.context_budget,
            budget_unit: settings.budget_unit,
        }
    }
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self::from(&RagSettings::default())
    }
}

/// Embeds a query, searches the index, then ranks and budgets the hits.
///
/// Retrieval only reads from the index.
#[derive(Clone)]
pub struct Retriever {
    embedder: Embedder,
    index: Arc<dyn VectorIndex>,
    config: RetrieverConfig,
}

/// Records how long each stage took.
struct StageClock {
    started: Instant,
    timings: Vec<StageTiming>,
}

impl StageClock {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            timings: Vec::new(),
        }
    }

    fn finish(&mut self, stage: Stage) {
        let now = Instant::now();
        let elapsed_ms = now.duration_since(self.started).as_secs_f64() * 1000.0;
        tracing::debug!(?stage, elapsed_ms, "Retrieval stage finished");
        self.timings.push(StageTiming { stage, elapsed_ms });
        self.started = now;
    }
}

impl Retriever {
    pub fn new(embedder: Embedder, index: Arc<dyn VectorIndex>, config: RetrieverConfig) -> Self {
        Self {
            embedder,
            index,
            config,
        }
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Run the retrieval stages for `query`.
    ///
    /// The result may hold fewer than `k` hits after the score cutoff and
    /// budget.
    ///
    /// # Errors
    /// `NoResults` when the index returns nothing for the query and filter.
    pub async fn retrieve(&self, query: &Query) -> AppResult<RetrievalResult> {
        let k = query.k.unwrap_or(self.config.top_k).max(1);
        let fetch = k.saturating_mul(self.config.overfetch_factor.max(1));
        let mut clock = StageClock::new();

        let vector = self.embedder.embed_query(&query.text).await?;
        clock.finish(Stage::Embedding);

        let hits = self
            .index
            .search(&vector, fetch, query.filter.as_ref())
            .await?;
        clock.finish(Stage::Searching);

        if hits.is_empty() {
            tracing::info!(query = %query.text, "No chunks matched the query");
            return Err(AppError::NoResults);
        }
        let candidates = hits.len();

        let ranked = rank_hits(hits, k, self.config.min_score);
        clock.finish(Stage::Ranking);

        let budgeted = apply_budget(ranked, self.config.context_budget, self.config.budget_unit);
        clock.finish(Stage::Budgeting);
        clock.finish(Stage::Done);

        tracing::info!(
            candidates,
            returned = budgeted.accepted.len(),
            skipped = budgeted.skipped.len(),
            budget_used = budgeted.used,
            "Retrieved context"
        );

        Ok(RetrievalResult {
            query: query.text.clone(),
            hits: budgeted.accepted,
            candidates,
            budget_used: budgeted.used,
            budget_limit: self.config.context_budget,
            budget_unit: self.config.budget_unit,
            skipped: budgeted.skipped,
            stages: clock.timings,
        })
    }
}
