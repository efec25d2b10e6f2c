//! Retrieval and answer types.

use crate::filter::Filter;
use crate::vector_index::SearchHit;
use ragline_core::BudgetUnit;
use ragline_prompt::ContextEntry;
use serde::{Deserialize, Serialize};

/// Maximum snippet length for citations.
const MAX_SNIPPET_LENGTH: usize = 150;

/// A retrieval request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,

    /// Result-count limit; the configured `top_k` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<usize>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            filter: None,
            k: None,
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }
}

/// Retrieval pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Embedding,
    Searching,
    Ranking,
    Budgeting,
    Done,
}

/// Time spent in one stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: Stage,
    pub elapsed_ms: f64,
}

/// Ranked, deduplicated and budgeted hits for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub query: String,

    /// Hits in descending score order
    pub hits: Vec<SearchHit>,

    /// Hits returned by the index before ranking
    pub candidates: usize,

    pub budget_used: usize,
    pub budget_limit: usize,
    pub budget_unit: BudgetUnit,

    /// Ids of ranked hits left out because they did not fit the budget
    pub skipped: Vec<String>,

    pub stages: Vec<StageTiming>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn max_score(&self) -> Option<f32> {
        self.hits.first().map(|hit| hit.score)
    }

    pub fn chunk_ids(&self) -> Vec<String> {
        self.hits.iter().map(|hit| hit.id.clone()).collect()
    }

    /// Hits as prompt context entries, labelled by title when known.
    pub fn context_entries(&self) -> Vec<ContextEntry> {
        self.hits
            .iter()
            .map(|hit| ContextEntry {
                id: hit.id.clone(),
                source: source_label(hit),
                text: hit.text.clone(),
                score: hit.score,
            })
            .collect()
    }
}

fn source_label(hit: &SearchHit) -> String {
    let title = hit.metadata.get("title_path").or_else(|| hit.metadata.get("title"));
    match title.and_then(|t| t.as_str()) {
        Some(title) => format!("{} / {}", hit.source_id, title),
        None => hit.source_id.clone(),
    }
}

/// A chunk the answer was grounded on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// Chunk id; the marker in the answer is `[id]`
    pub id: String,
    pub source_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    pub score: f32,

    /// Short excerpt of the chunk text
    pub snippet: String,

    /// Whether the answer text contains this chunk's marker
    pub referenced: bool,
}

impl Citation {
    pub fn from_hit(hit: &SearchHit, answer: &str) -> Self {
        let title = hit
            .metadata
            .get("title_path")
            .or_else(|| hit.metadata.get("title"))
            .and_then(|t| t.as_str())
            .map(str::to_string);

        Self {
            id: hit.id.clone(),
            source_id: hit.source_id.clone(),
            title,
            score: hit.score,
            snippet: snippet(&hit.text),
            referenced: answer.contains(&ragline_prompt::citation_marker(&hit.id)),
        }
    }
}

fn snippet(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.char_indices().nth(MAX_SNIPPET_LENGTH) {
        Some((cut, _)) => format!("{}...", &collapsed[..cut]),
        None => collapsed,
    }
}

/// A generated answer with its citations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagAnswer {
    pub answer: String,
    pub citations: Vec<Citation>,

    /// Highest retrieval score, 0 when nothing was retrieved
    pub max_score: f32,

    /// Whether the cautionary note was added to the prompt
    pub low_confidence: bool,

    /// LLM calls made, 0 when no call was needed
    pub attempts: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl RagAnswer {
    /// Answer given without calling the model because nothing was retrieved.
    pub fn no_information(query: &str) -> Self {
        Self {
            answer: format!(
                "I could not find information about \"{}\" in the available documents.",
                query
            ),
            citations: Vec::new(),
            max_score: 0.0,
            low_confidence: true,
            attempts: 0,
            model: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Metadata;

    fn hit(id: &str, score: f32, title: Option<&str>) -> SearchHit {
        let mut metadata = Metadata::new();
        if let Some(title) = title {
            metadata.insert("title".into(), title.into());
        }
        SearchHit {
            id: id.to_string(),
            source_id: "guide.md".to_string(),
            position: 0,
            score,
            text: "word ".repeat(100),
            metadata,
        }
    }

    #[test]
    fn test_citation_from_hit() {
        let citation = Citation::from_hit(&hit("abc", 0.9, Some("Guide")), "Yes [abc].");
        assert!(citation.referenced);
        assert_eq!(citation.title.as_deref(), Some("Guide"));
        assert!(citation.snippet.ends_with("..."));
        assert_eq!(citation.snippet.chars().count(), MAX_SNIPPET_LENGTH + 3);

        let unreferenced = Citation::from_hit(&hit("def", 0.5, None), "Yes [abc].");
        assert!(!unreferenced.referenced);
    }

    #[test]
    fn test_context_entries_label_sources() {
        let result = RetrievalResult {
            query: "q".to_string(),
            hits: vec![hit("a", 0.8, Some("Guide")), hit("b", 0.4, None)],
            candidates: 2,
            budget_used: 0,
            budget_limit: 100,
            budget_unit: BudgetUnit::Chars,
            skipped: Vec::new(),
            stages: Vec::new(),
        };

        let entries = result.context_entries();
        assert_eq!(entries[0].source, "guide.md / Guide");
        assert_eq!(entries[1].source, "guide.md");
        assert_eq!(result.max_score(), Some(0.8));
    }

    #[test]
    fn test_no_information_answer() {
        let answer = RagAnswer::no_information("warp drives");
        assert!(answer.answer.contains("warp drives"));
        assert!(answer.low_confidence);
        assert_eq!(answer.attempts, 0);
    }
}
