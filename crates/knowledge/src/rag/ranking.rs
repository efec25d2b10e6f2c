//! Ranking and context budgeting of search hits.

use crate::vector_index::SearchHit;
use ragline_core::BudgetUnit;
use std::cmp::Ordering;
use std::collections::HashMap;
use unicode_segmentation::UnicodeSegmentation;

/// Deduplicate by chunk id keeping the best score, sort by score descending
/// (stable, so equal scores keep index order), drop hits under `min_score`,
/// and keep at most `k`.
pub fn rank_hits(hits: Vec<SearchHit>, k: usize, min_score: Option<f32>) -> Vec<SearchHit> {
    let mut best: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<SearchHit> = Vec::with_capacity(hits.len());

    for hit in hits {
        match best.get(&hit.id) {
            Some(&slot) => {
                if hit.score > unique[slot].score {
                    unique[slot] = hit;
                }
            }
            None => {
                best.insert(hit.id.clone(), unique.len());
                unique.push(hit);
            }
        }
    }

    unique.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    if let Some(min) = min_score {
        unique.retain(|hit| hit.score >= min);
    }
    unique.truncate(k);
    unique
}

/// Size of `text` in the budget unit.
///
/// Tokens are estimated at four per three words, which tracks common
/// subword tokenizers closely enough for budgeting.
pub fn measure(text: &str, unit: BudgetUnit) -> usize {
    match unit {
        BudgetUnit::Chars => text.chars().count(),
        BudgetUnit::Tokens => (text.unicode_words().count() * 4).div_ceil(3),
    }
}

/// Hits that fit the context budget.
#[derive(Debug, Clone, PartialEq)]
pub struct Budgeted {
    pub accepted: Vec<SearchHit>,
    pub used: usize,
    pub skipped: Vec<String>,
}

/// Greedily accept hits in rank order while they fit; a hit larger than the
/// remaining budget is skipped whole and later, smaller hits may still fit.
pub fn apply_budget(hits: Vec<SearchHit>, budget: usize, unit: BudgetUnit) -> Budgeted {
    let mut accepted = Vec::new();
    let mut skipped = Vec::new();
    let mut used = 0;

    for hit in hits {
        let size = measure(&hit.text, unit);
        if used + size <= budget {
            used += size;
            accepted.push(hit);
        } else {
            tracing::debug!(
                chunk_id = %hit.id,
                size,
                remaining = budget - used,
                "Chunk does not fit context budget"
            );
            skipped.push(hit.id);
        }
    }

    Budgeted {
        accepted,
        used,
        skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Metadata;

    fn hit(id: &str, score: f32, text: &str) -> SearchHit {
        SearchHit {
            id: id.to_string(),
            source_id: "s".to_string(),
            position: 0,
            score,
            text: text.to_string(),
            metadata: Metadata::new(),
        }
    }

    fn ids(hits: &[SearchHit]) -> Vec<&str> {
        hits.iter().map(|h| h.id.as_str()).collect()
    }

    #[test]
    fn test_rank_dedupes_and_sorts() {
        let ranked = rank_hits(
            vec![
                hit("a", 0.5, ""),
                hit("b", 0.9, ""),
                hit("a", 0.7, ""),
                hit("c", 0.7, ""),
            ],
            10,
            None,
        );
        assert_eq!(ids(&ranked), vec!["b", "a", "c"]);
        assert_eq!(ranked[1].score, 0.7);
    }

    #[test]
    fn test_rank_truncates_and_applies_min_score() {
        let hits = vec![hit("a", 0.9, ""), hit("b", 0.5, ""), hit("c", 0.1, "")];
        assert_eq!(ids(&rank_hits(hits.clone(), 2, None)), vec!["a", "b"]);
        assert_eq!(ids(&rank_hits(hits, 5, Some(0.4))), vec!["a", "b"]);
    }

    #[test]
    fn test_budget_skips_oversized_and_keeps_going() {
        let budgeted = apply_budget(
            vec![
                hit("a", 0.9, "12345"),
                hit("big", 0.8, "1234567890"),
                hit("c", 0.7, "123"),
            ],
            9,
            BudgetUnit::Chars,
        );
        assert_eq!(ids(&budgeted.accepted), vec!["a", "c"]);
        assert_eq!(budgeted.used, 8);
        assert_eq!(budgeted.skipped, vec!["big".to_string()]);
    }

    #[test]
    fn test_budget_never_exceeded() {
        let hits: Vec<_> = (0..20)
            .map(|i| hit(&i.to_string(), 1.0 - i as f32 / 20.0, &"x".repeat(i * 3)))
            .collect();
        for budget in [0, 1, 10, 50, 200] {
            let budgeted = apply_budget(hits.clone(), budget, BudgetUnit::Chars);
            let total: usize = budgeted.accepted.iter().map(|h| h.text.len()).sum();
            assert!(total <= budget);
            assert_eq!(total, budgeted.used);
        }
    }

    #[test]
    fn test_measure_units() {
        assert_eq!(measure("héllo wörld", BudgetUnit::Chars), 11);
        assert_eq!(measure("one two three", BudgetUnit::Tokens), 4);
        assert_eq!(measure("", BudgetUnit::Tokens), 0);
    }
}
