//! Command handlers for the ragline CLI.
//!
//! Every handler receives the fully wired [`RagPipeline`](ragline_knowledge::RagPipeline).

pub mod ask;
pub mod collection;
pub mod ingest;
pub mod search;

// Re-export command types for convenience
pub use ask::{AskCommand, ChatCommand};
pub use collection::{ClearCommand, DeleteCommand, ListCommand, StatsCommand};
pub use ingest::IngestCommand;
pub use search::SearchCommand;

use ragline_core::{AppError, AppResult};
use ragline_knowledge::Filter;
use serde::Serialize;

/// Pretty-print `value` as JSON on stdout.
pub(crate) fn print_json<T: Serialize>(value: &T) -> AppResult<()> {
    let output = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::Serialization(format!("JSON serialization failed: {}", e)))?;
    println!("{}", output);
    Ok(())
}

pub(crate) fn parse_filter(filter: Option<&str>) -> AppResult<Option<Filter>> {
    filter.map(Filter::parse).transpose()
}

/// Single-line preview of chunk text.
pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &collapsed[..cut]),
        None => collapsed,
    }
}
