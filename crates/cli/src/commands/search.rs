//! Search command handler.

use super::{parse_filter, preview, print_json};
use clap::Args;
use ragline_core::{AppError, AppResult};
use ragline_knowledge::{Query, RagPipeline};

/// Show the chunks retrieved for a query
#[derive(Args, Debug)]
pub struct SearchCommand {
    /// Query text
    pub query: String,

    /// Number of chunks to retrieve (default: rag.topK)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Metadata filter, e.g. `source_id == "guide.md" and tags contains rust`
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchCommand {
    pub async fn execute(&self, pipeline: &RagPipeline) -> AppResult<()> {
        tracing::info!("Executing search command");

        let mut query = Query::new(&self.query);
        query.k = self.top_k;
        query.filter = parse_filter(self.filter.as_deref())?;

        let result = match pipeline.search(&query).await {
            Ok(result) => result,
            Err(AppError::NoResults) => {
                if self.json {
                    return print_json(&serde_json::json!({ "query": self.query, "hits": [] }));
                }
                println!("No matching chunks.");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if self.json {
            return print_json(&result);
        }

        for (rank, hit) in result.hits.iter().enumerate() {
            println!(
                "{}. [{}] {} #{} (score {:.3})",
                rank + 1,
                hit.id,
                hit.source_id,
                hit.position,
                hit.score
            );
            println!("   {}", preview(&hit.text, 160));
        }
        println!();
        println!(
            "{} of {} candidate(s), {}/{} {:?} of context budget",
            result.hits.len(),
            result.candidates,
            result.budget_used,
            result.budget_limit,
            result.budget_unit
        );
        if !result.skipped.is_empty() {
            println!("Skipped (over budget): {}", result.skipped.join(", "));
        }

        Ok(())
    }
}
