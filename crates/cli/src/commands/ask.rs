//! Ask and chat command handlers.

use super::{parse_filter, print_json};
use clap::Args;
use ragline_core::AppResult;
use ragline_knowledge::{Query, RagAnswer, RagPipeline};
use ragline_prompt::ChatTurn;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Turns of history kept in a chat session
const MAX_HISTORY_TURNS: usize = 10;

/// Answer a question from the indexed documents
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub query: String,

    /// Number of chunks to retrieve (default: rag.topK)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Metadata filter applied to retrieval
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, pipeline: &RagPipeline) -> AppResult<()> {
        tracing::info!("Executing ask command");

        let mut query = Query::new(&self.query);
        query.k = self.top_k;
        query.filter = parse_filter(self.filter.as_deref())?;

        let answer = pipeline.ask(&query, &[]).await?;
        tracing::debug!(
            max_score = answer.max_score,
            low_confidence = answer.low_confidence,
            citations = answer.citations.len(),
            "Answer generated"
        );

        if self.json {
            return print_json(&answer);
        }
        print_answer(&answer);
        Ok(())
    }
}

/// Interactive question answering with conversation history
#[derive(Args, Debug)]
pub struct ChatCommand {
    /// Number of chunks to retrieve per question (default: rag.topK)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Metadata filter applied to every question
    #[arg(short, long)]
    pub filter: Option<String>,
}

impl ChatCommand {
    pub async fn execute(&self, pipeline: &RagPipeline) -> AppResult<()> {
        tracing::info!("Starting chat session");

        let filter = parse_filter(self.filter.as_deref())?;
        let mut history: Vec<ChatTurn> = Vec::new();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        println!("Ask a question, or type 'exit' to leave.");
        loop {
            print!("> ");
            std::io::stdout().flush()?;

            let Some(line) = lines.next_line().await? else {
                break;
            };
            let question = line.trim();
            if question.is_empty() {
                continue;
            }
            if matches!(question, "exit" | "quit") {
                break;
            }

            let mut query = Query::new(question);
            query.k = self.top_k;
            query.filter = filter.clone();

            // A failed question does not end the session
            match pipeline.ask(&query, &history).await {
                Ok(answer) => {
                    print_answer(&answer);
                    history.push(ChatTurn::user(question));
                    history.push(ChatTurn::assistant(answer.answer));
                    if history.len() > MAX_HISTORY_TURNS {
                        history.drain(..history.len() - MAX_HISTORY_TURNS);
                    }
                }
                Err(e) => {
                    tracing::warn!(kind = e.kind(), "Question failed: {}", e);
                    eprintln!("Error: {}", e);
                }
            }
            println!();
        }

        tracing::info!(turns = history.len(), "Chat session ended");
        Ok(())
    }
}

fn print_answer(answer: &RagAnswer) {
    println!("{}", answer.answer);
    println!();

    if answer.citations.is_empty() {
        println!("Sources: (no sources available)");
        return;
    }

    if answer.low_confidence {
        println!("Note: the retrieved documents matched the question only weakly.");
    }
    println!("Sources:");
    for citation in &answer.citations {
        let marker = if citation.referenced { "*" } else { " " };
        match citation.title {
            Some(ref title) => println!(
                "{} [{}] {} - {} (score {:.3})",
                marker, citation.id, citation.source_id, title, citation.score
            ),
            None => println!(
                "{} [{}] {} (score {:.3})",
                marker, citation.id, citation.source_id, citation.score
            ),
        }
    }
}
