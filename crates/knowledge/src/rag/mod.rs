//! Retrieval-augmented generation.
//!
//! [`Retriever`] turns a query into ranked, budgeted context; [`Gateway`]
//! turns that context into a cited answer.

pub mod answer;
pub mod ranking;
pub mod retriever;
pub mod types;

pub use answer::{Gateway, GatewayConfig};
pub use ranking::{apply_budget, measure, rank_hits, Budgeted};
pub use retriever::{Retriever, RetrieverConfig};
pub use types::{Citation, Query, RagAnswer, RetrievalResult, Stage, StageTiming};
