//! Cross-module tests for the knowledge crate.

mod chunking;
mod gateway;
mod rag_ranking;
mod support;
