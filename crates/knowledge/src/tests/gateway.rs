//! Answer generation: citations, retries, timeouts and failure context.

use super::support::{gateway, hit, Reply, ScriptedClient};
use crate::rag::{RagAnswer, RetrievalResult};
use crate::vector_index::SearchHit;
use ragline_core::{AppError, BudgetUnit, LlmFailure};
use ragline_prompt::ChatTurn;
use std::time::Duration;

fn retrieval(hits: Vec<SearchHit>) -> RetrievalResult {
    RetrievalResult {
        query: "how fast is the fox".to_string(),
        candidates: hits.len(),
        budget_used: hits.iter().map(|h| h.text.len()).sum(),
        budget_limit: 4000,
        budget_unit: BudgetUnit::Chars,
        skipped: Vec::new(),
        stages: Vec::new(),
        hits,
    }
}

fn two_hits() -> RetrievalResult {
    retrieval(vec![
        hit("c1", 0.9, "The quick brown fox."),
        hit("c2", 0.6, "Jumps over the lazy dog."),
    ])
}

#[tokio::test]
async fn test_answer_carries_citations() {
    let client = ScriptedClient::new(vec![Reply::Text("The fox is quick [c1].")]);
    let answer = gateway(client.clone())
        .answer("how fast is the fox", &two_hits(), &[])
        .await
        .unwrap();

    assert_eq!(answer.answer, "The fox is quick [c1].");
    assert_eq!(answer.attempts, 1);
    assert_eq!(answer.model.as_deref(), Some("test-model"));
    assert!(!answer.low_confidence);
    assert_eq!(answer.citations.len(), 2);
    assert!(answer.citations[0].referenced);
    assert!(!answer.citations[1].referenced);

    let request = &client.requests()[0];
    assert!(request.prompt.contains("[c1]"));
    assert!(request.prompt.contains("[c2]"));
    assert!(request.prompt.find("[c1]") < request.prompt.find("[c2]"));
    assert!(request.prompt.contains("Question: how fast is the fox"));
}

#[tokio::test]
async fn test_empty_retrieval_skips_the_model() {
    let client = ScriptedClient::new(Vec::new());
    let answer = gateway(client.clone())
        .answer("anything", &retrieval(Vec::new()), &[])
        .await
        .unwrap();

    assert_eq!(answer, RagAnswer::no_information("anything"));
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn test_timeout_is_retried_once() {
    let client = ScriptedClient::new(vec![
        Reply::Stall(Duration::from_secs(5)),
        Reply::Text("Second time lucky [c2]."),
    ]);
    let answer = gateway(client.clone())
        .answer("q", &two_hits(), &[])
        .await
        .unwrap();

    assert_eq!(answer.attempts, 2);
    assert_eq!(client.calls(), 2);
    let requests = client.requests();
    assert_eq!(requests[0], requests[1]);
}

#[tokio::test]
async fn test_second_failure_surfaces_with_context() {
    let client = ScriptedClient::new(vec![
        Reply::Fail(LlmFailure::Server),
        Reply::Fail(LlmFailure::RateLimited),
    ]);
    let err = gateway(client.clone())
        .answer("q", &two_hits(), &[])
        .await
        .unwrap_err();

    match err {
        AppError::GenerationFailed {
            attempts,
            reason,
            cited_chunks,
            ..
        } => {
            assert_eq!(attempts, 2);
            assert_eq!(reason, LlmFailure::RateLimited);
            assert_eq!(cited_chunks, vec!["c1".to_string(), "c2".to_string()]);
        }
        other => panic!("expected GenerationFailed, got {:?}", other),
    }
    assert_eq!(client.calls(), 2);
}

#[tokio::test]
async fn test_content_filter_is_not_retried() {
    let client = ScriptedClient::new(vec![Reply::Fail(LlmFailure::ContentFiltered)]);
    let err = gateway(client.clone())
        .answer("q", &two_hits(), &[])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AppError::GenerationFailed {
            attempts: 1,
            reason: LlmFailure::ContentFiltered,
            ..
        }
    ));
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn test_low_confidence_adds_note() {
    let client = ScriptedClient::new(Vec::new());
    let weak = retrieval(vec![hit("w1", 0.1, "Barely related text.")]);
    let answer = gateway(client.clone()).answer("q", &weak, &[]).await.unwrap();

    assert!(answer.low_confidence);
    let system = client.requests()[0].system.clone().unwrap_or_default();
    assert!(system.contains("Be cautious"));
}

#[tokio::test]
async fn test_history_is_rendered() {
    let client = ScriptedClient::new(Vec::new());
    let history = vec![
        ChatTurn::user("What does the dog do?"),
        ChatTurn::assistant("The dog is lazy [c2]."),
    ];
    gateway(client.clone())
        .answer("and the fox?", &two_hits(), &history)
        .await
        .unwrap();

    let prompt = &client.requests()[0].prompt;
    assert!(prompt.contains("user: What does the dog do?"));
    assert!(prompt.contains("assistant: The dog is lazy [c2]."));
}

#[tokio::test]
async fn test_retrieval_result_is_not_mutated() {
    let client = ScriptedClient::new(vec![Reply::Fail(LlmFailure::Transport)]);
    let result = two_hits();
    let before = result.clone();
    let _ = gateway(client).answer("q", &result, &[]).await;
    assert_eq!(result, before);
}
