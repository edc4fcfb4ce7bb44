//! Embedding client behavior against a mocked remote service.

use std::time::Duration;

use httpmock::prelude::*;
use serde_json::json;

use samvidhan_rag::embeddings::{EmbeddingProvider, OpenRouterEmbeddings};
use samvidhan_rag::types::RagError;

fn client(server: &MockServer) -> OpenRouterEmbeddings {
    OpenRouterEmbeddings::new(
        reqwest::Client::new(),
        &server.base_url(),
        "test-key",
        "openai/text-embedding-3-small",
    )
    .with_retry_delay(Duration::from_millis(10))
}

#[tokio::test]
async fn batch_results_are_reordered_by_index() {
    let server = MockServer::start_async().await;
    // Service replies out of order; the client must restore input order.
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/embeddings");
            then.status(200).json_body(json!({
                "data": [
                    { "index": 2, "embedding": [3.0, 3.0] },
                    { "index": 0, "embedding": [1.0, 1.0] },
                    { "index": 1, "embedding": [2.0, 2.0] },
                ]
            }));
        })
        .await;

    let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let vectors = client(&server).embed_batch(&texts).await.unwrap();

    mock.assert_async().await;
    assert_eq!(vectors, vec![vec![1.0, 1.0], vec![2.0, 2.0], vec![3.0, 3.0]]);
}

#[tokio::test]
async fn large_batches_are_partitioned_into_groups_of_one_hundred() {
    let server = MockServer::start_async().await;
    let group: Vec<_> = (0..100)
        .map(|i| json!({ "index": i, "embedding": [i as f32, 1.0] }))
        .collect();
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/embeddings");
            then.status(200).json_body(json!({ "data": group }));
        })
        .await;

    let texts: Vec<String> = (0..200).map(|i| format!("text-{i}")).collect();
    let vectors = client(&server).embed_batch(&texts).await.unwrap();

    mock.assert_hits_async(2).await;
    assert_eq!(vectors.len(), 200);
    // Second group concatenates after the first, in order.
    assert_eq!(vectors[100], vec![0.0, 1.0]);
}

#[tokio::test]
async fn batch_group_failure_fails_the_whole_call() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/embeddings");
            then.status(500).body("upstream exploded");
        })
        .await;

    let texts = vec!["a".to_string()];
    let err = client(&server).embed_batch(&texts).await.unwrap_err();
    assert!(matches!(err, RagError::Embedding(_)));
}

#[tokio::test]
async fn query_embedding_succeeds_without_spurious_retry() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/embeddings");
            then.status(200).json_body(json!({
                "data": [{ "index": 0, "embedding": [0.5, 0.5, 0.5] }]
            }));
        })
        .await;

    let vector = client(&server).embed_query("What is Article 21?").await.unwrap();

    mock.assert_hits_async(1).await;
    assert_eq!(vector, vec![0.5, 0.5, 0.5]);
}

#[tokio::test]
async fn query_embedding_retries_three_times_then_propagates() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/embeddings");
            then.status(503).body("unavailable");
        })
        .await;

    let err = client(&server).embed_query("q").await.unwrap_err();

    mock.assert_hits_async(3).await;
    assert!(matches!(err, RagError::Embedding(_)));
}

#[tokio::test]
async fn empty_embedding_in_response_counts_as_failure() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/embeddings");
            then.status(200).json_body(json!({
                "data": [{ "index": 0, "embedding": [] }]
            }));
        })
        .await;

    let err = client(&server).embed_query("q").await.unwrap_err();

    // Malformed success responses burn retry attempts like any failure.
    mock.assert_hits_async(3).await;
    assert!(matches!(err, RagError::Embedding(_)));
}
