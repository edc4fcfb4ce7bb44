//! End-to-end ingest and ask flows with an in-memory document, the mock
//! embedding provider, a real sqlite-vec store, and a mocked chat service.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use httpmock::prelude::*;
use serde_json::json;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

use samvidhan_rag::document::{DocumentMetadata, DocumentSource};
use samvidhan_rag::embeddings::MockEmbeddingProvider;
use samvidhan_rag::generation::ChatClient;
use samvidhan_rag::pipeline::{AskRequest, RagPipeline};
use samvidhan_rag::stores::SqliteVectorStore;
use samvidhan_rag::types::RagError;

struct MemoryDocumentSource {
    text: String,
}

impl MemoryDocumentSource {
    fn constitution_sample() -> Self {
        let mut text = String::new();
        text.push_str(
            "PART III\n\nArticle 21. Protection of life and personal liberty. No person shall \
             be deprived of his life or personal liberty except according to procedure \
             established by law.\n\n",
        );
        for n in [14usize, 19, 32] {
            let body = format!(
                "Article {n}. A further provision of the Constitution, stated at length so \
                 that the document spans several chunks. "
            )
            .repeat(12);
            text.push_str(&body);
            text.push_str("\n\n");
        }
        Self { text }
    }
}

#[async_trait]
impl DocumentSource for MemoryDocumentSource {
    async fn load_text(&self) -> Result<String, RagError> {
        Ok(self.text.clone())
    }

    async fn metadata(&self) -> Result<DocumentMetadata, RagError> {
        Ok(DocumentMetadata {
            page_count: 3,
            title: "The Constitution of India".into(),
            text_length: self.text.chars().count(),
        })
    }
}

struct Harness {
    server: MockServer,
    dir: tempfile::TempDir,
}

impl Harness {
    async fn new() -> Self {
        Self {
            server: MockServer::start_async().await,
            dir: tempdir().unwrap(),
        }
    }

    async fn pipeline(&self) -> RagPipeline {
        let store = SqliteVectorStore::open(self.dir.path().join("chunks.sqlite"))
            .await
            .unwrap();
        let chat = ChatClient::new(
            reqwest::Client::new(),
            &self.server.base_url(),
            "test-key",
            vec!["model-a".into(), "model-b".into()],
        )
        .unwrap()
        .with_rotation_delay(Duration::from_millis(10));

        RagPipeline::new(
            Arc::new(MemoryDocumentSource::constitution_sample()),
            Arc::new(MockEmbeddingProvider::new().with_dimensions(32)),
            Arc::new(store),
            chat,
        )
    }

    async fn mock_query_optimization(&self) -> httpmock::Mock<'_> {
        self.server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .body_contains("\"stream\":false");
                then.status(200).json_body(json!({
                    "choices": [{ "message": { "content": "\"Article 21 life liberty\"" } }]
                }));
            })
            .await
    }

    async fn mock_answer_stream(&self) -> httpmock::Mock<'_> {
        self.server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .body_contains("\"stream\":true");
                then.status(200).body(concat!(
                    "data: {\"choices\":[{\"delta\":{\"content\":\"Article 21 guarantees \"}}]}\n\n",
                    "data: {\"choices\":[{\"delta\":{\"content\":\"the right to life.\"}}]}\n\n",
                    "data: [DONE]\n\n",
                ));
            })
            .await
    }
}

#[tokio::test]
async fn ingest_is_idempotent() {
    let harness = Harness::new().await;
    let pipeline = harness.pipeline().await;

    let first = pipeline.ingest().await.unwrap();
    assert!(first.success);
    assert!(!first.already_populated);
    assert!(first.chunks_stored > 1, "sample should span several chunks");
    assert_eq!(Some(first.chunks_stored), first.total_chunks);
    assert_eq!(first.pdf_pages, Some(3));

    let second = pipeline.ingest().await.unwrap();
    assert!(second.already_populated);
    assert_eq!(second.chunks_stored, first.chunks_stored);
    assert_eq!(second.total_chunks, None);

    let status = pipeline.status().await;
    assert!(status.populated);
    assert_eq!(status.chunks_stored, first.chunks_stored);
}

#[tokio::test]
async fn ask_on_an_empty_store_never_reaches_generation() {
    let harness = Harness::new().await;
    let optimization = harness.mock_query_optimization().await;
    let answer = harness.mock_answer_stream().await;
    let pipeline = harness.pipeline().await;

    let err = pipeline
        .ask(AskRequest::new("What is Article 21?"), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RagError::NotIngested));
    // Query optimization is best-effort and may run, but no answer stream
    // was ever started.
    assert!(optimization.hits_async().await <= 1);
    answer.assert_hits_async(0).await;
}

#[tokio::test]
async fn ask_streams_an_answer_with_citations() {
    let harness = Harness::new().await;
    harness.mock_query_optimization().await;
    harness.mock_answer_stream().await;
    let pipeline = harness.pipeline().await;

    pipeline.ingest().await.unwrap();

    let outcome = pipeline
        .ask(AskRequest::new("What is Article 21?"), CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.source_count > 0);
    assert!(outcome.source_count <= 5);
    assert!(
        outcome.citations.contains("Article 21"),
        "citations were: {}",
        outcome.citations
    );
    assert!(!outcome.citations.contains('\n'));

    let mut stream = outcome.stream;
    let mut answer = String::new();
    while let Some(fragment) = stream.recv().await {
        answer.push_str(&fragment.unwrap());
    }
    assert_eq!(answer, "Article 21 guarantees the right to life.");
}

#[tokio::test]
async fn ask_falls_back_to_the_raw_question_when_optimization_fails() {
    let harness = Harness::new().await;
    // Optimization endpoint is down; only the streaming endpoint answers.
    harness
        .server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .body_contains("\"stream\":false");
            then.status(500).body("optimizer down");
        })
        .await;
    harness.mock_answer_stream().await;
    let pipeline = harness.pipeline().await;

    pipeline.ingest().await.unwrap();

    let outcome = pipeline
        .ask(AskRequest::new("What is Article 21?"), CancellationToken::new())
        .await
        .unwrap();
    assert!(outcome.source_count > 0, "retrieval proceeds on the raw question");
}

#[tokio::test]
async fn blank_questions_are_rejected() {
    let harness = Harness::new().await;
    let pipeline = harness.pipeline().await;

    let err = pipeline
        .ask(AskRequest::new("   "), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Configuration(_)));
}

#[tokio::test]
async fn cancellation_before_retrieval_surfaces_as_cancelled() {
    let harness = Harness::new().await;
    harness.mock_query_optimization().await;
    let pipeline = harness.pipeline().await;
    pipeline.ingest().await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = pipeline
        .ask(AskRequest::new("What is Article 21?"), cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Cancelled));
}
