//! Pipeline orchestration: ingest (chunk → embed → store) and ask
//! (optimize → retrieve → assemble → generate).
//!
//! Services are injected at construction and shared across requests; none of
//! them hold per-request state, so concurrent asks never interfere. The only
//! meaningful race is concurrent ingest, and upsert-by-id storage turns that
//! into redundant work rather than corruption.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chunker::chunk_text;
use crate::config::Settings;
use crate::context::assemble;
use crate::document::{DocumentSource, PdfDocumentSource};
use crate::embeddings::{EmbeddingProvider, OpenRouterEmbeddings};
use crate::generation::{ChatClient, FragmentReceiver};
use crate::prompts::{DEFAULT_LANGUAGE, LearningMode, Scenario, build_system_prompt};
use crate::stores::{SqliteVectorStore, StoredChunkRecord, VectorStore};
use crate::types::RagError;

/// Retrieved chunks per ask request.
const TOP_K: usize = 5;

/// Fixed instruction for the best-effort query-rewrite step.
const OPTIMIZATION_PROMPT: &str = "You are an AI search query optimization assistant.\n\
    Your task is to convert the user's input into a precise, keyword-rich search query \
    optimized for vector-database RAG search against the Constitution of India.\n\
    Extract key legal terms, concepts, or article numbers. Ignore conversational filler.\n\
    Respond ONLY with the optimized search phrase, nothing else.";

/// One ask invocation's inputs. Scenario, mode, and language fall back to
/// their defaults when omitted.
#[derive(Clone, Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(default)]
    pub scenario: Scenario,
    #[serde(default)]
    pub mode: LearningMode,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

impl AskRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            scenario: Scenario::default(),
            mode: LearningMode::default(),
            language: default_language(),
        }
    }
}

/// Live answer stream plus out-of-band metadata for one ask request.
#[derive(Debug)]
pub struct AskOutcome {
    /// Fragments in arrival order; closes on completion or cancellation,
    /// yields one `Err` item if generation fails mid-flight.
    pub stream: FragmentReceiver,
    /// Deduplicated citation summary, safe as a single header value.
    pub citations: String,
    /// Number of retrieved source chunks grounding the answer.
    pub source_count: usize,
}

/// Result of an ingest invocation.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub success: bool,
    pub message: String,
    pub chunks_stored: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_pages: Option<usize>,
    pub already_populated: bool,
}

/// Current ingestion state.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestStatus {
    pub populated: bool,
    pub chunks_stored: usize,
}

/// Composes the document source, chunker, embedding client, vector store,
/// and generation client into the two pipeline operations.
pub struct RagPipeline {
    document: Arc<dyn DocumentSource>,
    embeddings: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    chat: ChatClient,
}

impl RagPipeline {
    pub fn new(
        document: Arc<dyn DocumentSource>,
        embeddings: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        chat: ChatClient,
    ) -> Self {
        Self {
            document,
            embeddings,
            store,
            chat,
        }
    }

    /// Wires the production services from [`Settings`]: the Constitution PDF
    /// source, OpenRouter embedding and chat clients sharing one transport,
    /// and the sqlite-vec store.
    pub async fn from_settings(settings: &Settings) -> Result<Self, RagError> {
        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|err| RagError::Configuration(err.to_string()))?;

        let document = Arc::new(PdfDocumentSource::new(&settings.pdf_path));
        let embeddings = Arc::new(OpenRouterEmbeddings::new(
            http.clone(),
            &settings.base_url,
            &settings.api_key,
            &settings.embedding_model,
        ));
        let store = Arc::new(SqliteVectorStore::open(&settings.db_path).await?);
        let chat = ChatClient::new(
            http,
            &settings.base_url,
            &settings.api_key,
            settings.chat_models.clone(),
        )?;

        Ok(Self::new(document, embeddings, store, chat))
    }

    /// Runs the full document → chunk → embed → store pipeline.
    ///
    /// Idempotent: returns early with the existing count when the store is
    /// already populated. Two concurrent calls that both observe an empty
    /// store will both ingest; upserts make that redundant, not corrupting.
    pub async fn ingest(&self) -> Result<IngestReport, RagError> {
        if self.store.is_populated().await {
            let count = self.store.count().await?;
            info!(chunks = count, "store already populated; skipping ingest");
            return Ok(IngestReport {
                success: true,
                message: "Constitution already ingested".into(),
                chunks_stored: count,
                total_chunks: None,
                pdf_pages: None,
                already_populated: true,
            });
        }

        let text = self.document.load_text().await?;
        let metadata = self.document.metadata().await?;
        info!(
            pages = metadata.page_count,
            characters = metadata.text_length,
            "loaded source document"
        );

        let chunks = chunk_text(&text)?;
        let total_chunks = chunks.len();
        debug!(total_chunks, "chunking complete");

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self.embeddings.embed_batch(&texts).await?;

        let records: Vec<StoredChunkRecord> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| StoredChunkRecord::from_chunk(chunk, embedding))
            .collect();
        let stored = self.store.upsert_chunks(records).await?;

        info!(stored, total_chunks, "ingest complete");
        Ok(IngestReport {
            success: true,
            message: "Constitution ingested successfully".into(),
            chunks_stored: stored,
            total_chunks: Some(total_chunks),
            pdf_pages: Some(metadata.page_count),
            already_populated: false,
        })
    }

    /// Reports whether the corpus has been ingested and how many chunks are
    /// stored. Count failures degrade to zero rather than failing the check.
    pub async fn status(&self) -> IngestStatus {
        let chunks_stored = match self.store.count().await {
            Ok(count) => count,
            Err(err) => {
                warn!(error = %err, "count failed while reading ingest status");
                0
            }
        };
        IngestStatus {
            populated: chunks_stored > 0,
            chunks_stored,
        }
    }

    /// Answers a question grounded in retrieved constitutional text,
    /// returning a live fragment stream plus citation metadata.
    ///
    /// Zero retrieval results surface as [`RagError::NotIngested`] before any
    /// generation is attempted. Cancellation during the pre-stream phases
    /// aborts the in-flight call and surfaces as [`RagError::Cancelled`].
    pub async fn ask(
        &self,
        request: AskRequest,
        cancel: CancellationToken,
    ) -> Result<AskOutcome, RagError> {
        let question = request.question.trim();
        if question.is_empty() {
            return Err(RagError::Configuration("question is required".into()));
        }

        let optimized = tokio::select! {
            _ = cancel.cancelled() => return Err(RagError::Cancelled),
            optimized = self.optimize_query(question) => optimized,
        };

        let results = tokio::select! {
            _ = cancel.cancelled() => return Err(RagError::Cancelled),
            results = self.retrieve(&optimized) => results?,
        };
        if results.is_empty() {
            warn!("retrieval returned no results");
            return Err(RagError::NotIngested);
        }

        let source_count = results.len();
        let prompt_context = assemble(&results);
        let system_prompt = build_system_prompt(
            request.scenario,
            request.mode,
            &prompt_context.context_block,
            &request.language,
        );

        debug!(
            source_count,
            scenario = ?request.scenario,
            mode = ?request.mode,
            "starting answer stream"
        );
        // The stream carries the original question; optimization only steers
        // retrieval.
        let stream = self
            .chat
            .generate_streaming(&system_prompt, question, cancel)
            .await?;

        Ok(AskOutcome {
            stream,
            citations: prompt_context.citation_summary,
            source_count,
        })
    }

    async fn retrieve(&self, query: &str) -> Result<Vec<crate::stores::RetrievalResult>, RagError> {
        let query_embedding = self.embeddings.embed_query(query).await?;
        self.store.search(&query_embedding, TOP_K).await
    }

    /// Best-effort query rewrite: degrade, don't fail. Any error falls back
    /// to the raw question.
    async fn optimize_query(&self, question: &str) -> String {
        match self.chat.generate_blocking(OPTIMIZATION_PROMPT, question).await {
            Ok(rewritten) => {
                let cleaned = normalize_optimized_query(&rewritten);
                if cleaned.is_empty() {
                    question.to_string()
                } else {
                    debug!(optimized = %cleaned, "using optimized search query");
                    cleaned
                }
            }
            Err(err) => {
                warn!(error = %err, "query optimization failed; using raw question");
                question.to_string()
            }
        }
    }
}

/// Strips wrapping quotes and surrounding whitespace from a rewritten query.
fn normalize_optimized_query(raw: &str) -> String {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('"').unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix('"').unwrap_or(trimmed);
    trimmed.trim().to_string()
}
