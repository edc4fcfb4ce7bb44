//! Vector storage for chunk records.
//!
//! [`VectorStore`] abstracts the persistence layer so the pipeline can run
//! against any nearest-neighbor capable backend. The shipped implementation
//! is [`sqlite::SqliteVectorStore`], backed by `sqlite-vec`.

pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::chunker::TextChunk;
use crate::types::RagError;

pub use sqlite::SqliteVectorStore;

/// Persisted projection of a [`TextChunk`] plus its embedding.
///
/// Upsert semantics: re-storing the same `id` overwrites the previous row,
/// which makes re-running ingest safe.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredChunkRecord {
    pub id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub chunk_index: usize,
    pub start_offset: usize,
    pub end_offset: usize,
    /// Topic tags joined with `", "`, as the citation layer consumes them.
    pub topic_tags: String,
}

impl StoredChunkRecord {
    /// Pairs a chunk with the embedding computed for it.
    pub fn from_chunk(chunk: &TextChunk, embedding: Vec<f32>) -> Self {
        Self {
            id: chunk.id.clone(),
            content: chunk.text.clone(),
            embedding,
            chunk_index: chunk.index,
            start_offset: chunk.start_offset,
            end_offset: chunk.end_offset,
            topic_tags: chunk.joined_tags(),
        }
    }
}

/// One similarity-search hit, ordered by descending similarity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub text: String,
    /// Cosine similarity of the stored chunk to the query vector.
    pub score: f32,
    pub topic_tags: String,
}

/// Persistence backend for chunk embeddings and nearest-neighbor search.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Upserts all records, returning the number stored. A failure aborts the
    /// whole call; the [`RagError::Storage`] message names the failing batch
    /// offset.
    async fn upsert_chunks(&self, records: Vec<StoredChunkRecord>) -> Result<usize, RagError>;

    /// Returns at most `top_k` results ordered by descending cosine
    /// similarity. An empty store yields an empty vector, not an error.
    async fn search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievalResult>, RagError>;

    /// Total number of stored chunk ids.
    async fn count(&self) -> Result<usize, RagError>;

    /// Whether the store holds any chunks. Count failures are swallowed and
    /// treated as empty: this only gates the ingest idempotency check, and a
    /// false negative merely re-runs an upsert-safe ingest.
    async fn is_populated(&self) -> bool {
        match self.count().await {
            Ok(count) => count > 0,
            Err(err) => {
                warn!(error = %err, "count failed; treating store as empty");
                false
            }
        }
    }
}
