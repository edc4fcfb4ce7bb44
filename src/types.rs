//! Shared error taxonomy for the ingestion and retrieval pipeline.

use thiserror::Error;

/// Errors surfaced by the chunking, embedding, storage, and generation layers.
#[derive(Debug, Error)]
pub enum RagError {
    /// Invalid parameters or missing required configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The source document could not be loaded or parsed.
    #[error("document error: {0}")]
    Document(String),

    /// The remote embedding service failed after exhausting retries.
    #[error("embedding service error: {0}")]
    Embedding(String),

    /// Persistence-layer read or write failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// All candidate generation models were tried and failed.
    #[error("generation service error: {0}")]
    Generation(String),

    /// Retrieval produced zero results. An empty knowledge base and a query
    /// with no relevant content are not distinguished.
    #[error("no constitutional data found; ingest the source document first")]
    NotIngested,

    /// The caller cancelled the request. A clean early termination, not a
    /// service failure.
    #[error("request cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_underlying_message() {
        let err = RagError::Storage("batch insert failed at offset 50".into());
        assert!(err.to_string().contains("offset 50"));
    }

    #[test]
    fn not_ingested_message_points_at_ingest() {
        assert!(RagError::NotIngested.to_string().contains("ingest"));
    }
}
