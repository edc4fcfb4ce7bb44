//! Retrieval-augmented tutoring pipeline over the Constitution of India.
//!
//! ```text
//! Constitution PDF ──► document::PdfDocumentSource ──► cleaned text
//!                                                        │
//!                           chunker::chunk_text ◄────────┘
//!                                   │
//!                                   ├─► embeddings::EmbeddingProvider (batch)
//!                                   └─► stores::VectorStore (upsert)
//!
//! Question ──► pipeline::RagPipeline::ask
//!                │  optimize query (best-effort, blocking generation)
//!                │  embed query ──► stores::VectorStore::search
//!                │  context::assemble ──► prompts::build_system_prompt
//!                └─► generation::ChatClient (streaming, model rotation)
//!                        │
//!                        └─► fragment stream + citations to the caller
//! ```
//!
//! The HTTP surface, chat history, and UI live outside this crate; callers
//! supply a question and configuration and consume the fragment stream plus
//! out-of-band citation metadata.

pub mod chunker;
pub mod config;
pub mod context;
pub mod document;
pub mod embeddings;
pub mod generation;
pub mod pipeline;
pub mod prompts;
pub mod stores;
pub mod types;

pub use chunker::{TextChunk, chunk_text, chunk_text_with};
pub use config::Settings;
pub use context::{PromptContext, assemble};
pub use document::{DocumentMetadata, DocumentSource, PdfDocumentSource};
pub use embeddings::{EmbeddingProvider, MockEmbeddingProvider, OpenRouterEmbeddings};
pub use generation::{ChatClient, FragmentReceiver};
pub use pipeline::{AskOutcome, AskRequest, IngestReport, IngestStatus, RagPipeline};
pub use prompts::{LearningMode, Scenario, build_system_prompt};
pub use stores::{RetrievalResult, SqliteVectorStore, StoredChunkRecord, VectorStore};
pub use types::RagError;
