//! Embedding clients: the OpenRouter-backed provider used in production and
//! a deterministic mock for tests.
//!
//! Batch embedding is all-or-nothing per invocation: a failure in any group
//! fails the whole call. Re-running ingest is safe because the store upserts
//! by chunk id. Query embedding retries a fixed number of times with a fixed
//! delay, since a single lost query request should not fail an ask request.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::RagError;

/// Fixed dimension of embedding vectors.
pub const EMBEDDING_DIM: usize = 1536;
/// Remote service limit on texts per embedding request.
const BATCH_SIZE: usize = 100;
/// Total attempts for a query embedding (first try plus retries).
const QUERY_ATTEMPTS: usize = 3;
/// Per-call timeout for query embedding requests.
const QUERY_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Converts text into fixed-length semantic vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds every text, preserving input order and length.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;

    /// Embeds a single query string, retrying transient failures.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RagError>;
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingEntry>,
}

#[derive(Deserialize)]
struct EmbeddingEntry {
    index: usize,
    embedding: Vec<f32>,
}

/// OpenRouter `/embeddings` client.
pub struct OpenRouterEmbeddings {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    retry_delay: Duration,
}

impl OpenRouterEmbeddings {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            model: model.into(),
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Overrides the delay between query-embedding retries. Tests shrink it.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    async fn request_embeddings(
        &self,
        input: &[String],
        timeout: Option<Duration>,
    ) -> Result<Vec<Vec<f32>>, RagError> {
        let mut request = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input,
            });
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|err| RagError::Embedding(err.to_string()))?
            .error_for_status()
            .map_err(|err| RagError::Embedding(err.to_string()))?;

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|err| RagError::Embedding(format!("invalid embedding response: {err}")))?;

        parsed.data.sort_by_key(|entry| entry.index);
        if parsed.data.len() != input.len() {
            return Err(RagError::Embedding(format!(
                "service returned {} embeddings for {} inputs",
                parsed.data.len(),
                input.len()
            )));
        }
        if parsed.data.iter().any(|entry| entry.embedding.is_empty()) {
            return Err(RagError::Embedding("empty embedding in response".into()));
        }

        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenRouterEmbeddings {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut all = Vec::with_capacity(texts.len());
        for (group_index, group) in texts.chunks(BATCH_SIZE).enumerate() {
            debug!(group = group_index, size = group.len(), "embedding batch group");
            let vectors = self.request_embeddings(group, None).await?;
            all.extend(vectors);
        }
        Ok(all)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let input = [text.to_string()];
        let mut last_error = None;

        for attempt in 1..=QUERY_ATTEMPTS {
            match self.request_embeddings(&input, Some(QUERY_TIMEOUT)).await {
                Ok(mut vectors) => return Ok(vectors.swap_remove(0)),
                Err(err) => {
                    warn!(attempt, error = %err, "query embedding attempt failed");
                    last_error = Some(err);
                    if attempt < QUERY_ATTEMPTS {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| RagError::Embedding("no attempts made".into())))
    }
}

/// Deterministic embedding provider for tests and offline runs. Identical
/// text always yields an identical vector.
pub struct MockEmbeddingProvider {
    dimensions: usize,
}

impl MockEmbeddingProvider {
    pub fn new() -> Self {
        Self {
            dimensions: EMBEDDING_DIM,
        }
    }

    #[must_use]
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let mut state = hasher.finish();

        (0..self.dimensions)
            .map(|_| {
                // Cheap xorshift over the text hash.
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                (state % 2000) as f32 / 1000.0 - 1.0
            })
            .collect()
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RagError> {
        Ok(self.embed_one(text))
    }
}
