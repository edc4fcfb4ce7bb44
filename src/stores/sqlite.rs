//! SQLite-backed vector store using the `sqlite-vec` extension for cosine
//! similarity search.

use std::mem::transmute;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::Once;

use async_trait::async_trait;
use tokio_rusqlite::{Connection, ffi};
use tracing::debug;

use super::{RetrievalResult, StoredChunkRecord, VectorStore};
use crate::types::RagError;

/// Rows per insert transaction.
const BATCH_SIZE: usize = 50;

const TABLE: &str = "constitution_chunks";

/// Vector store persisting chunk rows and their embeddings in a single
/// SQLite table. Embeddings are stored as JSON arrays and compared with
/// `vec_distance_cosine`.
#[derive(Clone)]
pub struct SqliteVectorStore {
    conn: Connection,
}

impl SqliteVectorStore {
    /// Opens (or creates) the database at `path` and prepares the schema.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, RagError> {
        register_sqlite_vec()?;

        let conn = Connection::open(path)
            .await
            .map_err(|err| RagError::Storage(err.to_string()))?;

        conn.call(|conn| {
            // Confirm the extension actually loaded before anything else.
            conn.query_row("select vec_version()", [], |row| row.get::<_, String>(0))
                .map_err(tokio_rusqlite::Error::Rusqlite)?;

            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {TABLE} (
                    id TEXT PRIMARY KEY,
                    content TEXT NOT NULL,
                    embedding TEXT NOT NULL,
                    chunk_index INTEGER NOT NULL,
                    start_offset INTEGER NOT NULL,
                    end_offset INTEGER NOT NULL,
                    topic_tags TEXT NOT NULL
                )"
            ))
            .map_err(tokio_rusqlite::Error::Rusqlite)?;
            Ok(())
        })
        .await
        .map_err(|err| RagError::Storage(err.to_string()))?;

        Ok(Self { conn })
    }

    /// Removes every stored chunk. Full corpus reset, used by tests.
    pub async fn clear(&self) -> Result<(), RagError> {
        self.conn
            .call(|conn| {
                conn.execute(&format!("DELETE FROM {TABLE}"), [])
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(())
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert_chunks(&self, records: Vec<StoredChunkRecord>) -> Result<usize, RagError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut stored = 0usize;
        for (batch_number, batch) in records.chunks(BATCH_SIZE).enumerate() {
            let offset = batch_number * BATCH_SIZE;
            let rows: Vec<(String, String, String, usize, usize, usize, String)> = batch
                .iter()
                .map(|record| {
                    let embedding = serde_json::to_string(&record.embedding)
                        .unwrap_or_else(|_| "[]".to_string());
                    (
                        record.id.clone(),
                        record.content.clone(),
                        embedding,
                        record.chunk_index,
                        record.start_offset,
                        record.end_offset,
                        record.topic_tags.clone(),
                    )
                })
                .collect();

            let inserted = self
                .conn
                .call(move |conn| {
                    let tx = conn.transaction().map_err(tokio_rusqlite::Error::Rusqlite)?;
                    for (id, content, embedding, chunk_index, start, end, tags) in &rows {
                        tx.execute(
                            &format!(
                                "INSERT OR REPLACE INTO {TABLE}
                                 (id, content, embedding, chunk_index, start_offset, end_offset, topic_tags)
                                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
                            ),
                            (id, content, embedding, chunk_index, start, end, tags),
                        )
                        .map_err(tokio_rusqlite::Error::Rusqlite)?;
                    }
                    tx.commit().map_err(tokio_rusqlite::Error::Rusqlite)?;
                    Ok(rows.len())
                })
                .await
                .map_err(|err| {
                    RagError::Storage(format!("batch insert failed at offset {offset}: {err}"))
                })?;

            stored += inserted;
        }

        debug!(stored, "chunk upsert complete");
        Ok(stored)
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievalResult>, RagError> {
        let query_json = serde_json::to_string(query_embedding)
            .map_err(|err| RagError::Storage(err.to_string()))?;

        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT content, topic_tags,
                                vec_distance_cosine(vec_f32(embedding), vec_f32(?1)) AS distance
                         FROM {TABLE}
                         ORDER BY distance ASC
                         LIMIT {top_k}"
                    ))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;

                let rows = stmt
                    .query_map([&query_json], |row| {
                        let distance: f32 = row.get(2)?;
                        Ok(RetrievalResult {
                            text: row.get(0)?,
                            // Cosine similarity from cosine distance.
                            score: 1.0 - distance,
                            topic_tags: row.get(1)?,
                        })
                    })
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;

                let mut results = Vec::new();
                for row in rows {
                    results.push(row.map_err(tokio_rusqlite::Error::Rusqlite)?);
                }
                Ok(results)
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))
    }

    async fn count(&self) -> Result<usize, RagError> {
        self.conn
            .call(|conn| {
                let count: i64 = conn
                    .query_row(&format!("SELECT COUNT(*) FROM {TABLE}"), [], |row| row.get(0))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(count as usize)
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))
    }
}

/// Registers `sqlite-vec` as an auto-loaded extension for every new
/// connection in this process. Safe to call repeatedly.
fn register_sqlite_vec() -> Result<(), RagError> {
    use std::sync::Mutex;

    static INIT: Once = Once::new();
    static INIT_RESULT: Mutex<Option<Result<(), String>>> = Mutex::new(None);

    INIT.call_once(|| {
        let result = unsafe {
            type SqliteExtensionInit = unsafe extern "C" fn(
                *mut ffi::sqlite3,
                *mut *mut c_char,
                *const ffi::sqlite3_api_routines,
            ) -> i32;

            let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
            let init_fn: SqliteExtensionInit =
                transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
            let rc = ffi::sqlite3_auto_extension(Some(init_fn));
            if rc != 0 {
                Err(format!("failed to register sqlite-vec extension (code {rc})"))
            } else {
                Ok(())
            }
        };
        *INIT_RESULT.lock().expect("init result mutex poisoned") = Some(result);
    });

    INIT_RESULT
        .lock()
        .expect("init result mutex poisoned")
        .clone()
        .expect("init was called but result not set")
        .map_err(RagError::Storage)
}
