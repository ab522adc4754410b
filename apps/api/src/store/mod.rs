//! Exemplar Store — the persistent embedding index of exemplar essay chunks.
//!
//! One SQLite database inside the store directory holds every chunk's text,
//! provenance and embedding in the same row, so the index can never reference
//! text it does not have. Search is exact: every stored vector is scored.
//!
//! Writers are serialized by `write_lock` and each `add` is one transaction,
//! so a document's chunks land together or not at all.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::create_pool;

pub mod embedding;
pub mod models;

use embedding::{EmbedError, Embedder};
pub use models::{ChunkOffset, ExemplarChunk, NewChunk};
use models::{cosine_similarity, decode_embedding, encode_embedding};

/// File name of the SQLite database inside the store directory.
const INDEX_FILE: &str = "exemplars.sqlite3";
const MODEL_META_KEY: &str = "embedding_model";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not open index at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: sqlx::Error,
    },

    #[error("index write failed: {0}")]
    Write(#[source] sqlx::Error),

    #[error("index read failed: {0}")]
    Read(#[source] sqlx::Error),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedError),

    #[error("index was built with embedding model '{stored}', but '{current}' is configured")]
    ModelMismatch { stored: String, current: String },

    #[error("corrupt index row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// An index that cannot be opened counts as a write failure: ingest is the
    /// path that creates it.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            StoreError::Open { .. } | StoreError::Write(_) | StoreError::Embedding(_)
        )
    }
}

#[derive(Debug, FromRow)]
struct ChunkRow {
    id: String,
    text: String,
    source_document: String,
    start_index: i64,
    chunk_index: i64,
    embedding: Vec<u8>,
}

impl TryFrom<ChunkRow> for ExemplarChunk {
    type Error = StoreError;

    fn try_from(row: ChunkRow) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| StoreError::Corrupt(format!("chunk id '{}': {e}", row.id)))?;
        Ok(ExemplarChunk {
            id,
            text: row.text,
            source_document: row.source_document,
            embedding: decode_embedding(&row.embedding),
            offset: ChunkOffset {
                start_index: row.start_index.max(0) as usize,
                chunk_index: row.chunk_index.max(0) as usize,
            },
        })
    }
}

pub struct ExemplarStore {
    pool: SqlitePool,
    embedder: Arc<dyn Embedder>,
    write_lock: Mutex<()>,
}

impl ExemplarStore {
    /// Opens the store in `dir`, creating the directory and schema on first use.
    pub async fn open(dir: &Path, embedder: Arc<dyn Embedder>) -> Result<Self, StoreError> {
        let db_path = dir.join(INDEX_FILE);
        std::fs::create_dir_all(dir).map_err(|e| StoreError::Open {
            path: db_path.clone(),
            source: sqlx::Error::Io(e),
        })?;
        let pool = create_pool(&db_path)
            .await
            .map_err(|source| StoreError::Open {
                path: db_path.clone(),
                source,
            })?;

        let store = Self {
            pool,
            embedder,
            write_lock: Mutex::new(()),
        };
        store.migrate().await?;
        store.check_embedding_model().await?;
        Ok(store)
    }

    /// True when `dir` holds an index file. A missing directory is the canonical empty store.
    pub fn exists_at(dir: &Path) -> bool {
        dir.join(INDEX_FILE).is_file()
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS exemplar_chunks (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                text TEXT NOT NULL,
                source_document TEXT NOT NULL,
                start_index INTEGER NOT NULL,
                chunk_index INTEGER NOT NULL,
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Write)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS store_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Write)?;

        Ok(())
    }

    async fn check_embedding_model(&self) -> Result<(), StoreError> {
        let stored: Option<String> =
            sqlx::query_scalar("SELECT value FROM store_meta WHERE key = ?")
                .bind(MODEL_META_KEY)
                .fetch_optional(&self.pool)
                .await
                .map_err(StoreError::Read)?;
        let current = self.embedder.model_id();
        match stored {
            Some(stored) if stored != current => Err(StoreError::ModelMismatch { stored, current }),
            _ => Ok(()),
        }
    }

    /// Embeds and indexes `chunks` atomically. Returns the number of chunks added.
    pub async fn add(&self, chunks: Vec<NewChunk>) -> Result<usize, StoreError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        // Embed before touching the index so a failed embedding writes nothing.
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(StoreError::Embedding(EmbedError::Malformed(format!(
                "{} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            ))));
        }

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(StoreError::Write)?;

        sqlx::query("INSERT OR IGNORE INTO store_meta (key, value) VALUES (?, ?)")
            .bind(MODEL_META_KEY)
            .bind(self.embedder.model_id())
            .execute(&mut *tx)
            .await
            .map_err(StoreError::Write)?;

        let created_at = Utc::now().to_rfc3339();
        for (chunk, vector) in chunks.iter().zip(&vectors) {
            sqlx::query(
                r#"
                INSERT INTO exemplar_chunks
                    (id, text, source_document, start_index, chunk_index, embedding, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&chunk.text)
            .bind(&chunk.source_document)
            .bind(chunk.offset.start_index as i64)
            .bind(chunk.offset.chunk_index as i64)
            .bind(encode_embedding(vector))
            .bind(&created_at)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::Write)?;
        }

        tx.commit().await.map_err(StoreError::Write)?;
        info!("Indexed {} chunks", chunks.len());
        Ok(chunks.len())
    }

    pub async fn count(&self) -> Result<usize, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM exemplar_chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::Read)?;
        Ok(count.max(0) as usize)
    }

    /// Returns up to `k` chunks by descending similarity to `query`.
    /// Ties keep insertion order.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<ExemplarChunk>, StoreError> {
        let all = self.get_all().await?;
        let k = k.min(all.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self
            .embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::Malformed("no vector for query".to_string()))?;

        let mut scored: Vec<(f32, ExemplarChunk)> = all
            .into_iter()
            .map(|chunk| (cosine_similarity(&query_vector, &chunk.embedding), chunk))
            .collect();
        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        scored.truncate(k);

        if let Some((top, _)) = scored.first() {
            debug!("Search returned {k} chunks, top similarity {top:.3}");
        }
        Ok(scored.into_iter().map(|(_, chunk)| chunk).collect())
    }

    /// Every stored chunk, in insertion order.
    pub async fn get_all(&self) -> Result<Vec<ExemplarChunk>, StoreError> {
        let rows: Vec<ChunkRow> = sqlx::query_as(
            r#"
            SELECT id, text, source_document, start_index, chunk_index, embedding
            FROM exemplar_chunks
            ORDER BY seq ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Read)?;

        rows.into_iter().map(ExemplarChunk::try_from).collect()
    }

    /// Destructively clears every chunk and the embedding-model marker.
    pub async fn reset(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(StoreError::Write)?;
        sqlx::query("DELETE FROM exemplar_chunks")
            .execute(&mut *tx)
            .await
            .map_err(StoreError::Write)?;
        sqlx::query("DELETE FROM store_meta")
            .execute(&mut *tx)
            .await
            .map_err(StoreError::Write)?;
        tx.commit().await.map_err(StoreError::Write)?;
        info!("Exemplar store reset");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
