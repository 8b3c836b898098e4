//! SQLite backends with FTS5 full-text search.
//!
//! One database file holds:
//! - `episodes`: one row per pipeline run
//! - `episodes_fts`: FTS5 external-content table over question, sql and insight (BM25)
//! - `semantic_entries`: embedded questions/insights backing the vector collections
//!
//! Triggers keep the FTS index in sync on insert/delete/update.

use crate::collection::{CollectionEntry, CollectionHit, VectorCollection};
use crate::vector;
use async_trait::async_trait;
use chrono::Utc;
use lysai_core::error::MemoryError;
use lysai_core::state::Row as DataRow;
use lysai_core::{Episode, EpisodeId, EpisodeStore, EpisodeUpdate, Outcome, plan_from_value};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Open a pool on `path`, creating the file if needed.
///
/// `":memory:"` databases get a single connection so every query sees the
/// same ephemeral database.
pub async fn open_pool(path: &str) -> Result<SqlitePool, MemoryError> {
    let options = SqliteConnectOptions::from_str(path)
        .map_err(|e| MemoryError::Storage(format!("Invalid SQLite path: {e}")))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal);

    let max_connections = if path.contains(":memory:") { 1 } else { 4 };

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .map_err(|e| MemoryError::Storage(format!("Failed to open SQLite: {e}")))
}

/// The durable episode log.
pub struct SqliteEpisodeStore {
    pool: SqlitePool,
}

impl SqliteEpisodeStore {
    /// Open (or create) the episode log at `path`.
    ///
    /// Pass `":memory:"` for an in-process ephemeral database (useful for tests).
    pub async fn new(path: &str) -> Result<Self, MemoryError> {
        let pool = open_pool(path).await?;
        let store = Self::from_pool(pool).await?;
        info!("SQLite episode store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, MemoryError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// The underlying pool, for sharing with the vector collections.
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    async fn run_migrations(&self) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS episodes (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp  TEXT NOT NULL,
                question   TEXT NOT NULL,
                plan_json  TEXT,
                sql        TEXT,
                rows_json  TEXT,
                outcome    TEXT,
                error      TEXT,
                insight    TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("episodes table: {e}")))?;

        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE IF NOT EXISTS episodes_fts USING fts5(
                question,
                sql,
                insight,
                content='episodes',
                content_rowid='id'
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("FTS5 table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TRIGGER IF NOT EXISTS episodes_ai AFTER INSERT ON episodes BEGIN
                INSERT INTO episodes_fts(rowid, question, sql, insight)
                VALUES (new.id, new.question, new.sql, new.insight);
            END
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("insert trigger: {e}")))?;

        sqlx::query(
            r#"
            CREATE TRIGGER IF NOT EXISTS episodes_ad AFTER DELETE ON episodes BEGIN
                INSERT INTO episodes_fts(episodes_fts, rowid, question, sql, insight)
                VALUES ('delete', old.id, old.question, old.sql, old.insight);
            END
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("delete trigger: {e}")))?;

        sqlx::query(
            r#"
            CREATE TRIGGER IF NOT EXISTS episodes_au AFTER UPDATE ON episodes BEGIN
                INSERT INTO episodes_fts(episodes_fts, rowid, question, sql, insight)
                VALUES ('delete', old.id, old.question, old.sql, old.insight);
                INSERT INTO episodes_fts(rowid, question, sql, insight)
                VALUES (new.id, new.question, new.sql, new.insight);
            END
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("update trigger: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_episodes_outcome ON episodes(outcome, id DESC)")
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::MigrationFailed(format!("outcome index: {e}")))?;

        debug!("Episode migrations complete");
        Ok(())
    }

    /// Parse an `Episode` from a SQLite row.
    ///
    /// Malformed plan or rows snapshots degrade to empty/absent rather than
    /// failing the read.
    fn row_to_episode(row: &SqliteRow) -> Result<Episode, MemoryError> {
        let id: i64 = row
            .try_get("id")
            .map_err(|e| MemoryError::QueryFailed(format!("id column: {e}")))?;
        let timestamp_str: String = row
            .try_get("timestamp")
            .map_err(|e| MemoryError::QueryFailed(format!("timestamp column: {e}")))?;
        let question: String = row
            .try_get("question")
            .map_err(|e| MemoryError::QueryFailed(format!("question column: {e}")))?;
        let plan_json: Option<String> = row
            .try_get("plan_json")
            .map_err(|e| MemoryError::QueryFailed(format!("plan_json column: {e}")))?;
        let sql: Option<String> = row
            .try_get("sql")
            .map_err(|e| MemoryError::QueryFailed(format!("sql column: {e}")))?;
        let rows_json: Option<String> = row
            .try_get("rows_json")
            .map_err(|e| MemoryError::QueryFailed(format!("rows_json column: {e}")))?;
        let outcome: Option<String> = row
            .try_get("outcome")
            .map_err(|e| MemoryError::QueryFailed(format!("outcome column: {e}")))?;
        let error: Option<String> = row
            .try_get("error")
            .map_err(|e| MemoryError::QueryFailed(format!("error column: {e}")))?;
        let insight: Option<String> = row
            .try_get("insight")
            .map_err(|e| MemoryError::QueryFailed(format!("insight column: {e}")))?;

        let timestamp = chrono::DateTime::parse_from_rfc3339(&timestamp_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        let plan = match plan_json.as_deref() {
            None => Vec::new(),
            Some(raw) => match serde_json::from_str::<serde_json::Value>(raw) {
                Ok(value) => plan_from_value(&value),
                Err(e) => {
                    warn!(episode_id = id, "Unreadable plan snapshot: {e}");
                    Vec::new()
                }
            },
        };

        let rows = match rows_json.as_deref() {
            None => None,
            Some(raw) => match serde_json::from_str::<Vec<DataRow>>(raw) {
                Ok(rows) => Some(rows),
                Err(e) => {
                    warn!(episode_id = id, "Unreadable rows snapshot: {e}");
                    None
                }
            },
        };

        Ok(Episode {
            id: EpisodeId(id),
            timestamp,
            question,
            plan,
            sql,
            rows,
            outcome: outcome.as_deref().and_then(Outcome::parse),
            error,
            insight,
        })
    }

    /// Build a safe FTS5 query from free text.
    ///
    /// Each alphanumeric token is quoted with prefix matching; tokens are
    /// OR-joined so any shared term counts and BM25 does the ranking.
    fn sanitize_fts_query(text: &str) -> String {
        text.split_whitespace()
            .map(|w| {
                w.chars()
                    .filter(|c| c.is_alphanumeric() || *c == '_')
                    .collect::<String>()
            })
            .filter(|clean| !clean.is_empty())
            .map(|clean| format!("\"{clean}\"*"))
            .collect::<Vec<_>>()
            .join(" OR ")
    }

    fn to_json<T: serde::Serialize>(value: &T, what: &str) -> Result<String, MemoryError> {
        serde_json::to_string(value)
            .map_err(|e| MemoryError::Storage(format!("{what} serialization: {e}")))
    }
}

#[async_trait]
impl EpisodeStore for SqliteEpisodeStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn log_episode(
        &self,
        question: &str,
        plan: &[String],
        sql: Option<&str>,
    ) -> Result<EpisodeId, MemoryError> {
        let plan_json = Self::to_json(&plan, "Plan")?;
        let timestamp = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            INSERT INTO episodes (timestamp, question, plan_json, sql)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&timestamp)
        .bind(question)
        .bind(&plan_json)
        .bind(sql)
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("INSERT failed: {e}")))?;

        let id = EpisodeId(result.last_insert_rowid());
        debug!(episode_id = %id, "Logged episode");
        Ok(id)
    }

    async fn update_episode(&self, id: EpisodeId, update: EpisodeUpdate) -> Result<(), MemoryError> {
        if update.is_empty() {
            return Ok(());
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE episodes SET ");
        let mut set = builder.separated(", ");

        if let Some(plan) = &update.plan {
            set.push("plan_json = ");
            set.push_bind_unseparated(Self::to_json(plan, "Plan")?);
        }
        if let Some(sql) = update.sql {
            set.push("sql = ");
            set.push_bind_unseparated(sql);
        }
        if let Some(rows) = &update.rows {
            set.push("rows_json = ");
            set.push_bind_unseparated(Self::to_json(rows, "Rows")?);
        }
        if let Some(outcome) = update.outcome {
            set.push("outcome = ");
            set.push_bind_unseparated(outcome.as_str());
        }
        if let Some(error) = update.error {
            set.push("error = ");
            set.push_bind_unseparated(error);
        }
        if let Some(insight) = update.insight {
            set.push("insight = ");
            set.push_bind_unseparated(insight);
        }

        builder.push(" WHERE id = ");
        builder.push_bind(id.0);

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("UPDATE failed: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(MemoryError::NotFound(id.0));
        }
        debug!(episode_id = %id, "Updated episode");
        Ok(())
    }

    async fn search_similar(&self, query: &str, limit: usize) -> Result<Vec<Episode>, MemoryError> {
        let fts_query = Self::sanitize_fts_query(query);
        if fts_query.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT e.*
            FROM episodes_fts f
            JOIN episodes e ON e.id = f.rowid
            WHERE episodes_fts MATCH ?1
            ORDER BY bm25(episodes_fts)
            LIMIT ?2
            "#,
        )
        .bind(&fts_query)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await;

        match rows {
            Ok(rows) => rows.iter().map(Self::row_to_episode).collect(),
            Err(e) => {
                // An unusable full-text index reads as "nothing similar yet".
                warn!("FTS5 search failed: {e}");
                Ok(Vec::new())
            }
        }
    }

    async fn recent_successes(&self, limit: usize) -> Result<Vec<Episode>, MemoryError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM episodes
            WHERE outcome = 'success' AND sql IS NOT NULL
            ORDER BY id DESC
            LIMIT ?1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("Recent successes: {e}")))?;

        rows.iter().map(Self::row_to_episode).collect()
    }

    async fn get_episode(&self, id: EpisodeId) -> Result<Option<Episode>, MemoryError> {
        let row = sqlx::query("SELECT * FROM episodes WHERE id = ?1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("GET failed: {e}")))?;

        row.as_ref().map(Self::row_to_episode).transpose()
    }
}

/// A vector collection persisted in the `semantic_entries` table.
///
/// Queries scan the collection and rank by cosine distance in process.
pub struct SqliteCollection {
    pool: SqlitePool,
    name: String,
}

impl SqliteCollection {
    pub async fn new(pool: SqlitePool, name: impl Into<String>) -> Result<Self, MemoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS semantic_entries (
                id          TEXT NOT NULL,
                collection  TEXT NOT NULL,
                episode_id  INTEGER NOT NULL,
                document    TEXT NOT NULL,
                embedding   BLOB NOT NULL,
                PRIMARY KEY (collection, id)
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("semantic_entries table: {e}")))?;

        Ok(Self {
            pool,
            name: name.into(),
        })
    }

    /// Serialize an embedding vector to bytes.
    fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
        blob.chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn row_to_entry(row: &SqliteRow) -> Result<CollectionEntry, MemoryError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| MemoryError::QueryFailed(format!("id column: {e}")))?;
        let episode_id: i64 = row
            .try_get("episode_id")
            .map_err(|e| MemoryError::QueryFailed(format!("episode_id column: {e}")))?;
        let document: String = row
            .try_get("document")
            .map_err(|e| MemoryError::QueryFailed(format!("document column: {e}")))?;
        let blob: Vec<u8> = row
            .try_get("embedding")
            .map_err(|e| MemoryError::QueryFailed(format!("embedding column: {e}")))?;

        Ok(CollectionEntry {
            id,
            episode_id: EpisodeId(episode_id),
            document,
            embedding: Self::blob_to_embedding(&blob),
        })
    }
}

#[async_trait]
impl VectorCollection for SqliteCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upsert(&self, entry: CollectionEntry) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            INSERT INTO semantic_entries (id, collection, episode_id, document, embedding)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(collection, id) DO UPDATE SET
                episode_id = excluded.episode_id,
                document = excluded.document,
                embedding = excluded.embedding
            "#,
        )
        .bind(&entry.id)
        .bind(&self.name)
        .bind(entry.episode_id.0)
        .bind(&entry.document)
        .bind(Self::embedding_to_blob(&entry.embedding))
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("Upsert into {}: {e}", self.name)))?;
        Ok(())
    }

    async fn query(&self, embedding: &[f32], limit: usize) -> Result<Vec<CollectionHit>, MemoryError> {
        let rows = sqlx::query("SELECT * FROM semantic_entries WHERE collection = ?1")
            .bind(&self.name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("Vector scan: {e}")))?;

        let entries: Vec<CollectionEntry> = rows
            .iter()
            .filter_map(|row| Self::row_to_entry(row).ok())
            .collect();

        Ok(vector::nearest(&entries, embedding, limit))
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM semantic_entries WHERE collection = ?1")
            .bind(&self.name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("COUNT failed: {e}")))?;

        let count: i64 = row
            .try_get("cnt")
            .map_err(|e| MemoryError::QueryFailed(format!("count column: {e}")))?;
        Ok(count as usize)
    }
}
