//! SQLite-backed session store.
//!
//! One `turns` table holds every session's history; `(session_id, id)` gives
//! chronological order within a session without trusting client clocks.
//! Content is stored JSON-encoded so older rows written with richer content
//! shapes can be recognized and skipped instead of breaking a fetch.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::{Pool, Sqlite};
use tracing::{debug, warn};

use super::SessionStore;
use crate::conversation::{Role, Turn};

pub struct SqliteSessionStore {
    pool: Pool<Sqlite>,
}

impl SqliteSessionStore {
    pub async fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5))
            .journal_mode(SqliteJournalMode::Wal);

        let pool = sqlx::SqlitePool::connect_with(options).await?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub async fn from_pool(pool: Pool<Sqlite>) -> Result<Self> {
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS turns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content_json TEXT NOT NULL,
                metadata_json TEXT,
                created_ms INTEGER NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_turns_session ON turns(session_id, id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn fetch(&self, session_id: &str, limit: usize) -> Result<Vec<Turn>> {
        // Newest rows first to honor the limit, then flipped back to
        // chronological order for the caller.
        let rows = sqlx::query_as::<_, (String, String, Option<String>, i64)>(
            r#"
            SELECT role, content_json, metadata_json, created_ms
            FROM turns
            WHERE session_id = ?
            ORDER BY id DESC
            LIMIT ?
        "#,
        )
        .bind(session_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut turns = Vec::with_capacity(rows.len());
        for (role_str, content_json, metadata_json, created_ms) in rows.into_iter().rev() {
            let Ok(role) = role_str.parse::<Role>() else {
                warn!(session_id, role = %role_str, "skipping turn with unknown role");
                continue;
            };

            let content = match serde_json::from_str::<serde_json::Value>(&content_json) {
                Ok(serde_json::Value::String(text)) => text,
                Ok(_) => {
                    warn!(session_id, "skipping turn with non-text content");
                    continue;
                }
                Err(error) => {
                    warn!(session_id, error = %error, "skipping turn with unreadable content");
                    continue;
                }
            };

            let metadata = metadata_json
                .and_then(|json| serde_json::from_str(&json).ok())
                .unwrap_or_default();

            turns.push(Turn {
                role,
                content,
                metadata,
                created: created_ms,
            });
        }

        debug!(session_id, count = turns.len(), "fetched session history");
        Ok(turns)
    }

    async fn append(&self, session_id: &str, turn: &Turn) -> Result<()> {
        let metadata_json = if turn.metadata.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&turn.metadata)?)
        };

        sqlx::query(
            r#"
            INSERT INTO turns (session_id, role, content_json, metadata_json, created_ms)
            VALUES (?, ?, ?, ?, ?)
        "#,
        )
        .bind(session_id)
        .bind(turn.role.as_str())
        .bind(serde_json::to_string(&serde_json::Value::String(
            turn.content.clone(),
        ))?)
        .bind(metadata_json)
        .bind(turn.created)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
