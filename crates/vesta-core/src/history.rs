//! Session history - append-only persistence of system messages
//!
//! Every executed batch appends exactly one system message to its session.
//! Later turns read the whole session back to rebuild the schema
//! deduplication cache; no indexed or partial read path is needed.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::message::{SystemMessage, SystemMessageType};

/// Append-only store of per-session system messages.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append one message to a session.
    async fn append(&self, session_id: Uuid, message: &SystemMessage) -> Result<()>;

    /// Load all messages of a session in append order.
    async fn load_session(&self, session_id: Uuid) -> Result<Vec<SystemMessage>>;
}

/// In-memory history store backed by a RwLock map. Used in tests and demos.
#[derive(Default)]
pub struct MemoryHistoryStore {
    sessions: RwLock<HashMap<Uuid, Vec<SystemMessage>>>,
}

impl MemoryHistoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn append(&self, session_id: Uuid, message: &SystemMessage) -> Result<()> {
        self.sessions
            .write()
            .await
            .entry(session_id)
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn load_session(&self, session_id: Uuid) -> Result<Vec<SystemMessage>> {
        Ok(self
            .sessions
            .read()
            .await
            .get(&session_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// SQLite-backed history store for durability across restarts.
pub struct SqliteHistoryStore {
    pool: Pool<Sqlite>,
}

impl SqliteHistoryStore {
    /// Open (or create) the store at the given database path.
    pub async fn from_path(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::History(format!("failed to create directory: {e}")))?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Open an in-memory database. Used in tests.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS system_messages (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                message_type TEXT NOT NULL,
                command_results TEXT NOT NULL,
                summary TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_session ON system_messages(session_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn append(&self, session_id: Uuid, message: &SystemMessage) -> Result<()> {
        let results_json = serde_json::to_string(&message.command_results)?;

        sqlx::query(
            r#"
            INSERT INTO system_messages (
                id, session_id, message_type, command_results, summary, created_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(message.id.to_string())
        .bind(session_id.to_string())
        .bind(message.message_type.as_str())
        .bind(results_json)
        .bind(&message.summary)
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_session(&self, session_id: Uuid) -> Result<Vec<SystemMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, message_type, command_results, summary, created_at
            FROM system_messages
            WHERE session_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.get("id");
            let message_type: String = row.get("message_type");
            let results_json: String = row.get("command_results");
            let summary: String = row.get("summary");
            let created_at: DateTime<Utc> = row.get("created_at");

            messages.push(SystemMessage {
                id: Uuid::from_str(&id).map_err(|e| Error::History(e.to_string()))?,
                message_type: SystemMessageType::from_str(&message_type)
                    .map_err(Error::History)?,
                command_results: serde_json::from_str(&results_json)?,
                summary,
                created_at,
            });
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Params;
    use crate::result::CommandResult;
    use serde_json::json;

    fn sample_message() -> SystemMessage {
        let mut data = Params::new();
        data.insert("schema_id".into(), json!("tracker_data"));
        SystemMessage::new(
            SystemMessageType::DataAdded,
            vec![CommandResult::success("schemas.get").with_data(data)],
            "All 1 commands succeeded",
        )
    }

    #[tokio::test]
    async fn test_memory_round_trip() {
        let store = MemoryHistoryStore::new();
        let session = Uuid::new_v4();
        let msg = sample_message();

        store.append(session, &msg).await.unwrap();
        let loaded = store.load_session(session).await.unwrap();
        assert_eq!(loaded, vec![msg]);

        let other = store.load_session(Uuid::new_v4()).await.unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn test_sqlite_round_trip() {
        let store = SqliteHistoryStore::in_memory().await.unwrap();
        let session = Uuid::new_v4();

        let first = sample_message();
        let second = SystemMessage::new(
            SystemMessageType::ActionsExecuted,
            vec![CommandResult::success("tool_data.create").as_action(true)],
            "All 1 commands succeeded",
        );
        store.append(session, &first).await.unwrap();
        store.append(session, &second).await.unwrap();

        let loaded = store.load_session(session).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, first.id);
        assert_eq!(loaded[1].message_type, SystemMessageType::ActionsExecuted);
        let ids: Vec<&str> = loaded[0].successful_schema_ids().collect();
        assert_eq!(ids, vec!["tracker_data"]);
    }
}
