use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::task;

use crate::config;
use crate::models::Conversation;

/// Keyed JSON persistence. Each conversation is stored whole as one JSON
/// record; `updated_at` is duplicated into its own column for ordering.
#[derive(Debug, Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|_| anyhow!("Database connection lock poisoned"))
}

impl Database {
    pub async fn new() -> Result<Self> {
        let path = Self::db_path()?;
        task::spawn_blocking(move || {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create data directory: {}", parent.display())
                })?;
            }

            let conn = Connection::open(&path)
                .with_context(|| format!("Failed to open database at {}", path.display()))?;
            conn.execute_batch("PRAGMA journal_mode=WAL;")?;

            let db = Database {
                conn: Arc::new(Mutex::new(conn)),
            };
            db.run_migrations()?;
            tracing::info!("Opened conversation store at {}", path.display());
            Ok(db)
        })
        .await?
    }

    /// Create an in-memory database (used for testing and as placeholder)
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn db_path() -> Result<PathBuf> {
        Ok(config::data_dir()?.join("bhima.db"))
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = lock(&self.conn)?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER NOT NULL
            );",
        )?;

        let version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if version < 1 {
            conn.execute_batch(
                "CREATE TABLE conversations (
                    id TEXT PRIMARY KEY,
                    data TEXT NOT NULL,
                    updated_at INTEGER NOT NULL
                );
                CREATE INDEX idx_conversations_updated ON conversations(updated_at DESC);

                CREATE TABLE IF NOT EXISTS settings (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                INSERT INTO schema_version (version) VALUES (1);",
            )?;
        }

        Ok(())
    }

    // --- Conversations ---

    /// Inserts or replaces the record with the conversation's id.
    pub async fn put_conversation(&self, conversation: &Conversation) -> Result<()> {
        let conn = self.conn.clone();
        let id = conversation.id.clone();
        let updated_at = conversation.updated_at.timestamp_millis();
        let data = serde_json::to_string(conversation)
            .with_context(|| format!("Failed to serialize conversation {}", id))?;
        task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            conn.execute(
                "INSERT INTO conversations (id, data, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET data = ?2, updated_at = ?3",
                params![id, data, updated_at],
            )?;
            Ok(())
        })
        .await?
    }

    pub async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        let conn = self.conn.clone();
        let id = id.to_string();
        task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let data: Option<String> = conn
                .query_row(
                    "SELECT data FROM conversations WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;
            data.map(|d| {
                serde_json::from_str(&d)
                    .with_context(|| format!("Corrupt conversation record {}", id))
            })
            .transpose()
        })
        .await?
    }

    /// All stored conversations, most recently updated first. Records that no
    /// longer deserialize are skipped.
    pub async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let conn = self.conn.clone();
        task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let mut stmt =
                conn.prepare("SELECT id, data FROM conversations ORDER BY updated_at DESC")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;

            let conversations = rows
                .into_iter()
                .filter_map(|(id, data)| match serde_json::from_str(&data) {
                    Ok(conv) => Some(conv),
                    Err(e) => {
                        tracing::warn!("Skipping corrupt conversation record {}: {}", id, e);
                        None
                    }
                })
                .collect();
            Ok(conversations)
        })
        .await?
    }

    pub async fn delete_conversation(&self, id: &str) -> Result<()> {
        let conn = self.conn.clone();
        let id = id.to_string();
        task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            conn.execute("DELETE FROM conversations WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await?
    }

    pub async fn clear_conversations(&self) -> Result<()> {
        let conn = self.conn.clone();
        task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            conn.execute("DELETE FROM conversations", [])?;
            Ok(())
        })
        .await?
    }

    // --- Settings ---

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.clone();
        let key = key.to_string();
        task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let result: Option<String> = conn
                .query_row(
                    "SELECT value FROM settings WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(result)
        })
        .await?
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.clone();
        let key = key.to_string();
        let value = value.to_string();
        task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            conn.execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = ?2",
                params![key, value],
            )?;
            Ok(())
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Message, Role};
    use chrono::Duration;

    #[tokio::test]
    async fn test_schema_initialization() {
        let db = Database::new_in_memory().unwrap();
        assert!(db.list_conversations().await.unwrap().is_empty());
        assert!(db.get_setting("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_conversation_round_trip() {
        let db = Database::new_in_memory().unwrap();
        let mut conv = Conversation::new("m", Some("sys"));
        conv.messages.push(Message::new(Role::User, "Hello!", None));
        db.put_conversation(&conv).await.unwrap();

        let fetched = db.get_conversation(&conv.id).await.unwrap().unwrap();
        assert_eq!(fetched.messages.len(), 2);
        assert_eq!(fetched.messages[1].content, "Hello!");

        conv.title = "Renamed".into();
        db.put_conversation(&conv).await.unwrap();
        let all = db.list_conversations().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "Renamed");

        db.delete_conversation(&conv.id).await.unwrap();
        assert!(db.get_conversation(&conv.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_orders_by_updated_desc() {
        let db = Database::new_in_memory().unwrap();
        let mut old = Conversation::new("m", None);
        old.updated_at -= Duration::hours(2);
        let new = Conversation::new("m", None);
        db.put_conversation(&old).await.unwrap();
        db.put_conversation(&new).await.unwrap();

        let ids: Vec<_> = db
            .list_conversations()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![new.id, old.id]);
    }

    #[tokio::test]
    async fn test_corrupt_record_is_skipped() {
        let db = Database::new_in_memory().unwrap();
        db.put_conversation(&Conversation::new("m", None)).await.unwrap();
        {
            let conn = lock(&db.conn).unwrap();
            conn.execute(
                "INSERT INTO conversations (id, data, updated_at) VALUES ('bad', '{oops', 0)",
                [],
            )
            .unwrap();
        }
        assert_eq!(db.list_conversations().await.unwrap().len(), 1);
        assert!(db.get_conversation("bad").await.is_err());
    }

    #[tokio::test]
    async fn test_clear_and_settings() {
        let db = Database::new_in_memory().unwrap();
        db.put_conversation(&Conversation::new("m", None)).await.unwrap();
        db.put_conversation(&Conversation::new("m", None)).await.unwrap();
        db.clear_conversations().await.unwrap();
        assert!(db.list_conversations().await.unwrap().is_empty());

        db.set_setting("k", "v1").await.unwrap();
        db.set_setting("k", "v2").await.unwrap();
        assert_eq!(db.get_setting("k").await.unwrap().as_deref(), Some("v2"));
    }
}
