//! Per-user memory: one prior-session summary per user.
//!
//! `SqliteMemoryStore` uses `rusqlite` synchronously behind a mutex; each
//! call is a single short statement. WAL mode is enabled so a reader never
//! blocks on a concurrent save.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::errors::AgentError;

/// Key-value store for session summaries.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// The user's last saved summary, if any.
    async fn load(&self, user_id: &str) -> Result<Option<String>, AgentError>;

    /// Replace the user's summary.
    async fn save(&self, user_id: &str, summary: &str) -> Result<(), AgentError>;
}

// ─── SQLite ─────────────────────────────────────────────────────────────────

pub struct SqliteMemoryStore {
    conn: Mutex<Connection>,
}

impl SqliteMemoryStore {
    /// Open (or create) the store at the given path.
    ///
    /// Pass `":memory:"` for an in-memory database (tests).
    pub fn open(path: &str) -> Result<Self, AgentError> {
        if path != ":memory:" {
            if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| AgentError::Memory {
                    reason: format!("cannot create {}: {e}", parent.display()),
                })?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS user_memory (
                user_id TEXT PRIMARY KEY,
                summary TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// When the user's summary was last written.
    pub fn updated_at(&self, user_id: &str) -> Result<Option<DateTime<Utc>>, AgentError> {
        let raw: Option<String> = self
            .conn()
            .query_row(
                "SELECT updated_at FROM user_memory WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;

        raw.map(|ts| {
            DateTime::parse_from_rfc3339(&ts)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| AgentError::Memory {
                    reason: format!("bad timestamp '{ts}': {e}"),
                })
        })
        .transpose()
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn load(&self, user_id: &str) -> Result<Option<String>, AgentError> {
        let summary = self
            .conn()
            .query_row(
                "SELECT summary FROM user_memory WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(summary)
    }

    async fn save(&self, user_id: &str, summary: &str) -> Result<(), AgentError> {
        self.conn().execute(
            "INSERT INTO user_memory (user_id, summary, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                summary = excluded.summary,
                updated_at = excluded.updated_at",
            params![user_id, summary, Utc::now().to_rfc3339()],
        )?;
        tracing::debug!(user = %user_id, "memory summary saved");
        Ok(())
    }
}

// ─── In-memory ──────────────────────────────────────────────────────────────

/// Process-local store; nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn load(&self, user_id: &str) -> Result<Option<String>, AgentError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(user_id)
            .cloned())
    }

    async fn save(&self, user_id: &str, summary: &str) -> Result<(), AgentError> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(user_id.to_string(), summary.to_string());
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sqlite_load_absent() {
        let store = SqliteMemoryStore::open(":memory:").unwrap();
        assert_eq!(store.load("u1").await.unwrap(), None);
        assert!(store.updated_at("u1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sqlite_save_overwrites() {
        let store = SqliteMemoryStore::open(":memory:").unwrap();
        store.save("u1", "first").await.unwrap();
        store.save("u1", "second").await.unwrap();
        store.save("u2", "other").await.unwrap();

        assert_eq!(store.load("u1").await.unwrap().as_deref(), Some("second"));
        assert_eq!(store.load("u2").await.unwrap().as_deref(), Some("other"));
        assert!(store.updated_at("u1").unwrap().unwrap() <= Utc::now());
    }

    #[tokio::test]
    async fn test_sqlite_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("memory.db");
        let path = path.to_str().unwrap();

        SqliteMemoryStore::open(path)
            .unwrap()
            .save("u1", "likes tea")
            .await
            .unwrap();

        let reopened = SqliteMemoryStore::open(path).unwrap();
        assert_eq!(reopened.load("u1").await.unwrap().as_deref(), Some("likes tea"));
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemoryStore::new();
        assert!(store.load("u").await.unwrap().is_none());
        store.save("u", "s").await.unwrap();
        assert_eq!(store.load("u").await.unwrap().as_deref(), Some("s"));
    }
}
