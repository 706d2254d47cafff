//! SQLite-backed conversation history
//!
//! One row per message, one row per session. Connections are opened per
//! call; async entry points run the blocking work on tokio's blocking pool.

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use super::types::{title_from, DEFAULT_TITLE};
use super::{PersistenceGateway, StoredSession};
use crate::error::{ChatError, Result};
use crate::providers::{ChatHistoryItem, Role};

/// Environment variable overriding the database location
pub const HISTORY_DB_ENV: &str = "STREAMCHAT_HISTORY_DB";

const FULL_ID_LENGTH: usize = 36;

/// Storage backend for conversation history
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    db_path: PathBuf,
}

fn storage_err(e: anyhow::Error) -> ChatError {
    ChatError::Storage(format!("{:#}", e))
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Query and parameter matching a full id or an id prefix
fn id_filter(id: &str) -> (&'static str, String) {
    if id.len() == FULL_ID_LENGTH {
        ("id = ?", id.to_string())
    } else {
        ("id LIKE ?", format!("{}%", id))
    }
}

impl SqliteStorage {
    /// Create a storage instance in the user's data directory
    ///
    /// `STREAMCHAT_HISTORY_DB` overrides the location.
    pub fn new() -> Result<Self> {
        if let Ok(override_path) = std::env::var(HISTORY_DB_ENV) {
            return Self::new_with_path(override_path);
        }

        let proj_dirs = ProjectDirs::from("com", "streamchat", "streamchat")
            .ok_or_else(|| ChatError::Storage("Could not determine data directory".into()))?;
        Self::new_with_path(proj_dirs.data_dir().join("history.db"))
    }

    /// Create a storage instance at an explicit path
    ///
    /// # Examples
    ///
    /// ```
    /// use streamchat::storage::SqliteStorage;
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let storage = SqliteStorage::new_with_path(dir.path().join("history.db")).unwrap();
    /// assert!(storage.list_sessions().unwrap().is_empty());
    /// ```
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .context("Failed to create parent directory for database")
                .map_err(storage_err)?;
        }

        let storage = Self { db_path };
        storage.init()?;
        tracing::debug!("Opened history database at {}", storage.db_path.display());
        Ok(storage)
    }

    /// Location of the database file
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn open(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)
            .context("Failed to open database")
            .map_err(storage_err)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")
            .map_err(storage_err)?;
        Ok(conn)
    }

    fn init(&self) -> Result<()> {
        let conn = self.open()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id, id);",
        )
        .context("Failed to create tables")
        .map_err(storage_err)?;
        Ok(())
    }

    fn ensure_session(tx: &Transaction<'_>, session_id: &str, message: &ChatHistoryItem) -> Result<()> {
        let now = now();
        let title = if message.role == Role::User {
            title_from(&message.content)
        } else {
            DEFAULT_TITLE.to_string()
        };
        tx.execute(
            "INSERT OR IGNORE INTO sessions (id, title, created_at, updated_at) VALUES (?, ?, ?, ?)",
            params![session_id, title, now, now],
        )?;
        if message.role == Role::User {
            tx.execute(
                "UPDATE sessions SET title = ? WHERE id = ? AND title = ?",
                params![title, session_id, DEFAULT_TITLE],
            )?;
        }
        Ok(())
    }

    /// Append a message, creating the session row on first use
    pub fn append(&self, session_id: &str, message: &ChatHistoryItem) -> Result<()> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        Self::ensure_session(&tx, session_id, message)?;
        let now = now();
        tx.execute(
            "INSERT INTO messages (session_id, role, content, created_at) VALUES (?, ?, ?, ?)",
            params![session_id, message.role.to_string(), message.content, now],
        )?;
        tx.execute(
            "UPDATE sessions SET updated_at = ? WHERE id = ?",
            params![now, session_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Overwrite the trailing assistant message or append a new one
    pub fn replace_last_assistant(&self, session_id: &str, content: &str) -> Result<()> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;

        let last: Option<(i64, String)> = tx
            .query_row(
                "SELECT id, role FROM messages WHERE session_id = ? ORDER BY id DESC LIMIT 1",
                params![session_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match last {
            Some((id, role)) if role == Role::Assistant.to_string() => {
                tx.execute(
                    "UPDATE messages SET content = ? WHERE id = ?",
                    params![content, id],
                )?;
            }
            _ => {
                let message = ChatHistoryItem::new(Role::Assistant, content);
                Self::ensure_session(&tx, session_id, &message)?;
                tx.execute(
                    "INSERT INTO messages (session_id, role, content, created_at) VALUES (?, ?, ?, ?)",
                    params![session_id, Role::Assistant.to_string(), content, now()],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Delete the most recent assistant message
    pub fn remove_last_assistant(&self, session_id: &str) -> Result<bool> {
        let conn = self.open()?;
        let removed = conn.execute(
            "DELETE FROM messages WHERE id = (
                SELECT id FROM messages WHERE session_id = ? AND role = ?
                ORDER BY id DESC LIMIT 1
            )",
            params![session_id, Role::Assistant.to_string()],
        )?;
        Ok(removed > 0)
    }

    /// Messages of a session, oldest first
    pub fn messages(&self, session_id: &str) -> Result<Vec<ChatHistoryItem>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT role, content FROM messages WHERE session_id = ? ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![session_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut messages = Vec::new();
        for row in rows {
            let (role, content) = row?;
            let role: Role = role
                .parse()
                .map_err(|_| ChatError::Storage(format!("Unknown role in history: {}", role)))?;
            messages.push(ChatHistoryItem::new(role, content));
        }
        Ok(messages)
    }

    /// Set a session's `updated_at` to now
    pub fn touch(&self, session_id: &str) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "UPDATE sessions SET updated_at = ? WHERE id = ?",
            params![now(), session_id],
        )?;
        Ok(())
    }

    /// Find a session by full id or id prefix
    pub fn find_session(&self, id: &str) -> Result<Option<StoredSession>> {
        let (filter, param) = id_filter(id);
        Ok(self
            .query_sessions(&format!("WHERE s.{}", filter), Some(param))?
            .into_iter()
            .next())
    }

    /// List all sessions, most recently updated first
    pub fn list_sessions(&self) -> Result<Vec<StoredSession>> {
        self.query_sessions("", None)
    }

    fn query_sessions(&self, filter: &str, param: Option<String>) -> Result<Vec<StoredSession>> {
        let conn = self.open()?;
        let sql = format!(
            "SELECT s.id, s.title, s.created_at, s.updated_at,
                (SELECT COUNT(*) FROM messages m WHERE m.session_id = s.id)
            FROM sessions s {}
            ORDER BY s.updated_at DESC",
            filter
        );
        let mut stmt = conn
            .prepare(&sql)
            .context("Failed to prepare statement")
            .map_err(storage_err)?;

        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<StoredSession> {
            let created_at: String = row.get(2)?;
            let updated_at: String = row.get(3)?;
            let count: i64 = row.get(4)?;
            Ok(StoredSession {
                id: row.get(0)?,
                title: row.get(1)?,
                created_at: parse_time(&created_at),
                updated_at: parse_time(&updated_at),
                message_count: usize::try_from(count).unwrap_or(0),
            })
        };
        let rows = match &param {
            Some(param) => stmt.query_map(params![param], map_row)?,
            None => stmt.query_map([], map_row)?,
        };

        let mut sessions = Vec::new();
        for session in rows {
            sessions.push(session?);
        }
        Ok(sessions)
    }

    /// Delete a session and its messages (full id or prefix)
    pub fn delete_session(&self, id: &str) -> Result<usize> {
        let (filter, param) = id_filter(id);
        let conn = self.open()?;
        let deleted = conn
            .execute(&format!("DELETE FROM sessions WHERE {}", filter), params![param])
            .context("Failed to delete session")
            .map_err(storage_err)?;
        Ok(deleted)
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&SqliteStorage) -> Result<T> + Send + 'static,
    {
        let storage = self.clone();
        tokio::task::spawn_blocking(move || op(&storage))
            .await
            .map_err(|e| ChatError::Storage(format!("Storage task failed: {}", e)))?
    }
}

#[async_trait]
impl PersistenceGateway for SqliteStorage {
    async fn append_message(&self, session_id: &str, message: &ChatHistoryItem) -> Result<()> {
        let (session_id, message) = (session_id.to_string(), message.clone());
        self.blocking(move |s| s.append(&session_id, &message)).await
    }

    async fn replace_last_assistant_message(&self, session_id: &str, content: &str) -> Result<()> {
        let (session_id, content) = (session_id.to_string(), content.to_string());
        self.blocking(move |s| s.replace_last_assistant(&session_id, &content))
            .await
    }

    async fn remove_last_assistant_message(&self, session_id: &str) -> Result<bool> {
        let session_id = session_id.to_string();
        self.blocking(move |s| s.remove_last_assistant(&session_id))
            .await
    }

    async fn load_messages(&self, session_id: &str) -> Result<Vec<ChatHistoryItem>> {
        let session_id = session_id.to_string();
        self.blocking(move |s| s.messages(&session_id)).await
    }

    async fn touch_session(&self, session_id: &str) -> Result<()> {
        let session_id = session_id.to_string();
        self.blocking(move |s| s.touch(&session_id)).await
    }
}
