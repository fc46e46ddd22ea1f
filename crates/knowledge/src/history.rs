//! Chat history persistence.

use crate::types::{HistoryEntry, SearchResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tadabbur_core::{AppError, AppResult};

/// Where answered questions are kept.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn record(&self, entry: HistoryEntry) -> AppResult<()>;

    /// The user's most recent entries, newest first.
    async fn recent(&self, user: &str, limit: usize) -> AppResult<Vec<HistoryEntry>>;
}

/// SQLite-backed history.
#[derive(Debug)]
pub struct SqliteHistoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteHistoryStore {
    /// Open (or create) the history database at `db_path`.
    pub fn open(db_path: &Path) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Storage(format!("Failed to create history directory: {}", e))
            })?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| AppError::Storage(format!("Failed to open history database: {}", e)))?;

        Self::init(conn, db_path)
    }

    /// History kept only for the lifetime of the process.
    pub fn in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Storage(format!("Failed to open history database: {}", e)))?;

        Self::init(conn, Path::new(":memory:"))
    }

    fn init(conn: Connection, location: &Path) -> AppResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS chat_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user TEXT NOT NULL,
                query TEXT NOT NULL,
                response TEXT NOT NULL,
                sources TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_history_user ON chat_history(user, created_at);
            "#,
        )
        .map_err(|e| AppError::Storage(format!("Failed to create history tables: {}", e)))?;

        tracing::debug!("Initialized history database at {:?}", location);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&Connection) -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let task = tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| AppError::Storage("History connection is poisoned".to_string()))?;
            f(&guard)
        });

        match task.await {
            Ok(result) => result,
            Err(e) => Err(AppError::Storage(format!("History task failed: {}", e))),
        }
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn record(&self, entry: HistoryEntry) -> AppResult<()> {
        let sources = serde_json::to_string(&entry.sources)?;

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO chat_history (user, query, response, sources, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    entry.user,
                    entry.query,
                    entry.response,
                    sources,
                    entry.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| AppError::Storage(format!("Failed to record history: {}", e)))?;
            Ok(())
        })
        .await
    }

    async fn recent(&self, user: &str, limit: usize) -> AppResult<Vec<HistoryEntry>> {
        let user = user.to_string();
        self.with_conn(move |conn| select_recent(conn, &user, limit))
            .await
    }
}

fn select_recent(conn: &Connection, user: &str, limit: usize) -> AppResult<Vec<HistoryEntry>> {
    let mut stmt = conn
        .prepare(
            "SELECT user, query, response, sources, created_at FROM chat_history
             WHERE user = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
        )
        .map_err(|e| AppError::Storage(format!("Failed to prepare history query: {}", e)))?;

    let rows = stmt
        .query_map(params![user, limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })
        .map_err(|e| AppError::Storage(format!("Failed to query history: {}", e)))?;

    let mut entries = Vec::new();
    for row in rows {
        let (user, query, response, sources, created_at) =
            row.map_err(|e| AppError::Storage(format!("Failed to read history row: {}", e)))?;

        let sources: Vec<SearchResult> = serde_json::from_str(&sources)?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| AppError::Storage(format!("Invalid history timestamp: {}", e)))?
            .with_timezone(&Utc);

        entries.push(HistoryEntry {
            user,
            query,
            response,
            sources,
            created_at,
        });
    }

    Ok(entries)
}

/// History kept in a vector, for tests and throwaway runs.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    entries: Mutex<Vec<HistoryEntry>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded entry, oldest first.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn record(&self, entry: HistoryEntry) -> AppResult<()> {
        self.entries
            .lock()
            .map_err(|_| AppError::Storage("History is poisoned".to_string()))?
            .push(entry);
        Ok(())
    }

    async fn recent(&self, user: &str, limit: usize) -> AppResult<Vec<HistoryEntry>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| AppError::Storage("History is poisoned".to_string()))?;

        Ok(entries
            .iter()
            .rev()
            .filter(|e| e.user == user)
            .take(limit)
            .cloned()
            .collect())
    }
}
