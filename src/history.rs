//! Conversation history: an in-memory transcript with explicit sqlite
//! persistence. Appends are buffered and become durable on `persist()`, but
//! are visible to `transcript()` immediately so the next generation call
//! always sees them.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

pub const SYSTEM_SOURCE: &str = "system";

const SELF_PROMPT_STATE_KEY: &str = "self_prompt";

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub id: String,
    pub source: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    fn new(source: &str, text: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source: source.to_string(),
            text: text.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// What a restarted actor gets back from storage.
#[derive(Debug, Clone, Default)]
pub struct SavedState {
    pub entries: Vec<HistoryEntry>,
    /// The active self-prompt goal at the time of the last persist, if any.
    pub self_prompt: Option<String>,
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Record an entry. Visible to `transcript()` immediately, durable only
    /// after `persist()`.
    async fn append(&self, source: &str, text: &str) -> Result<()>;

    /// Flush buffered entries to storage.
    async fn persist(&self) -> Result<()>;

    /// Full transcript, oldest first, including unpersisted entries.
    async fn transcript(&self) -> Vec<HistoryEntry>;

    /// Restore the persisted transcript and any saved self-prompt goal,
    /// seeding the in-memory transcript with what was found.
    async fn load_latest(&self) -> Result<SavedState>;

    /// Record (or clear) the active self-prompt goal so a restart can
    /// resume it.
    async fn set_self_prompt(&self, prompt: Option<&str>) -> Result<()>;
}

struct Buffer {
    entries: Vec<HistoryEntry>,
    /// Number of leading entries already written to sqlite.
    flushed: usize,
}

pub struct SqliteHistory {
    conn: Mutex<Connection>,
    buffer: Mutex<Buffer>,
}

impl SqliteHistory {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create data directory {:?}", parent))?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open history database {:?}", path))?;
        let history = Self {
            conn: Mutex::new(conn),
            buffer: Mutex::new(Buffer {
                entries: Vec::new(),
                flushed: 0,
            }),
        };
        history.ensure_schema()?;
        Ok(history)
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("History database lock poisoned: {}", e))
    }

    fn lock_buffer(&self) -> Result<std::sync::MutexGuard<'_, Buffer>> {
        self.buffer
            .lock()
            .map_err(|e| anyhow::anyhow!("History buffer lock poisoned: {}", e))
    }

    fn ensure_schema(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS agent_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    fn get_state(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock_conn()?;
        let result = conn.query_row(
            "SELECT value FROM agent_state WHERE key = ?1",
            [key],
            |row| row.get(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_state(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO agent_state (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn clear_state(&self, key: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute("DELETE FROM agent_state WHERE key = ?1", [key])?;
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for SqliteHistory {
    async fn append(&self, source: &str, text: &str) -> Result<()> {
        let mut buffer = self.lock_buffer()?;
        buffer.entries.push(HistoryEntry::new(source, text));
        Ok(())
    }

    async fn persist(&self) -> Result<()> {
        // Lock order: buffer, then connection. The watermark only moves once
        // the transaction committed.
        let mut buffer = self.lock_buffer()?;
        if buffer.flushed == buffer.entries.len() {
            return Ok(());
        }

        {
            let mut conn = self.lock_conn()?;
            let tx = conn.transaction()?;
            for entry in &buffer.entries[buffer.flushed..] {
                tx.execute(
                    "INSERT OR REPLACE INTO messages (id, source, content, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        entry.id,
                        entry.source,
                        entry.text,
                        entry.created_at.to_rfc3339()
                    ],
                )?;
            }
            tx.commit().context("Failed to persist history")?;
        }

        buffer.flushed = buffer.entries.len();
        Ok(())
    }

    async fn transcript(&self) -> Vec<HistoryEntry> {
        match self.lock_buffer() {
            Ok(buffer) => buffer.entries.clone(),
            Err(e) => {
                tracing::error!("{}", e);
                Vec::new()
            }
        }
    }

    async fn load_latest(&self) -> Result<SavedState> {
        let entries = {
            let conn = self.lock_conn()?;
            let mut stmt = conn.prepare(
                "SELECT id, source, content, created_at FROM messages ORDER BY rowid",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?;

            let mut entries = Vec::new();
            for row in rows {
                let (id, source, text, created_at) = row?;
                let created_at = created_at
                    .parse::<DateTime<Utc>>()
                    .unwrap_or_else(|_| Utc::now());
                entries.push(HistoryEntry {
                    id,
                    source,
                    text,
                    created_at,
                });
            }
            entries
        };

        let self_prompt = self.get_state(SELF_PROMPT_STATE_KEY)?;

        let mut buffer = self.lock_buffer()?;
        buffer.entries = entries.clone();
        buffer.flushed = entries.len();

        Ok(SavedState {
            entries,
            self_prompt,
        })
    }

    async fn set_self_prompt(&self, prompt: Option<&str>) -> Result<()> {
        match prompt {
            Some(prompt) => self.set_state(SELF_PROMPT_STATE_KEY, prompt),
            None => self.clear_state(SELF_PROMPT_STATE_KEY),
        }
    }
}
