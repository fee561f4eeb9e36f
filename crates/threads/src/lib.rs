//! Conversation journal for kiln.
//!
//! Sessions own threads, threads own messages. Each message can carry
//! attribution: which provider answered, which prompt (name and version)
//! shaped the system directive, token count and cost. SQLite-backed; the
//! schema is created on connect.

use chrono::{DateTime, Utc};
use kiln_core::TierError;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// A user session, the root of ownership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A conversation thread inside a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: Uuid,
    pub session_id: Uuid,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A single message in a thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub thread_id: Uuid,
    /// "user", "assistant", or "system"
    pub role: String,
    pub content: String,
    /// Provider id that produced an assistant message
    pub provider: Option<String>,
    /// Prompt attribution
    pub prompt_name: Option<String>,
    pub prompt_version: Option<String>,
    pub token_count: Option<i64>,
    pub cost_cents: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Attribution fields attached to a new message.
#[derive(Debug, Clone, Default)]
pub struct MessageMeta {
    pub provider: Option<String>,
    pub prompt_name: Option<String>,
    pub prompt_version: Option<String>,
    pub token_count: Option<i64>,
    pub cost_cents: Option<i64>,
}

/// The journal: a pool plus the repository operations over it.
pub struct ThreadJournal {
    pool: SqlitePool,
}

impl ThreadJournal {
    /// Open (or create) the journal database.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral journal in tests.
    pub async fn new(url: &str) -> Result<Self, TierError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| TierError::Unreachable(format!("Invalid SQLite url: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .pragma("foreign_keys", "ON");

        // an in-memory database exists per connection, so the pool must
        // not grow past one
        let max_connections = if url.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| TierError::Unreachable(format!("Failed to open SQLite: {e}")))?;

        let journal = Self { pool };
        journal.run_migrations().await?;
        info!("thread journal initialized at {url}");
        Ok(journal)
    }

    async fn run_migrations(&self) -> Result<(), TierError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id         TEXT PRIMARY KEY,
                user_id    TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| TierError::Migration(format!("sessions table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS threads (
                id         TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                title      TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| TierError::Migration(format!("threads table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                iid            INTEGER PRIMARY KEY AUTOINCREMENT,
                id             TEXT UNIQUE NOT NULL,
                thread_id      TEXT NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
                role           TEXT NOT NULL,
                content        TEXT NOT NULL,
                provider       TEXT,
                prompt_name    TEXT,
                prompt_version TEXT,
                token_count    INTEGER,
                cost_cents     INTEGER,
                created_at     TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| TierError::Migration(format!("messages table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_thread ON messages(thread_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| TierError::Migration(format!("thread index: {e}")))?;

        debug!("journal migrations complete");
        Ok(())
    }

    /// Create a new session.
    pub async fn create_session(&self, user_id: Option<&str>) -> Result<Session, TierError> {
        let session = Session {
            id: Uuid::new_v4(),
            user_id: user_id.map(|s| s.to_string()),
            created_at: Utc::now(),
        };

        sqlx::query("INSERT INTO sessions (id, user_id, created_at) VALUES (?, ?, ?)")
            .bind(session.id.to_string())
            .bind(&session.user_id)
            .bind(session.created_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| TierError::Storage(format!("create session: {e}")))?;

        Ok(session)
    }

    /// Create a new thread inside a session.
    pub async fn create_thread(
        &self,
        session_id: Uuid,
        title: Option<&str>,
    ) -> Result<Thread, TierError> {
        let thread = Thread {
            id: Uuid::new_v4(),
            session_id,
            title: title.map(|s| s.to_string()),
            created_at: Utc::now(),
        };

        sqlx::query("INSERT INTO threads (id, session_id, title, created_at) VALUES (?, ?, ?, ?)")
            .bind(thread.id.to_string())
            .bind(thread.session_id.to_string())
            .bind(&thread.title)
            .bind(thread.created_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| TierError::Storage(format!("create thread: {e}")))?;

        Ok(thread)
    }

    /// Append a message to a thread.
    pub async fn add_message(
        &self,
        thread_id: Uuid,
        role: &str,
        content: &str,
        meta: MessageMeta,
    ) -> Result<Message, TierError> {
        let message = Message {
            id: Uuid::new_v4(),
            thread_id,
            role: role.to_string(),
            content: content.to_string(),
            provider: meta.provider,
            prompt_name: meta.prompt_name,
            prompt_version: meta.prompt_version,
            token_count: meta.token_count,
            cost_cents: meta.cost_cents,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO messages
                (id, thread_id, role, content, provider, prompt_name, prompt_version,
                 token_count, cost_cents, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(message.id.to_string())
        .bind(message.thread_id.to_string())
        .bind(&message.role)
        .bind(&message.content)
        .bind(&message.provider)
        .bind(&message.prompt_name)
        .bind(&message.prompt_version)
        .bind(message.token_count)
        .bind(message.cost_cents)
        .bind(message.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| TierError::Storage(format!("add message: {e}")))?;

        Ok(message)
    }

    /// All messages in a thread, in insertion order.
    pub async fn thread_messages(&self, thread_id: Uuid) -> Result<Vec<Message>, TierError> {
        let rows = sqlx::query(
            r#"
            SELECT id, thread_id, role, content, provider, prompt_name, prompt_version,
                   token_count, cost_cents, created_at
            FROM messages
            WHERE thread_id = ?
            ORDER BY iid ASC
            "#,
        )
        .bind(thread_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TierError::Storage(format!("thread messages: {e}")))?;

        rows.iter().map(row_to_message).collect()
    }
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, TierError> {
    let parse_uuid = |col: &str| -> Result<Uuid, TierError> {
        let raw: String = row
            .try_get(col)
            .map_err(|e| TierError::Corrupt(format!("{col} column: {e}")))?;
        Uuid::parse_str(&raw).map_err(|e| TierError::Corrupt(format!("{col} uuid: {e}")))
    };

    let created_raw: String = row
        .try_get("created_at")
        .map_err(|e| TierError::Corrupt(format!("created_at column: {e}")))?;
    let created_at = DateTime::parse_from_rfc3339(&created_raw)
        .map_err(|e| TierError::Corrupt(format!("created_at timestamp: {e}")))?
        .with_timezone(&Utc);

    Ok(Message {
        id: parse_uuid("id")?,
        thread_id: parse_uuid("thread_id")?,
        role: row
            .try_get("role")
            .map_err(|e| TierError::Corrupt(format!("role column: {e}")))?,
        content: row
            .try_get("content")
            .map_err(|e| TierError::Corrupt(format!("content column: {e}")))?,
        provider: row
            .try_get("provider")
            .map_err(|e| TierError::Corrupt(format!("provider column: {e}")))?,
        prompt_name: row
            .try_get("prompt_name")
            .map_err(|e| TierError::Corrupt(format!("prompt_name column: {e}")))?,
        prompt_version: row
            .try_get("prompt_version")
            .map_err(|e| TierError::Corrupt(format!("prompt_version column: {e}")))?,
        token_count: row
            .try_get("token_count")
            .map_err(|e| TierError::Corrupt(format!("token_count column: {e}")))?,
        cost_cents: row
            .try_get("cost_cents")
            .map_err(|e| TierError::Corrupt(format!("cost_cents column: {e}")))?,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn journal() -> ThreadJournal {
        ThreadJournal::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn session_thread_message_roundtrip() {
        let journal = journal().await;
        let session = journal.create_session(Some("user-1")).await.unwrap();
        assert_eq!(session.user_id.as_deref(), Some("user-1"));

        let thread = journal
            .create_thread(session.id, Some("first chat"))
            .await
            .unwrap();
        assert_eq!(thread.session_id, session.id);

        journal
            .add_message(thread.id, "user", "hello", MessageMeta::default())
            .await
            .unwrap();
        journal
            .add_message(
                thread.id,
                "assistant",
                "hi there",
                MessageMeta {
                    provider: Some("openai:gpt-4".into()),
                    prompt_name: Some("greeter".into()),
                    prompt_version: Some("v2".into()),
                    token_count: Some(12),
                    cost_cents: Some(1),
                },
            )
            .await
            .unwrap();

        let messages = journal.thread_messages(thread.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].provider.as_deref(), Some("openai:gpt-4"));
        assert_eq!(messages[1].prompt_version.as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn messages_come_back_in_insertion_order() {
        let journal = journal().await;
        let session = journal.create_session(None).await.unwrap();
        let thread = journal.create_thread(session.id, None).await.unwrap();

        for i in 0..5 {
            journal
                .add_message(thread.id, "user", &format!("msg-{i}"), MessageMeta::default())
                .await
                .unwrap();
        }

        let messages = journal.thread_messages(thread.id).await.unwrap();
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["msg-0", "msg-1", "msg-2", "msg-3", "msg-4"]);
    }

    #[tokio::test]
    async fn threads_are_isolated() {
        let journal = journal().await;
        let session = journal.create_session(None).await.unwrap();
        let thread_a = journal.create_thread(session.id, None).await.unwrap();
        let thread_b = journal.create_thread(session.id, None).await.unwrap();

        journal
            .add_message(thread_a.id, "user", "in a", MessageMeta::default())
            .await
            .unwrap();

        assert_eq!(journal.thread_messages(thread_a.id).await.unwrap().len(), 1);
        assert!(journal.thread_messages(thread_b.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_thread_has_no_messages() {
        let journal = journal().await;
        let session = journal.create_session(None).await.unwrap();
        let thread = journal.create_thread(session.id, None).await.unwrap();
        assert!(journal.thread_messages(thread.id).await.unwrap().is_empty());
    }
}
