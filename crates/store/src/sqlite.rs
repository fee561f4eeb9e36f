//! SQLite durable tier.
//!
//! A single `prompt_versions` table holds every `(name, version)` row;
//! the unversioned alias is not a separate row — an unversioned read
//! resolves to the most recently written row for the name. `save_many`
//! upserts the whole set inside one transaction, so a bulk write commits
//! or rolls back as a unit.

use async_trait::async_trait;
use chrono::Utc;
use kiln_core::{DurableTier, PromptRecord, TierError};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, info};

/// A SQLite-backed durable prompt tier.
pub struct SqliteTier {
    pool: SqlitePool,
}

impl SqliteTier {
    /// Create a new SQLite tier from a connection string or file path.
    ///
    /// The database and schema are created automatically. Pass
    /// `"sqlite::memory:"` for an in-process ephemeral database (useful
    /// for tests).
    pub async fn new(url: &str) -> Result<Self, TierError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| TierError::Unreachable(format!("Invalid SQLite url: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // an in-memory database exists per connection, so the pool must
        // not grow past one
        let max_connections = if url.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| TierError::Unreachable(format!("Failed to open SQLite: {e}")))?;

        let tier = Self { pool };
        tier.run_migrations().await?;
        info!("SQLite prompt tier initialized at {url}");
        Ok(tier)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, TierError> {
        let tier = Self { pool };
        tier.run_migrations().await?;
        Ok(tier)
    }

    async fn run_migrations(&self) -> Result<(), TierError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS prompt_versions (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL,
                version     TEXT,
                system      TEXT NOT NULL,
                description TEXT,
                template    TEXT,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| TierError::Migration(format!("prompt_versions table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_prompt_versions_name ON prompt_versions(name)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| TierError::Migration(format!("name index: {e}")))?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_prompt_versions_name_version
             ON prompt_versions(name, ifnull(version, ''))",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| TierError::Migration(format!("name/version index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<PromptRecord, TierError> {
        Ok(PromptRecord {
            name: row
                .try_get("name")
                .map_err(|e| TierError::Corrupt(format!("name column: {e}")))?,
            version: row
                .try_get("version")
                .map_err(|e| TierError::Corrupt(format!("version column: {e}")))?,
            system: row
                .try_get("system")
                .map_err(|e| TierError::Corrupt(format!("system column: {e}")))?,
            description: row
                .try_get("description")
                .map_err(|e| TierError::Corrupt(format!("description column: {e}")))?,
            template: row
                .try_get("template")
                .map_err(|e| TierError::Corrupt(format!("template column: {e}")))?,
        })
    }

    /// Upsert a single record inside an open transaction.
    async fn upsert(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        record: &PromptRecord,
    ) -> Result<(), TierError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO prompt_versions (name, version, system, description, template, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (name, ifnull(version, '')) DO UPDATE SET
                system = excluded.system,
                description = excluded.description,
                template = excluded.template,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.name)
        .bind(&record.version)
        .bind(&record.system)
        .bind(&record.description)
        .bind(&record.template)
        .bind(&now)
        .bind(&now)
        .execute(&mut **tx)
        .await
        .map_err(|e| TierError::Storage(format!("upsert '{}': {e}", record.name)))?;
        Ok(())
    }
}

#[async_trait]
impl DurableTier for SqliteTier {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn list_names(&self) -> Result<Vec<String>, TierError> {
        let rows = sqlx::query("SELECT DISTINCT name FROM prompt_versions ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| TierError::Storage(format!("list names: {e}")))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("name")
                    .map_err(|e| TierError::Corrupt(format!("name column: {e}")))
            })
            .collect()
    }

    async fn get_record(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Result<Option<PromptRecord>, TierError> {
        let row = match version {
            Some(v) => {
                sqlx::query(
                    "SELECT name, version, system, description, template
                     FROM prompt_versions
                     WHERE name = ? AND version = ?
                     ORDER BY updated_at DESC, id DESC
                     LIMIT 1",
                )
                .bind(name)
                .bind(v)
                .fetch_optional(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT name, version, system, description, template
                     FROM prompt_versions
                     WHERE name = ?
                     ORDER BY updated_at DESC, id DESC
                     LIMIT 1",
                )
                .bind(name)
                .fetch_optional(&self.pool)
                .await
            }
        }
        .map_err(|e| TierError::Storage(format!("get '{name}': {e}")))?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn save_many(
        &self,
        records: &HashMap<String, PromptRecord>,
    ) -> Result<usize, TierError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| TierError::Storage(format!("begin transaction: {e}")))?;

        for record in records.values() {
            Self::upsert(&mut tx, record).await?;
        }

        tx.commit()
            .await
            .map_err(|e| TierError::Storage(format!("commit: {e}")))?;

        Ok(records.len())
    }

    async fn list_versions(&self, name: &str) -> Result<Vec<String>, TierError> {
        let rows = sqlx::query(
            "SELECT version FROM prompt_versions
             WHERE name = ? AND version IS NOT NULL
             ORDER BY version ASC",
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TierError::Storage(format!("list versions '{name}': {e}")))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("version")
                    .map_err(|e| TierError::Corrupt(format!("version column: {e}")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_tier() -> SqliteTier {
        SqliteTier::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn save_and_get_versioned() {
        let tier = test_tier().await;
        let mut records = HashMap::new();
        records.insert(
            "summarizer".to_string(),
            PromptRecord::new("summarizer", "You summarize.").with_version("v1"),
        );
        assert_eq!(tier.save_many(&records).await.unwrap(), 1);

        let found = tier
            .get_record("summarizer", Some("v1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.system, "You summarize.");
        assert!(tier.get_record("summarizer", Some("v9")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unversioned_read_resolves_to_most_recent_write() {
        let tier = test_tier().await;

        let mut first = HashMap::new();
        first.insert(
            "greeter".to_string(),
            PromptRecord::new("greeter", "v1 body").with_version("v1"),
        );
        tier.save_many(&first).await.unwrap();

        let mut second = HashMap::new();
        second.insert(
            "greeter".to_string(),
            PromptRecord::new("greeter", "v2 body").with_version("v2"),
        );
        tier.save_many(&second).await.unwrap();

        let alias = tier.get_record("greeter", None).await.unwrap().unwrap();
        assert_eq!(alias.version.as_deref(), Some("v2"));
        assert_eq!(alias.system, "v2 body");
    }

    #[tokio::test]
    async fn upsert_replaces_existing_version() {
        let tier = test_tier().await;

        for body in ["old body", "new body"] {
            let mut records = HashMap::new();
            records.insert(
                "greeter".to_string(),
                PromptRecord::new("greeter", body).with_version("v1"),
            );
            tier.save_many(&records).await.unwrap();
        }

        let found = tier.get_record("greeter", Some("v1")).await.unwrap().unwrap();
        assert_eq!(found.system, "new body");
        // replacement, not accumulation
        assert_eq!(tier.list_versions("greeter").await.unwrap(), vec!["v1"]);
    }

    #[tokio::test]
    async fn list_names_distinct_and_sorted() {
        let tier = test_tier().await;
        let mut records = HashMap::new();
        for name in ["zeta", "alpha"] {
            records.insert(name.to_string(), PromptRecord::new(name, "body"));
        }
        tier.save_many(&records).await.unwrap();

        let mut more = HashMap::new();
        more.insert(
            "alpha".to_string(),
            PromptRecord::new("alpha", "body").with_version("v2"),
        );
        tier.save_many(&more).await.unwrap();

        assert_eq!(tier.list_names().await.unwrap(), vec!["alpha", "zeta"]);
    }

    #[tokio::test]
    async fn list_versions_excludes_unversioned_rows() {
        let tier = test_tier().await;
        let mut records = HashMap::new();
        records.insert("greeter".to_string(), PromptRecord::new("greeter", "body"));
        tier.save_many(&records).await.unwrap();

        assert!(tier.list_versions("greeter").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_save_is_a_noop() {
        let tier = test_tier().await;
        assert_eq!(tier.save_many(&HashMap::new()).await.unwrap(), 0);
    }
}
