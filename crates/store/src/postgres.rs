//! PostgreSQL durable tier.
//!
//! Same contract as the SQLite tier: one `prompt_versions` table, upsert
//! on `(name, version)`, unversioned reads resolve to the most recently
//! written row, `save_many` commits as a single transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kiln_core::{DurableTier, PromptRecord, TierError};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::collections::HashMap;
use tracing::{debug, info};

/// A PostgreSQL-backed durable prompt tier.
pub struct PostgresTier {
    pool: PgPool,
}

impl PostgresTier {
    /// Connect and create the schema if missing.
    pub async fn new(url: &str) -> Result<Self, TierError> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(url)
            .await
            .map_err(|e| TierError::Unreachable(format!("Failed to connect to Postgres: {e}")))?;

        let tier = Self { pool };
        tier.run_migrations().await?;
        info!("Postgres prompt tier initialized");
        Ok(tier)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: PgPool) -> Result<Self, TierError> {
        let tier = Self { pool };
        tier.run_migrations().await?;
        Ok(tier)
    }

    async fn run_migrations(&self) -> Result<(), TierError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS prompt_versions (
                id          BIGSERIAL PRIMARY KEY,
                name        TEXT NOT NULL,
                version     TEXT,
                system      TEXT NOT NULL,
                description TEXT,
                template    TEXT,
                created_at  TIMESTAMPTZ NOT NULL,
                updated_at  TIMESTAMPTZ NOT NULL
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
             ON prompt_versions (name, COALESCE(version, ''))",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| TierError::Migration(format!("name/version index: {e}")))?;

        debug!("Postgres migrations complete");
        Ok(())
    }

    fn row_to_record(row: &PgRow) -> Result<PromptRecord, TierError> {
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

    async fn upsert(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        record: &PromptRecord,
        now: DateTime<Utc>,
    ) -> Result<(), TierError> {
        sqlx::query(
            r#"
            INSERT INTO prompt_versions (name, version, system, description, template, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            ON CONFLICT (name, COALESCE(version, '')) DO UPDATE SET
                system = EXCLUDED.system,
                description = EXCLUDED.description,
                template = EXCLUDED.template,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&record.name)
        .bind(&record.version)
        .bind(&record.system)
        .bind(&record.description)
        .bind(&record.template)
        .bind(now)
        .execute(&mut **tx)
        .await
        .map_err(|e| TierError::Storage(format!("upsert '{}': {e}", record.name)))?;
        Ok(())
    }
}

#[async_trait]
impl DurableTier for PostgresTier {
    fn name(&self) -> &str {
        "postgres"
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
                     WHERE name = $1 AND version = $2
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
                     WHERE name = $1
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

        let now = Utc::now();
        for record in records.values() {
            Self::upsert(&mut tx, record, now).await?;
        }

        tx.commit()
            .await
            .map_err(|e| TierError::Storage(format!("commit: {e}")))?;

        Ok(records.len())
    }

    async fn list_versions(&self, name: &str) -> Result<Vec<String>, TierError> {
        let rows = sqlx::query(
            "SELECT version FROM prompt_versions
             WHERE name = $1 AND version IS NOT NULL
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
