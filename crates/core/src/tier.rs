//! Tier traits — the storage hierarchy the prompt store resolves through.
//!
//! Every operation returns `Result<_, TierError>` so that "the tier could
//! not answer" is distinguishable from "the tier has no such record":
//! `Ok(Some(_))` found, `Ok(None)` definitive miss, `Err(_)` unavailable.
//! The store consumes these three-valued results with an explicit ordered
//! fallthrough; tier errors never reach the store's callers.

use crate::error::TierError;
use crate::record::PromptRecord;
use async_trait::async_trait;
use std::collections::HashMap;

/// The hot cache tier — fast, possibly volatile.
///
/// Shipped implementation: the in-process `MemoryStore` in `kiln-store`.
/// A remote cache plugs in behind this trait and surfaces its outages as
/// `TierError::Unreachable` so the store downgrades to the next tier
/// instead of treating an outage as "no data".
#[async_trait]
pub trait CacheTier: Send + Sync {
    /// The tier name (e.g. "memory"), for logging.
    fn name(&self) -> &str;

    /// All names with at least one record, sorted ascending.
    async fn list_names(&self) -> std::result::Result<Vec<String>, TierError>;

    /// All version labels stored for a name, sorted ascending.
    async fn list_versions(&self, name: &str)
        -> std::result::Result<Vec<String>, TierError>;

    /// Look up a record. `version = None` reads the unversioned alias.
    async fn get(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> std::result::Result<Option<PromptRecord>, TierError>;

    /// Write a record. A versioned record must also move the name's
    /// unversioned alias to it, atomically within this tier.
    async fn set(&self, name: &str, record: &PromptRecord)
        -> std::result::Result<(), TierError>;

    /// Bulk-write a record set; returns how many names were written.
    async fn load_many(
        &self,
        records: &HashMap<String, PromptRecord>,
    ) -> std::result::Result<usize, TierError>;

    /// Drop every record in this tier.
    async fn clear(&self) -> std::result::Result<(), TierError>;
}

/// The durable tier — transactional persistent store of record.
///
/// Each logical operation commits or rolls back as a whole. Shipped
/// implementations: sqlx-backed SQLite and PostgreSQL tiers in
/// `kiln-store`.
#[async_trait]
pub trait DurableTier: Send + Sync {
    /// The tier name (e.g. "sqlite"), for logging.
    fn name(&self) -> &str;

    /// All distinct prompt names, sorted ascending.
    async fn list_names(&self) -> std::result::Result<Vec<String>, TierError>;

    /// Look up a record. `version = None` resolves to the most recently
    /// written row for the name.
    async fn get_record(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> std::result::Result<Option<PromptRecord>, TierError>;

    /// Upsert a record set in one transaction; returns how many names
    /// were written.
    async fn save_many(
        &self,
        records: &HashMap<String, PromptRecord>,
    ) -> std::result::Result<usize, TierError>;

    /// All version labels persisted for a name, sorted ascending.
    async fn list_versions(&self, name: &str)
        -> std::result::Result<Vec<String>, TierError>;
}
