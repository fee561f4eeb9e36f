//! Tiered prompt resolution and caching engine for kiln.
//!
//! Resolution order is fixed: hot cache, then durable store, then the
//! bulk file materialized in an in-process map. The first tier that
//! answers definitively wins; hits sourced from a lower tier backfill the
//! tiers above, best-effort.

pub mod compile;
pub mod loader;
pub mod memory;
pub mod store;
pub mod version;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use compile::compile;
pub use loader::load_records_from_file;
pub use memory::MemoryStore;
pub use store::{PromptStore, ReloadSummary};
pub use version::resolve_latest;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteTier;

#[cfg(feature = "postgres")]
pub use postgres::PostgresTier;
