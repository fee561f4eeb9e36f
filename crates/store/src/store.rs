//! The tiered prompt store.
//!
//! Resolution order is fixed: hot cache → durable store → bulk source
//! (the in-process map, lazily materialized from the configured file).
//! Each tier answers with a three-valued result: `Ok(Some)` found,
//! `Ok(None)` definitive miss, `Err` unavailable. Unavailability causes
//! fallthrough and is never surfaced to the caller; only total exhaustion
//! yields `NotFound`.
//!
//! Writes touch the active tier only (cache if enabled, else durable,
//! else the in-process map); other tiers converge via backfill-on-read.

use crate::loader::load_records_from_file;
use crate::memory::MemoryStore;
use crate::version::resolve_latest;
use kiln_core::{CacheTier, DurableTier, LoadError, PromptRecord, StoreError, TierError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// The result of a successful `reload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadSummary {
    /// How many names were written
    pub count: usize,
    /// The file the records came from
    pub source_path: PathBuf,
}

/// A prompt store instance with an owning lifecycle.
///
/// Constructed once per process (or per test) and passed by reference;
/// there is no global state. The in-process map is always present and
/// doubles as the bulk-source materialization; cache and durable tiers
/// are optional and plug in behind their traits.
pub struct PromptStore {
    cache: Option<Arc<dyn CacheTier>>,
    durable: Option<Arc<dyn DurableTier>>,
    local: Arc<MemoryStore>,
    /// Last path a bulk load succeeded from
    source_path: RwLock<Option<PathBuf>>,
    /// Configured default bulk path
    default_path: Option<PathBuf>,
}

impl PromptStore {
    /// Create a bare store running on the in-process map alone.
    pub fn new() -> Self {
        Self {
            cache: None,
            durable: None,
            local: Arc::new(MemoryStore::new()),
            source_path: RwLock::new(None),
            default_path: None,
        }
    }

    /// Enable the hot cache tier.
    pub fn with_cache(mut self, cache: Arc<dyn CacheTier>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Enable the durable tier.
    pub fn with_durable(mut self, durable: Arc<dyn DurableTier>) -> Self {
        self.durable = Some(durable);
        self
    }

    /// Set the default bulk-source path.
    pub fn with_bulk_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.default_path = Some(path.into());
        self
    }

    /// Build a store from configuration: a process-local cache tier when
    /// the `[cache]` section is present, a SQL durable tier when
    /// `database_url` is set, and the configured bulk path. Finishes with
    /// a best-effort cache warm-up.
    pub async fn from_config(config: &kiln_config::AppConfig) -> Result<Self, StoreError> {
        let mut store = Self::new();

        if config.cache_enabled() {
            store = store.with_cache(Arc::new(MemoryStore::new()));
        }

        if let Some(url) = &config.database_url {
            match connect_durable(url).await {
                Ok(tier) => store = store.with_durable(tier),
                Err(e) => {
                    warn!(error = %e, "durable tier unavailable at startup, continuing without it");
                }
            }
        }

        if let Some(path) = &config.prompts_file {
            store = store.with_bulk_path(path);
        }

        store.warm_up().await;
        Ok(store)
    }

    /// Seed an enabled, empty hot cache from the bulk file, best-effort.
    pub async fn warm_up(&self) {
        let Some(cache) = &self.cache else { return };

        match cache.list_names().await {
            Ok(names) if !names.is_empty() => return,
            Ok(_) => {}
            Err(e) => {
                warn!(tier = cache.name(), error = %e, "cache unavailable during warm-up");
                return;
            }
        }

        let Some(path) = self.default_path.clone() else { return };
        match load_records_from_file(&path) {
            Ok(records) => {
                match cache.load_many(&records).await {
                    Ok(count) => {
                        *self.source_path.write().await = Some(path);
                        info!(count, "warmed cache from bulk file");
                    }
                    Err(e) => {
                        warn!(tier = cache.name(), error = %e, "cache warm-up write failed");
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "bulk file unreadable during warm-up");
            }
        }
    }

    /// Resolve a record by name and optional version label.
    ///
    /// `version = Some("latest")` resolves against the versions visible
    /// in whichever tier answers first with a non-empty set; if no tier
    /// has any, it degrades to the unversioned alias.
    pub async fn get(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Result<PromptRecord, StoreError> {
        let resolved = match version {
            Some("latest") => self.latest_label(name).await,
            Some(v) => Some(v.to_string()),
            None => None,
        };
        let wanted = resolved.as_deref();

        if let Some(cache) = &self.cache {
            match cache.get(name, wanted).await {
                Ok(Some(record)) => return Ok(record),
                Ok(None) => {}
                Err(e) => log_fallthrough(cache.name(), "get", &e),
            }
        }

        if let Some(durable) = &self.durable {
            match durable.get_record(name, wanted).await {
                Ok(Some(record)) => {
                    self.backfill_cache(&record).await;
                    return Ok(record);
                }
                Ok(None) => {}
                Err(e) => log_fallthrough(durable.name(), "get", &e),
            }
        }

        self.ensure_local_loaded().await;
        if let Ok(Some(record)) = self.local.get(name, wanted).await {
            self.backfill_durable(&record).await;
            self.backfill_cache(&record).await;
            return Ok(record);
        }

        Err(StoreError::NotFound {
            name: name.to_string(),
            version: version.map(|v| v.to_string()),
        })
    }

    /// All resolvable prompt names, sorted ascending.
    pub async fn names(&self) -> Vec<String> {
        if let Some(cache) = &self.cache {
            match cache.list_names().await {
                Ok(names) if !names.is_empty() => return names,
                Ok(_) => {}
                Err(e) => log_fallthrough(cache.name(), "names", &e),
            }
        }

        if let Some(durable) = &self.durable {
            match durable.list_names().await {
                Ok(names) if !names.is_empty() => return names,
                Ok(_) => {}
                Err(e) => log_fallthrough(durable.name(), "names", &e),
            }
        }

        self.ensure_local_loaded().await;
        let names = self.local.list_names().await.unwrap_or_default();
        if !names.is_empty() {
            self.warm_from_local().await;
        }
        names
    }

    /// All version labels known for a name: hot cache first, then the
    /// durable store, then the bulk record's own label.
    pub async fn versions(&self, name: &str) -> Vec<String> {
        if let Some(cache) = &self.cache {
            match cache.list_versions(name).await {
                Ok(versions) if !versions.is_empty() => return versions,
                Ok(_) => {}
                Err(e) => log_fallthrough(cache.name(), "versions", &e),
            }
        }

        if let Some(durable) = &self.durable {
            match durable.list_versions(name).await {
                Ok(versions) if !versions.is_empty() => return versions,
                Ok(_) => {}
                Err(e) => log_fallthrough(durable.name(), "versions", &e),
            }
        }

        self.ensure_local_loaded().await;
        if let Ok(versions) = self.local.list_versions(name).await {
            if !versions.is_empty() {
                return versions;
            }
        }
        // a bulk record carries at most its own single label
        if let Ok(Some(record)) = self.local.get(name, None).await {
            if let Some(v) = record.version {
                return vec![v];
            }
        }
        Vec::new()
    }

    /// Write a record to the active tier. On a write failure the next
    /// tier down becomes the target, mirroring read fallthrough.
    pub async fn set(&self, name: &str, record: &PromptRecord) -> Result<(), StoreError> {
        if let Some(cache) = &self.cache {
            match cache.set(name, record).await {
                Ok(()) => return Ok(()),
                Err(e) => log_fallthrough(cache.name(), "set", &e),
            }
        }

        if let Some(durable) = &self.durable {
            let mut single = HashMap::new();
            single.insert(name.to_string(), record.clone());
            match durable.save_many(&single).await {
                Ok(_) => return Ok(()),
                Err(e) => log_fallthrough(durable.name(), "set", &e),
            }
        }

        // the in-process map cannot fail
        let _ = self.local.set(name, record).await;
        Ok(())
    }

    /// Reload the bulk file and replace the active tier's record set.
    ///
    /// The file is taken from `path`, else the last successfully loaded
    /// path, else the configured default. A load failure leaves all store
    /// state exactly as it was.
    pub async fn reload(&self, path: Option<&Path>) -> Result<ReloadSummary, StoreError> {
        let file_path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let remembered = self.source_path.read().await.clone();
                remembered
                    .or_else(|| self.default_path.clone())
                    .ok_or(StoreError::Load(LoadError::NoPath))?
            }
        };

        let records = load_records_from_file(&file_path)?;

        if let Some(cache) = &self.cache {
            let replaced = async {
                cache.clear().await?;
                cache.load_many(&records).await
            }
            .await;
            match replaced {
                Ok(count) => {
                    *self.source_path.write().await = Some(file_path.clone());
                    info!(count, source = %file_path.display(), "reloaded prompts into cache");
                    return Ok(ReloadSummary {
                        count,
                        source_path: file_path,
                    });
                }
                Err(e) => log_fallthrough(cache.name(), "reload", &e),
            }
        }

        if let Some(durable) = &self.durable {
            match durable.save_many(&records).await {
                Ok(count) => {
                    *self.source_path.write().await = Some(file_path.clone());
                    info!(count, source = %file_path.display(), "reloaded prompts into durable store");
                    return Ok(ReloadSummary {
                        count,
                        source_path: file_path,
                    });
                }
                Err(e) => log_fallthrough(durable.name(), "reload", &e),
            }
        }

        let count = self.local.replace_all(records).await;
        *self.source_path.write().await = Some(file_path.clone());
        info!(count, source = %file_path.display(), "reloaded prompts into in-process store");
        Ok(ReloadSummary {
            count,
            source_path: file_path,
        })
    }

    /// The path of the last successful bulk load, if any.
    pub async fn source_path(&self) -> Option<PathBuf> {
        self.source_path.read().await.clone()
    }

    /// First non-empty version set across tiers, resolved to "latest".
    async fn latest_label(&self, name: &str) -> Option<String> {
        if let Some(cache) = &self.cache {
            match cache.list_versions(name).await {
                Ok(versions) if !versions.is_empty() => {
                    return resolve_latest(&versions).map(|s| s.to_string());
                }
                Ok(_) => {}
                Err(e) => log_fallthrough(cache.name(), "latest", &e),
            }
        }

        if let Some(durable) = &self.durable {
            match durable.list_versions(name).await {
                Ok(versions) if !versions.is_empty() => {
                    return resolve_latest(&versions).map(|s| s.to_string());
                }
                Ok(_) => {}
                Err(e) => log_fallthrough(durable.name(), "latest", &e),
            }
        }

        self.ensure_local_loaded().await;
        if let Ok(versions) = self.local.list_versions(name).await {
            if !versions.is_empty() {
                return resolve_latest(&versions).map(|s| s.to_string());
            }
        }
        None
    }

    /// Materialize the bulk file into the in-process map if it's still
    /// empty and a path is known.
    async fn ensure_local_loaded(&self) {
        if !self.local.is_empty().await {
            return;
        }
        let path = {
            let remembered = self.source_path.read().await.clone();
            remembered.or_else(|| self.default_path.clone())
        };
        let Some(path) = path else { return };

        match load_records_from_file(&path) {
            Ok(records) => {
                let count = self.local.replace_all(records).await;
                *self.source_path.write().await = Some(path);
                debug!(count, "materialized bulk file into in-process store");
            }
            Err(e) => debug!(error = %e, "bulk file unavailable"),
        }
    }

    /// Best-effort: push a record resolved from a lower tier into the
    /// cache. Failures never affect the caller's result.
    async fn backfill_cache(&self, record: &PromptRecord) {
        let Some(cache) = &self.cache else { return };
        match cache.set(&record.name, record).await {
            Ok(()) => debug!(name = %record.name, tier = cache.name(), "backfilled record"),
            Err(e) => {
                warn!(name = %record.name, tier = cache.name(), error = %e, "backfill failed")
            }
        }
    }

    /// Best-effort: push a bulk-sourced record into the durable store.
    async fn backfill_durable(&self, record: &PromptRecord) {
        let Some(durable) = &self.durable else { return };
        let mut single = HashMap::new();
        single.insert(record.name.clone(), record.clone());
        match durable.save_many(&single).await {
            Ok(_) => debug!(name = %record.name, tier = durable.name(), "backfilled record"),
            Err(e) => {
                warn!(name = %record.name, tier = durable.name(), error = %e, "backfill failed")
            }
        }
    }

    /// Best-effort: warm enabled higher tiers with the full local set
    /// after a bulk-sourced answer.
    async fn warm_from_local(&self) {
        let records = self.local.snapshot().await;
        if records.is_empty() {
            return;
        }
        if let Some(durable) = &self.durable {
            if let Err(e) = durable.save_many(&records).await {
                warn!(tier = durable.name(), error = %e, "warm-up write failed");
            }
        }
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.load_many(&records).await {
                warn!(tier = cache.name(), error = %e, "warm-up write failed");
            }
        }
    }
}

impl Default for PromptStore {
    fn default() -> Self {
        Self::new()
    }
}

fn log_fallthrough(tier: &str, op: &str, err: &TierError) {
    warn!(tier, op, error = %err, "tier unavailable, falling through");
}

/// Connect the configured durable backend by URL scheme.
async fn connect_durable(url: &str) -> Result<Arc<dyn DurableTier>, TierError> {
    #[cfg(feature = "sqlite")]
    if url.starts_with("sqlite") {
        return Ok(Arc::new(crate::sqlite::SqliteTier::new(url).await?));
    }

    #[cfg(feature = "postgres")]
    if url.starts_with("postgres") {
        return Ok(Arc::new(crate::postgres::PostgresTier::new(url).await?));
    }

    Err(TierError::Unreachable(format!(
        "no durable backend compiled for url: {url}"
    )))
}
