//! In-process record store.
//!
//! Serves two roles: the materialization of the bulk source (the final
//! tier of every resolution), and the shipped `CacheTier` implementation
//! when the hot cache is enabled without a remote backend.
//!
//! All reads clone the record under a read guard, so a concurrent `set`
//! can never be observed half-applied. `replace_all` swaps the whole map
//! under one write-lock acquisition: a concurrent `get` sees either the
//! old full set or the new full set, never a mixture.

use async_trait::async_trait;
use kiln_core::{CacheTier, PromptRecord, TierError};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Per-name slot: the unversioned alias plus every versioned record.
#[derive(Debug, Clone, Default)]
struct NameEntry {
    alias: Option<PromptRecord>,
    versions: BTreeMap<String, PromptRecord>,
}

impl NameEntry {
    /// Insert a record; a versioned record also moves the alias to it.
    fn insert(&mut self, record: PromptRecord) {
        if let Some(version) = record.version.clone() {
            self.versions.insert(version, record.clone());
        }
        self.alias = Some(record);
    }
}

/// An in-process record store guarded by an `RwLock`.
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, NameEntry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Whether the store holds no records at all.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Replace the entire record set in one swap.
    ///
    /// The new map is built before the write lock is taken, so the lock
    /// is held only for the pointer swap.
    pub async fn replace_all(&self, records: HashMap<String, PromptRecord>) -> usize {
        let count = records.len();
        let mut fresh: HashMap<String, NameEntry> = HashMap::with_capacity(count);
        for (name, record) in records {
            fresh.entry(name).or_default().insert(record);
        }
        *self.entries.write().await = fresh;
        count
    }

    /// Snapshot the current alias record per name.
    pub async fn snapshot(&self) -> HashMap<String, PromptRecord> {
        self.entries
            .read()
            .await
            .iter()
            .filter_map(|(name, entry)| {
                entry.alias.clone().map(|rec| (name.clone(), rec))
            })
            .collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheTier for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_names(&self) -> Result<Vec<String>, TierError> {
        let entries = self.entries.read().await;
        let mut names: Vec<String> = entries.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn list_versions(&self, name: &str) -> Result<Vec<String>, TierError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(name)
            .map(|e| e.versions.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn get(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Result<Option<PromptRecord>, TierError> {
        let entries = self.entries.read().await;
        let entry = match entries.get(name) {
            Some(entry) => entry,
            None => return Ok(None),
        };
        let record = match version {
            Some(v) => entry.versions.get(v).cloned(),
            None => entry.alias.clone(),
        };
        Ok(record)
    }

    async fn set(&self, name: &str, record: &PromptRecord) -> Result<(), TierError> {
        let mut entries = self.entries.write().await;
        entries
            .entry(name.to_string())
            .or_default()
            .insert(record.clone());
        Ok(())
    }

    async fn load_many(
        &self,
        records: &HashMap<String, PromptRecord>,
    ) -> Result<usize, TierError> {
        let mut entries = self.entries.write().await;
        for (name, record) in records {
            entries
                .entry(name.clone())
                .or_default()
                .insert(record.clone());
        }
        Ok(records.len())
    }

    async fn clear(&self) -> Result<(), TierError> {
        self.entries.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, system: &str) -> PromptRecord {
        PromptRecord::new(name, system)
    }

    #[tokio::test]
    async fn set_and_get_alias() {
        let store = MemoryStore::new();
        store
            .set("greeter", &record("greeter", "Say hello."))
            .await
            .unwrap();

        let found = store.get("greeter", None).await.unwrap().unwrap();
        assert_eq!(found.system, "Say hello.");
        assert!(store.get("absent", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn versioned_set_updates_alias() {
        let store = MemoryStore::new();
        store
            .set("greeter", &record("greeter", "v1 body").with_version("v1"))
            .await
            .unwrap();
        store
            .set("greeter", &record("greeter", "v2 body").with_version("v2"))
            .await
            .unwrap();

        // both versions retrievable, alias follows the last write
        let v1 = store.get("greeter", Some("v1")).await.unwrap().unwrap();
        assert_eq!(v1.system, "v1 body");
        let alias = store.get("greeter", None).await.unwrap().unwrap();
        assert_eq!(alias.system, "v2 body");
        assert_eq!(
            store.list_versions("greeter").await.unwrap(),
            vec!["v1", "v2"]
        );
    }

    #[tokio::test]
    async fn names_are_sorted() {
        let store = MemoryStore::new();
        for name in ["zeta", "alpha", "mid"] {
            store.set(name, &record(name, "body")).await.unwrap();
        }
        assert_eq!(
            store.list_names().await.unwrap(),
            vec!["alpha", "mid", "zeta"]
        );
    }

    #[tokio::test]
    async fn replace_all_swaps_whole_set() {
        let store = MemoryStore::new();
        store.set("old", &record("old", "old body")).await.unwrap();

        let mut fresh = HashMap::new();
        fresh.insert(
            "new".to_string(),
            record("new", "new body").with_version("v1"),
        );
        let count = store.replace_all(fresh).await;

        assert_eq!(count, 1);
        assert!(store.get("old", None).await.unwrap().is_none());
        let new = store.get("new", None).await.unwrap().unwrap();
        assert_eq!(new.system, "new body");
        assert_eq!(store.list_versions("new").await.unwrap(), vec!["v1"]);
    }

    #[tokio::test]
    async fn clear_empties_store() {
        let store = MemoryStore::new();
        store.set("a", &record("a", "body")).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn concurrent_writers_never_tear_records() {
        // Each writer writes a record whose fields are all derived from
        // its own id; a torn read would mix fields from two writers.
        let store = Arc::new(MemoryStore::new());
        let mut tasks = Vec::new();

        for writer in 0..8u32 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                for round in 0..50u32 {
                    let tag = format!("w{writer}-r{round}");
                    let rec = PromptRecord::new("shared", format!("body-{tag}"))
                        .with_description(format!("desc-{tag}"));
                    store.set("shared", &rec).await.unwrap();
                }
            }));
        }

        let reader = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                for _ in 0..200 {
                    if let Some(rec) = store.get("shared", None).await.unwrap() {
                        let tag = rec.system.strip_prefix("body-").unwrap();
                        assert_eq!(rec.description.as_deref(), Some(&*format!("desc-{tag}")));
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        for task in tasks {
            task.await.unwrap();
        }
        reader.await.unwrap();
    }

    #[tokio::test]
    async fn reload_replacement_is_not_observable_partially() {
        // Readers must see either the full old set or the full new set.
        let store = Arc::new(MemoryStore::new());
        let mut old = HashMap::new();
        for i in 0..20 {
            let name = format!("old-{i}");
            old.insert(name.clone(), PromptRecord::new(&name, "old"));
        }
        store.replace_all(old).await;

        let swapper = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let mut new = HashMap::new();
                for i in 0..20 {
                    let name = format!("new-{i}");
                    new.insert(name.clone(), PromptRecord::new(&name, "new"));
                }
                store.replace_all(new).await;
            })
        };

        let reader = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                for _ in 0..100 {
                    let names = store.list_names().await.unwrap();
                    let old_count = names.iter().filter(|n| n.starts_with("old-")).count();
                    let new_count = names.iter().filter(|n| n.starts_with("new-")).count();
                    assert!(
                        (old_count == 20 && new_count == 0)
                            || (old_count == 0 && new_count == 20),
                        "observed a partially replaced store: {old_count} old, {new_count} new"
                    );
                    tokio::task::yield_now().await;
                }
            })
        };

        swapper.await.unwrap();
        reader.await.unwrap();
    }
}
