//! In-process reference implementation of [`RecordStore`].
//!
//! A mutex-guarded collection map with the same write-time filter semantics a
//! hosted backend provides. The reclaimer binary runs against it via JSON
//! snapshots; tests seed it directly.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::StoreError;
use crate::filter::{Filter, Patch};
use crate::record::Record;
use crate::store::{ChangeEvent, ChangeKind, RecordStore};

const CHANGE_FEED_CAPACITY: usize = 64;

#[derive(Default)]
struct Stats {
    gets: BTreeMap<(String, String), u64>,
    queries: BTreeMap<String, u64>,
    updates: u64,
}

#[derive(Default)]
struct Faults {
    failing_reads: Vec<String>,
    fail_next_update: bool,
}

pub struct MemoryStore {
    collections: Mutex<BTreeMap<String, Vec<Record>>>,
    changes: broadcast::Sender<ChangeEvent>,
    stats: Mutex<Stats>,
    faults: Mutex<Faults>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            collections: Mutex::new(BTreeMap::new()),
            changes,
            stats: Mutex::new(Stats::default()),
            faults: Mutex::new(Faults::default()),
        }
    }

    /// Replaces the named collection's contents. Used to load snapshots and
    /// to seed tests; emits no change events.
    pub fn seed(&self, collection: impl Into<String>, records: Vec<Record>) {
        self.lock_collections().insert(collection.into(), records);
    }

    /// Full copy of every collection, for snapshot persistence.
    pub fn dump(&self) -> BTreeMap<String, Vec<Record>> {
        self.lock_collections().clone()
    }

    fn lock_collections(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<Record>>> {
        self.collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_stats(&self) -> std::sync::MutexGuard<'_, Stats> {
        self.stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_read_fault(&self, collection: &str) -> Result<(), StoreError> {
        if self
            .lock_faults()
            .failing_reads
            .iter()
            .any(|failing| failing == collection)
        {
            return Err(StoreError::Unavailable(format!(
                "injected read failure for {collection}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Record>, StoreError> {
        *self
            .lock_stats()
            .gets
            .entry((collection.to_string(), id.to_string()))
            .or_insert(0) += 1;
        self.check_read_fault(collection)?;
        let collections = self.lock_collections();
        Ok(collections
            .get(collection)
            .and_then(|records| records.iter().find(|record| record.id == id))
            .cloned())
    }

    async fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<Record>, StoreError> {
        *self
            .lock_stats()
            .queries
            .entry(collection.to_string())
            .or_insert(0) += 1;
        self.check_read_fault(collection)?;
        let collections = self.lock_collections();
        Ok(collections
            .get(collection)
            .map(|records| {
                records
                    .iter()
                    .filter(|record| filter.matches(record))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Patch,
    ) -> Result<usize, StoreError> {
        self.lock_stats().updates += 1;
        {
            let mut faults = self.lock_faults();
            if faults.fail_next_update {
                faults.fail_next_update = false;
                return Err(StoreError::Unavailable(
                    "injected update failure".to_string(),
                ));
            }
        }

        // Filter is re-evaluated here, under the lock: rows that changed
        // since a caller's earlier scan are silently skipped.
        let mut touched = Vec::new();
        {
            let mut collections = self.lock_collections();
            if let Some(records) = collections.get_mut(collection) {
                for record in records.iter_mut() {
                    if filter.matches(record) {
                        patch.apply(record);
                        touched.push(record.clone());
                    }
                }
            }
        }

        for record in &touched {
            let _ = self.changes.send(ChangeEvent {
                collection: collection.to_string(),
                kind: ChangeKind::Updated,
                record: record.clone(),
            });
        }
        Ok(touched.len())
    }

    async fn insert(&self, collection: &str, record: Record) -> Result<Record, StoreError> {
        {
            let mut collections = self.lock_collections();
            let records = collections.entry(collection.to_string()).or_default();
            if records.iter().any(|existing| existing.id == record.id) {
                return Err(StoreError::DuplicateId {
                    collection: collection.to_string(),
                    id: record.id,
                });
            }
            records.push(record.clone());
        }
        let _ = self.changes.send(ChangeEvent {
            collection: collection.to_string(),
            kind: ChangeKind::Inserted,
            record: record.clone(),
        });
        Ok(record)
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }
}

#[cfg(feature = "test-helpers")]
impl MemoryStore {
    /// Number of `get` calls issued for a specific record.
    pub fn reads_of(&self, collection: &str, id: &str) -> u64 {
        self.lock_stats()
            .gets
            .get(&(collection.to_string(), id.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Number of `query` calls issued against a collection.
    pub fn queries_of(&self, collection: &str) -> u64 {
        self.lock_stats()
            .queries
            .get(collection)
            .copied()
            .unwrap_or(0)
    }

    /// Number of `update` calls issued (including failed ones).
    pub fn update_calls(&self) -> u64 {
        self.lock_stats().updates
    }

    /// Makes every subsequent read of the collection fail until
    /// [`MemoryStore::restore_reads`] is called.
    pub fn fail_reads(&self, collection: impl Into<String>) {
        self.lock_faults().failing_reads.push(collection.into());
    }

    pub fn restore_reads(&self, collection: &str) {
        self.lock_faults()
            .failing_reads
            .retain(|failing| failing != collection);
    }

    /// Makes only the next `update` call fail.
    pub fn fail_next_update(&self) {
        self.lock_faults().fail_next_update = true;
    }
}
