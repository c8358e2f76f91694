//! Deterministic interleaving support for concurrency tests.
//!
//! [`GatedStore`] wraps any [`RecordStore`] and parks selected calls until the
//! test releases them, so interleavings like "scan read before, write after"
//! can be forced without sleeps.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::{broadcast, watch};

use crate::error::StoreError;
use crate::filter::{Filter, Patch};
use crate::record::Record;
use crate::store::{ChangeEvent, RecordStore};

/// Opens a gate registered with one of the `hold_*` methods. Dropping the
/// release unparks waiters too, so a panicking test cannot deadlock others.
pub struct GateRelease {
    tx: watch::Sender<bool>,
}

impl GateRelease {
    pub fn release(self) {
        let _ = self.tx.send(true);
    }
}

pub struct GatedStore<S> {
    inner: S,
    gates: Mutex<HashMap<String, watch::Receiver<bool>>>,
}

impl<S> GatedStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Parks subsequent `get(collection, id)` calls until released.
    pub fn hold_get(&self, collection: &str, id: &str) -> GateRelease {
        self.hold(format!("get/{collection}/{id}"))
    }

    /// Parks subsequent `query(collection, ..)` calls until released.
    pub fn hold_query(&self, collection: &str) -> GateRelease {
        self.hold(format!("query/{collection}"))
    }

    /// Parks subsequent `update(collection, ..)` calls until released.
    pub fn hold_update(&self, collection: &str) -> GateRelease {
        self.hold(format!("update/{collection}"))
    }

    fn hold(&self, key: String) -> GateRelease {
        let (tx, rx) = watch::channel(false);
        self.gates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key, rx);
        GateRelease { tx }
    }

    async fn wait(&self, key: String) {
        let gate = self
            .gates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&key)
            .cloned();
        if let Some(mut rx) = gate {
            // A closed channel means the release was dropped; treat as open.
            let _ = rx.wait_for(|open| *open).await;
        }
    }
}

#[async_trait]
impl<S: RecordStore> RecordStore for GatedStore<S> {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Record>, StoreError> {
        self.wait(format!("get/{collection}/{id}")).await;
        self.inner.get(collection, id).await
    }

    async fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<Record>, StoreError> {
        self.wait(format!("query/{collection}")).await;
        self.inner.query(collection, filter).await
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Patch,
    ) -> Result<usize, StoreError> {
        self.wait(format!("update/{collection}")).await;
        self.inner.update(collection, filter, patch).await
    }

    async fn insert(&self, collection: &str, record: Record) -> Result<Record, StoreError> {
        self.inner.insert(collection, record).await
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.inner.changes()
    }
}
