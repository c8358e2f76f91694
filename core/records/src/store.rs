//! The async store trait every Veridoc service depends on.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::StoreError;
use crate::filter::{Filter, Patch};
use crate::record::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Inserted,
    Updated,
}

/// One entry on the store's change feed: the collection touched and the
/// record's state after the write.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub collection: String,
    pub kind: ChangeKind,
    pub record: Record,
}

/// Authenticated CRUD + query over named record collections.
///
/// Every call is an async suspension point. `update` is a conditional
/// multi-row write: the filter is evaluated against current state at write
/// time, which is what lets callers express "only rows still in state X"
/// without a read-modify-write race.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Record>, StoreError>;

    async fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<Record>, StoreError>;

    /// Applies the patch to every record the filter matches; returns the
    /// number of records actually modified.
    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Patch,
    ) -> Result<usize, StoreError>;

    async fn insert(&self, collection: &str, record: Record) -> Result<Record, StoreError>;

    /// Subscribes to the change feed. Lagging receivers drop events; callers
    /// that need a consistent view re-query.
    fn changes(&self) -> broadcast::Receiver<ChangeEvent>;
}
