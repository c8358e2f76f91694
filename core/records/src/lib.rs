//! Record-store seam shared by the Veridoc client core and edge jobs.
//!
//! The hosted backend is modelled as named collections of flat JSON records
//! with equality/set-membership filtering, conditional multi-row updates, and
//! a change feed. Services depend on the [`RecordStore`] trait only;
//! [`MemoryStore`] is the in-process reference implementation used by the
//! reclaimer binary and by tests.

pub mod error;
pub mod filter;
pub mod memory;
pub mod record;
pub mod store;

#[cfg(feature = "test-helpers")]
pub mod testing;

pub use error::StoreError;
pub use filter::{Filter, Patch, Predicate};
pub use memory::MemoryStore;
pub use record::Record;
pub use store::{ChangeEvent, ChangeKind, RecordStore};
