//! # veridoc-reclaimer
//!
//! Returns overdue claimed documents to the unclaimed pool. A staff member
//! who claims a document and disappears holds it only until the SLA for that
//! claimant expires; each externally triggered pass scans claimed work items,
//! judges them against per-actor limits, and releases the overdue set in one
//! conditional bulk write, so a concurrent completion is never clobbered.

pub mod error;
pub mod model;
pub mod policy;
pub mod scheduler;
pub mod snapshot;

pub use error::ReclamationError;
pub use model::{ClaimedItem, WorkItemStatus, TIMEOUT_POLICIES, WORK_ITEMS};
pub use policy::{is_overdue, PolicyTable, FALLBACK_LIMIT_MINUTES};
pub use scheduler::{ReclamationReport, ReclamationScheduler};
