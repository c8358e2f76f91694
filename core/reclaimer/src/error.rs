//! Error type for reclamation passes.
//!
//! Failures are surfaced to the invoking trigger, never swallowed: operators
//! alert on repeated failed runs. Retry policy belongs to the trigger.

use veridoc_records::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ReclamationError {
    #[error("failed to read {collection}: {source}")]
    Read {
        collection: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to release overdue work items: {0}")]
    Release(#[source] StoreError),
}
