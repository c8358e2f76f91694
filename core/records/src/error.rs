//! Error type for record-store operations.

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not be reached or rejected the call.
    #[error("record store unavailable: {0}")]
    Unavailable(String),

    /// An insert collided with an existing record id.
    #[error("duplicate record id {id} in {collection}")]
    DuplicateId { collection: String, id: String },
}
