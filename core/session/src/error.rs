//! Error types for session bootstrap.

use veridoc_records::StoreError;

/// A record-store read failed while resolving a principal's identity.
///
/// Partial results are never kept: if either read fails, the whole resolution
/// fails and the caller decides how to degrade (the lifecycle logs and leaves
/// the identity unresolved rather than blocking sign-in state).
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("profile read failed for {principal_id}: {source}")]
    Profile {
        principal_id: String,
        #[source]
        source: StoreError,
    },

    #[error("role read failed for {principal_id}: {source}")]
    Role {
        principal_id: String,
        #[source]
        source: StoreError,
    },
}

/// Auth-provider call failures. Propagated to the caller unchanged; there is
/// no local recovery for a failed sign-in or sign-out.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("auth provider error: {0}")]
    Provider(String),
}
