//! Auth-provider seam.
//!
//! The hosted auth service is consumed through this trait: it owns tokens,
//! credential checks, and token persistence. The lifecycle only reads
//! sessions and reacts to the change feed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::AuthError;

/// An active session: opaque time-limited token plus the stable principal id
/// it authenticates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub principal_id: String,
}

/// One auth-state change: the session now in effect, or `None` on sign-out
/// and token expiry.
#[derive(Debug, Clone)]
pub struct AuthEvent {
    pub session: Option<Session>,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The session currently in effect, restored from persistence if any.
    async fn current_session(&self) -> Result<Option<Session>, AuthError>;

    /// Subscribes to auth-state changes.
    fn session_events(&self) -> broadcast::Receiver<AuthEvent>;

    /// Exchanges credentials for a session. The provider persists the token
    /// regardless of `remember`; opted-out sessions are erased by the
    /// lifecycle at termination instead.
    async fn sign_in(
        &self,
        email: &str,
        password: &str,
        remember: bool,
    ) -> Result<Session, AuthError>;

    /// Invalidates the current session token.
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Erases the persisted token without invalidating the live session.
    /// Used on termination for sessions that opted out of persistence.
    fn clear_persisted_session(&self) -> Result<(), AuthError>;
}
