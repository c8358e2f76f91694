//! # veridoc-session
//!
//! Client-side session bootstrap for Veridoc: detects the current auth
//! session, resolves the signed-in principal's profile and role from the
//! record store, and exposes one observable snapshot consumers watch.
//!
//! Two guarantees drive the design:
//!
//! - **At most one fetch per principal**: concurrent resolution requests for
//!   the same principal never duplicate store reads ([`IdentityResolver`]).
//! - **Last requested wins**: a fetch that completes after a logout or an
//!   account switch is discarded, never written into the observable state.
//!
//! Construct a [`SessionLifecycle`] per app instance and inject it; there is
//! no global singleton, so tests build isolated instances freely.

pub mod auth;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod resolver;

pub use auth::{AuthEvent, AuthProvider, Session};
pub use error::{AuthError, FetchError};
pub use identity::{Profile, ResolvedIdentity, Role};
pub use lifecycle::{SessionLifecycle, SessionSnapshot};
pub use resolver::{IdentityResolver, Resolution};
