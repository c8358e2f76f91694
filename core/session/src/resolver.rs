//! Deduplicated, race-free identity resolution.
//!
//! The resolver issues the two reads behind a [`ResolvedIdentity`] (profile
//! and role, in parallel) and guards them with a generation counter:
//!
//! - a resolve call for a principal whose fetch is still running issues no
//!   reads and returns [`Resolution::InFlight`];
//! - a fetch that settles after a newer resolve or a [`clear`] has bumped the
//!   generation returns [`Resolution::Superseded`] and its result (or error)
//!   is dropped on the floor.
//!
//! A plain in-flight boolean would wedge on rapid account switches; the
//! generation keyed per principal does not. The resolver never writes the
//! observable session state itself; [`crate::SessionLifecycle`] applies
//! returned results.
//!
//! [`clear`]: IdentityResolver::clear

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use veridoc_records::{Record, RecordStore};

use crate::error::FetchError;
use crate::identity::{Profile, ResolvedIdentity, Role};

pub(crate) const PROFILES: &str = "profiles";
pub(crate) const ROLES: &str = "roles";

/// Outcome of one resolve call.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved(ResolvedIdentity),
    /// A fetch for this principal was already running; no reads were issued.
    InFlight,
    /// The fetch settled after a newer request took over; result discarded.
    Superseded,
}

#[derive(Default)]
struct ResolverState {
    /// Bumped on every issued fetch and on clear. A completion only counts
    /// if the generation it captured is still current.
    generation: u64,
    last_requested: Option<String>,
    /// Principal id -> generation of the fetch running for it.
    in_flight: HashMap<String, u64>,
}

pub struct IdentityResolver {
    store: Arc<dyn RecordStore>,
    state: Mutex<ResolverState>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            state: Mutex::new(ResolverState::default()),
        }
    }

    /// Resolves profile and role for a principal. See the module docs for the
    /// dedup and staleness rules.
    pub async fn resolve(&self, principal_id: &str) -> Result<Resolution, FetchError> {
        let generation = {
            let mut state = self.lock_state();
            if state.in_flight.get(principal_id) == Some(&state.generation) {
                return Ok(Resolution::InFlight);
            }
            state.generation += 1;
            state.last_requested = Some(principal_id.to_string());
            let generation = state.generation;
            state.in_flight.insert(principal_id.to_string(), generation);
            generation
        };

        let profile_read = async {
            self.store
                .get(PROFILES, principal_id)
                .await
                .map_err(|source| FetchError::Profile {
                    principal_id: principal_id.to_string(),
                    source,
                })
        };
        let role_read = async {
            self.store
                .get(ROLES, principal_id)
                .await
                .map_err(|source| FetchError::Role {
                    principal_id: principal_id.to_string(),
                    source,
                })
        };
        let outcome = tokio::try_join!(profile_read, role_read);

        {
            let mut state = self.lock_state();
            if state.in_flight.get(principal_id) == Some(&generation) {
                state.in_flight.remove(principal_id);
            }
            if state.generation != generation {
                debug!(principal_id, generation, "discarding superseded identity resolution");
                return Ok(Resolution::Superseded);
            }
        }

        let (profile_record, role_record) = outcome?;
        Ok(Resolution::Resolved(ResolvedIdentity {
            role: parse_role(principal_id, role_record.as_ref()),
            profile: parse_profile(principal_id, profile_record.as_ref()),
        }))
    }

    /// Forgets the last requested principal and invalidates every in-flight
    /// fetch. Synchronous: callers rely on stale results being unappliable
    /// the moment this returns.
    pub fn clear(&self) {
        let mut state = self.lock_state();
        state.generation += 1;
        state.last_requested = None;
        state.in_flight.clear();
    }

    /// Principal id of the most recent resolve, if it has not been cleared.
    pub fn last_requested(&self) -> Option<String> {
        self.lock_state().last_requested.clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, ResolverState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn parse_profile(principal_id: &str, record: Option<&Record>) -> Option<Profile> {
    let record = record?;
    let profile = Profile::from_record(record);
    if profile.is_none() {
        warn!(principal_id, "profile record missing email; treating profile as absent");
    }
    profile
}

fn parse_role(principal_id: &str, record: Option<&Record>) -> Option<Role> {
    let value = record?.str_field("role")?;
    let role = Role::parse(value);
    if role.is_none() {
        warn!(principal_id, role = value, "unknown role value; treating role as absent");
    }
    role
}
