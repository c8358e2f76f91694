//! Session detection, identity sync, and the ephemeral-session rule.
//!
//! One [`SessionLifecycle`] instance owns the observable session snapshot.
//! Every path (startup check, auth events, sign-in, sign-out) funnels into
//! a single apply routine, so the resolver's dedup/staleness guard is the
//! only concurrency control; there is no second layer of ad hoc flags.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use veridoc_records::RecordStore;

use crate::auth::{AuthProvider, Session};
use crate::error::AuthError;
use crate::identity::ResolvedIdentity;
use crate::resolver::{IdentityResolver, Resolution};

/// The externally observed session state. `loading` is true from startup (or
/// a session change) until the first settle, whether success, failure, or
/// "no session"; it never hangs.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SessionSnapshot {
    pub session: Option<Session>,
    pub identity: ResolvedIdentity,
    pub loading: bool,
}

/// What the snapshot commit decided; drives the follow-up work outside the
/// watch closure.
enum Commit {
    /// Token unchanged; observers were not re-notified.
    Unchanged,
    /// Session replaced; identity fetch owed for this session.
    Replaced(Session),
    /// Transitioned to signed-out (or finished a no-session startup).
    Cleared,
}

pub struct SessionLifecycle {
    auth: Arc<dyn AuthProvider>,
    resolver: IdentityResolver,
    state: watch::Sender<SessionSnapshot>,
    /// Set when the current session opted out of persistence.
    ephemeral: AtomicBool,
}

impl SessionLifecycle {
    pub fn new(auth: Arc<dyn AuthProvider>, store: Arc<dyn RecordStore>) -> Arc<Self> {
        let (state, _) = watch::channel(SessionSnapshot {
            session: None,
            identity: ResolvedIdentity::default(),
            loading: true,
        });
        Arc::new(Self {
            auth,
            resolver: IdentityResolver::new(store),
            state,
            ephemeral: AtomicBool::new(false),
        })
    }

    /// Watch the observable snapshot.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    /// Runs the initial session check and starts the auth-event pump.
    ///
    /// The event subscription is taken before the check so no change can slip
    /// between them; if both deliver the same session, the token comparison
    /// and the resolver dedup collapse the duplicate. Abort the returned
    /// handle to tear the pump down.
    pub async fn start(self: Arc<Self>) -> JoinHandle<()> {
        let mut events = self.auth.session_events();

        match self.auth.current_session().await {
            Ok(session) => self.apply_session(session).await,
            Err(err) => {
                warn!(error = %err, "initial session check failed");
                self.state.send_if_modified(|snapshot| {
                    let was_loading = snapshot.loading;
                    snapshot.loading = false;
                    was_loading
                });
            }
        }

        let lifecycle = self;
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => lifecycle.apply_session(event.session).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "auth event feed lagged; re-checking session");
                        match lifecycle.auth.current_session().await {
                            Ok(session) => lifecycle.apply_session(session).await,
                            Err(err) => warn!(error = %err, "session re-check failed"),
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Signs in and records whether the session opted out of persistence.
    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
        remember: bool,
    ) -> Result<(), AuthError> {
        let session = self.auth.sign_in(email, password, remember).await?;
        self.ephemeral.store(!remember, Ordering::SeqCst);
        self.apply_session(Some(session)).await;
        Ok(())
    }

    /// Clears principal, session, and identity in one snapshot commit, then
    /// invalidates the token with the provider. Observers never see a
    /// half-cleared state.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.resolver.clear();
        self.state.send_modify(|snapshot| {
            snapshot.session = None;
            snapshot.identity = ResolvedIdentity::default();
            snapshot.loading = false;
        });
        self.ephemeral.store(false, Ordering::SeqCst);
        self.auth.sign_out().await
    }

    /// Host termination hook (tab-close equivalent). Erases the persisted
    /// token only when the current session opted out of persistence; an
    /// opted-in session's token survives restarts untouched.
    pub fn on_terminate(&self) -> Result<(), AuthError> {
        if self.ephemeral.load(Ordering::SeqCst) {
            self.auth.clear_persisted_session()?;
        }
        Ok(())
    }

    async fn apply_session(&self, next: Option<Session>) {
        if next.is_none() {
            // Signed out: stale in-flight fetches are invalidated in the same
            // turn the snapshot clears, not when they eventually settle.
            self.resolver.clear();
        }

        let mut commit = Commit::Unchanged;
        self.state.send_if_modified(|snapshot| {
            let same_token = match (&snapshot.session, &next) {
                (Some(current), Some(incoming)) => current.token == incoming.token,
                (None, None) => true,
                _ => false,
            };
            if same_token {
                // Identical token: leave the snapshot alone so observers are
                // not re-notified. A no-session startup still needs its
                // loading flag settled.
                if snapshot.session.is_none() && snapshot.loading {
                    snapshot.loading = false;
                    commit = Commit::Cleared;
                    return true;
                }
                return false;
            }

            match &next {
                Some(session) => {
                    snapshot.session = Some(session.clone());
                    snapshot.identity = ResolvedIdentity::default();
                    snapshot.loading = true;
                    commit = Commit::Replaced(session.clone());
                }
                None => {
                    snapshot.session = None;
                    snapshot.identity = ResolvedIdentity::default();
                    snapshot.loading = false;
                    commit = Commit::Cleared;
                }
            }
            true
        });

        let session = match commit {
            Commit::Replaced(session) => session,
            Commit::Unchanged | Commit::Cleared => return,
        };

        // Deferred one scheduling turn: callbacks observing the committed
        // session must be able to call the provider without re-entering the
        // lock it holds while dispatching the change we are reacting to.
        tokio::task::yield_now().await;

        match self.resolver.resolve(&session.principal_id).await {
            Ok(Resolution::Resolved(identity)) => {
                self.state.send_if_modified(|snapshot| {
                    if !is_current_principal(snapshot, &session.principal_id) {
                        return false;
                    }
                    snapshot.identity = identity;
                    snapshot.loading = false;
                    true
                });
            }
            Ok(Resolution::InFlight) => {
                debug!(principal_id = %session.principal_id, "identity fetch already in flight");
            }
            Ok(Resolution::Superseded) => {
                debug!(principal_id = %session.principal_id, "identity result superseded");
            }
            Err(err) => {
                // A failed profile fetch must not look like "signed out": the
                // principal stays, the identity stays empty.
                warn!(
                    error = %err,
                    principal_id = %session.principal_id,
                    "identity resolution failed; session continues without profile"
                );
                self.state.send_if_modified(|snapshot| {
                    if !is_current_principal(snapshot, &session.principal_id) || !snapshot.loading {
                        return false;
                    }
                    snapshot.loading = false;
                    true
                });
            }
        }
    }
}

/// Identity results attach to the principal, not the token: a token refresh
/// mid-fetch must not strand the snapshot in loading.
fn is_current_principal(snapshot: &SessionSnapshot, principal_id: &str) -> bool {
    snapshot
        .session
        .as_ref()
        .map(|session| session.principal_id.as_str())
        == Some(principal_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::task::yield_now;
    use veridoc_records::testing::GatedStore;
    use veridoc_records::{MemoryStore, Record};

    use crate::auth::AuthEvent;
    use crate::resolver::{PROFILES, ROLES};

    struct RegisteredUser {
        email: String,
        password: String,
        principal_id: String,
    }

    struct FakeAuth {
        current: Mutex<Option<Session>>,
        persisted_token: Mutex<Option<String>>,
        users: Mutex<Vec<RegisteredUser>>,
        events: broadcast::Sender<AuthEvent>,
        fail_session_check: AtomicBool,
    }

    impl FakeAuth {
        fn new() -> Arc<Self> {
            let (events, _) = broadcast::channel(16);
            Arc::new(Self {
                current: Mutex::new(None),
                persisted_token: Mutex::new(None),
                users: Mutex::new(Vec::new()),
                events,
                fail_session_check: AtomicBool::new(false),
            })
        }

        fn register(&self, email: &str, password: &str, principal_id: &str) {
            self.users.lock().expect("lock").push(RegisteredUser {
                email: email.to_string(),
                password: password.to_string(),
                principal_id: principal_id.to_string(),
            });
        }

        fn restore(&self, session: Session) {
            *self.persisted_token.lock().expect("lock") = Some(session.token.clone());
            *self.current.lock().expect("lock") = Some(session);
        }

        fn emit(&self, session: Option<Session>) {
            *self.current.lock().expect("lock") = session.clone();
            let _ = self.events.send(AuthEvent { session });
        }

        fn persisted(&self) -> Option<String> {
            self.persisted_token.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl AuthProvider for FakeAuth {
        async fn current_session(&self) -> Result<Option<Session>, AuthError> {
            if self.fail_session_check.load(Ordering::SeqCst) {
                return Err(AuthError::Provider("provider unreachable".to_string()));
            }
            Ok(self.current.lock().expect("lock").clone())
        }

        fn session_events(&self) -> broadcast::Receiver<AuthEvent> {
            self.events.subscribe()
        }

        async fn sign_in(
            &self,
            email: &str,
            password: &str,
            _remember: bool,
        ) -> Result<Session, AuthError> {
            let users = self.users.lock().expect("lock");
            let user = users
                .iter()
                .find(|user| user.email == email && user.password == password)
                .ok_or(AuthError::InvalidCredentials)?;
            let session = Session {
                token: format!("token-{}", user.principal_id),
                principal_id: user.principal_id.clone(),
            };
            drop(users);
            *self.persisted_token.lock().expect("lock") = Some(session.token.clone());
            *self.current.lock().expect("lock") = Some(session.clone());
            Ok(session)
        }

        async fn sign_out(&self) -> Result<(), AuthError> {
            *self.current.lock().expect("lock") = None;
            *self.persisted_token.lock().expect("lock") = None;
            let _ = self.events.send(AuthEvent { session: None });
            Ok(())
        }

        fn clear_persisted_session(&self) -> Result<(), AuthError> {
            *self.persisted_token.lock().expect("lock") = None;
            Ok(())
        }
    }

    fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.seed(
            PROFILES,
            vec![
                Record::new("u1").with("email", "one@veridoc.test"),
                Record::new("u2").with("email", "two@veridoc.test"),
            ],
        );
        store.seed(
            ROLES,
            vec![
                Record::new("u1").with("role", "staff"),
                Record::new("u2").with("role", "administrator"),
            ],
        );
        store
    }

    fn session_for(principal_id: &str) -> Session {
        Session {
            token: format!("token-{principal_id}"),
            principal_id: principal_id.to_string(),
        }
    }

    #[tokio::test]
    async fn startup_restores_session_and_resolves_identity_once() {
        let auth = FakeAuth::new();
        auth.restore(session_for("u1"));
        let store = Arc::new(seeded_store());
        let lifecycle =
            SessionLifecycle::new(auth.clone(), store.clone() as Arc<dyn RecordStore>);

        let pump = lifecycle.clone().start().await;

        let snapshot = lifecycle.snapshot();
        assert_eq!(
            snapshot.session.as_ref().map(|s| s.principal_id.as_str()),
            Some("u1")
        );
        assert_eq!(
            snapshot.identity.profile.as_ref().map(|p| p.email.as_str()),
            Some("one@veridoc.test")
        );
        assert!(!snapshot.loading);
        assert_eq!(store.reads_of(PROFILES, "u1"), 1);
        assert_eq!(store.reads_of(ROLES, "u1"), 1);
        pump.abort();
    }

    #[tokio::test]
    async fn duplicate_event_neither_refetches_nor_renotifies() {
        let auth = FakeAuth::new();
        auth.restore(session_for("u1"));
        let store = Arc::new(seeded_store());
        let lifecycle =
            SessionLifecycle::new(auth.clone(), store.clone() as Arc<dyn RecordStore>);
        lifecycle.clone().start().await.abort();

        let mut watcher = lifecycle.subscribe();
        watcher.mark_unchanged();

        lifecycle.apply_session(Some(session_for("u1"))).await;

        assert!(!watcher.has_changed().expect("watch open"));
        assert_eq!(store.reads_of(PROFILES, "u1"), 1);
    }

    #[tokio::test]
    async fn account_switch_applies_only_the_latest_identity() {
        let auth = FakeAuth::new();
        let store = Arc::new(GatedStore::new(seeded_store()));
        let lifecycle =
            SessionLifecycle::new(auth.clone(), store.clone() as Arc<dyn RecordStore>);

        // u1's profile fetch is parked; the switch to u2 lands meanwhile.
        let gate = store.hold_get(PROFILES, "u1");
        let stale = tokio::spawn({
            let lifecycle = lifecycle.clone();
            async move { lifecycle.apply_session(Some(session_for("u1"))).await }
        });
        yield_now().await;
        yield_now().await;

        lifecycle.apply_session(Some(session_for("u2"))).await;
        gate.release();
        stale.await.expect("join");

        let snapshot = lifecycle.snapshot();
        assert_eq!(
            snapshot.session.as_ref().map(|s| s.principal_id.as_str()),
            Some("u2")
        );
        assert_eq!(
            snapshot.identity.profile.as_ref().map(|p| p.id.as_str()),
            Some("u2")
        );
        assert!(!snapshot.loading);
    }

    #[tokio::test]
    async fn logout_mid_fetch_leaves_no_stale_identity() {
        let auth = FakeAuth::new();
        let store = Arc::new(GatedStore::new(seeded_store()));
        let lifecycle =
            SessionLifecycle::new(auth.clone(), store.clone() as Arc<dyn RecordStore>);

        let gate = store.hold_get(PROFILES, "u1");
        let stale = tokio::spawn({
            let lifecycle = lifecycle.clone();
            async move { lifecycle.apply_session(Some(session_for("u1"))).await }
        });
        yield_now().await;
        yield_now().await;

        lifecycle.apply_session(None).await;
        gate.release();
        stale.await.expect("join");

        let snapshot = lifecycle.snapshot();
        assert_eq!(snapshot.session, None);
        assert_eq!(snapshot.identity, ResolvedIdentity::default());
        assert!(!snapshot.loading);
    }

    #[tokio::test]
    async fn fetch_failure_keeps_principal_signed_in_without_profile() {
        let auth = FakeAuth::new();
        let store = Arc::new(seeded_store());
        store.fail_reads(PROFILES);
        let lifecycle =
            SessionLifecycle::new(auth.clone(), store.clone() as Arc<dyn RecordStore>);

        lifecycle.apply_session(Some(session_for("u1"))).await;

        let snapshot = lifecycle.snapshot();
        assert!(snapshot.session.is_some());
        assert_eq!(snapshot.identity, ResolvedIdentity::default());
        assert!(!snapshot.loading);
    }

    #[tokio::test]
    async fn startup_provider_failure_still_settles_loading() {
        let auth = FakeAuth::new();
        auth.fail_session_check.store(true, Ordering::SeqCst);
        let store = Arc::new(MemoryStore::new());
        let lifecycle = SessionLifecycle::new(auth.clone(), store as Arc<dyn RecordStore>);

        lifecycle.clone().start().await.abort();

        let snapshot = lifecycle.snapshot();
        assert_eq!(snapshot.session, None);
        assert!(!snapshot.loading);
    }

    #[tokio::test]
    async fn no_session_startup_clears_loading() {
        let auth = FakeAuth::new();
        let store = Arc::new(MemoryStore::new());
        let lifecycle = SessionLifecycle::new(auth.clone(), store as Arc<dyn RecordStore>);

        lifecycle.clone().start().await.abort();

        let snapshot = lifecycle.snapshot();
        assert_eq!(snapshot.session, None);
        assert!(!snapshot.loading);
    }

    #[tokio::test]
    async fn sign_out_clears_everything_in_one_commit() {
        let auth = FakeAuth::new();
        auth.restore(session_for("u1"));
        let store = Arc::new(seeded_store());
        let lifecycle =
            SessionLifecycle::new(auth.clone(), store.clone() as Arc<dyn RecordStore>);
        lifecycle.clone().start().await.abort();

        let mut watcher = lifecycle.subscribe();
        watcher.mark_unchanged();

        lifecycle.sign_out().await.expect("sign out");

        // Exactly one observable change, already fully cleared.
        assert!(watcher.has_changed().expect("watch open"));
        let observed = watcher.borrow_and_update().clone();
        assert_eq!(observed.session, None);
        assert_eq!(observed.identity, ResolvedIdentity::default());
        assert!(!observed.loading);
        assert_eq!(auth.current_session().await.expect("check"), None);
    }

    #[tokio::test]
    async fn ephemeral_session_token_is_erased_at_termination() {
        let auth = FakeAuth::new();
        auth.register("one@veridoc.test", "pw", "u1");
        let store = Arc::new(seeded_store());
        let lifecycle =
            SessionLifecycle::new(auth.clone(), store.clone() as Arc<dyn RecordStore>);

        lifecycle
            .sign_in("one@veridoc.test", "pw", false)
            .await
            .expect("sign in");
        assert!(auth.persisted().is_some());

        lifecycle.on_terminate().expect("terminate");
        assert_eq!(auth.persisted(), None);
    }

    #[tokio::test]
    async fn persistent_session_token_survives_termination() {
        let auth = FakeAuth::new();
        auth.register("one@veridoc.test", "pw", "u1");
        let store = Arc::new(seeded_store());
        let lifecycle =
            SessionLifecycle::new(auth.clone(), store.clone() as Arc<dyn RecordStore>);

        lifecycle
            .sign_in("one@veridoc.test", "pw", true)
            .await
            .expect("sign in");

        lifecycle.on_terminate().expect("terminate");
        assert_eq!(auth.persisted().as_deref(), Some("token-u1"));
    }

    #[tokio::test]
    async fn invalid_credentials_propagate_and_leave_state_untouched() {
        let auth = FakeAuth::new();
        let store = Arc::new(seeded_store());
        let lifecycle =
            SessionLifecycle::new(auth.clone(), store.clone() as Arc<dyn RecordStore>);

        let err = lifecycle
            .sign_in("nobody@veridoc.test", "pw", true)
            .await
            .expect_err("sign in fails");
        assert!(matches!(err, AuthError::InvalidCredentials));
        assert_eq!(lifecycle.snapshot().session, None);
    }

    #[tokio::test]
    async fn auth_event_pump_drives_session_changes() {
        let auth = FakeAuth::new();
        let store = Arc::new(seeded_store());
        let lifecycle =
            SessionLifecycle::new(auth.clone(), store.clone() as Arc<dyn RecordStore>);
        let pump = lifecycle.clone().start().await;

        auth.emit(Some(session_for("u2")));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let snapshot = lifecycle.snapshot();
        assert_eq!(
            snapshot.identity.profile.as_ref().map(|p| p.id.as_str()),
            Some("u2")
        );
        pump.abort();
    }
}
