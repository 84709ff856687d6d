//! Session reconciler: one authoritative identity from the local override slot
//! and the remote identity store.
//!
//! Ordering between the two sources is last-write-wins. The override record is
//! only consulted once, at start; any later remote session carrying a user
//! replaces it, and nothing re-applies the override afterwards.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::override_store::LocalOverrideStore;
use super::principal::Identity;
use super::provider::{CredentialVerifier, IdentityStore, LoginRequest, Subscription};
use super::session::Session;
use crate::error::AppResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LoadingFlag {
    #[default]
    Unknown,
    Ready,
}

/// Snapshot broadcast to every consumer of the reconciler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    pub identity: Option<Identity>,
    /// Latest session seen from the identity store, including "no session".
    pub session: Option<Session>,
    pub loading: LoadingFlag,
}

impl AuthState {
    pub fn is_loading(&self) -> bool { self.loading == LoadingFlag::Unknown }
}

type StateTx = Arc<watch::Sender<AuthState>>;

fn apply_remote(state: &watch::Sender<AuthState>, session: Option<Session>, source: &'static str) {
    let identity = session.as_ref().and_then(Session::identity);
    let changed = state.send_if_modified(move |s| {
        let mut changed = false;
        if let Some(id) = identity {
            if s.identity.as_ref() != Some(&id) {
                debug!(target: "auth", source, user = %id.id, role = %id.role, "remote identity published");
                s.identity = Some(id);
                changed = true;
            }
        }
        if s.session != session {
            s.session = session;
            changed = true;
        }
        if s.loading != LoadingFlag::Ready {
            s.loading = LoadingFlag::Ready;
            changed = true;
        }
        changed
    });
    crate::tprintln!("reconciler.apply_remote source={} changed={}", source, changed);
}

fn mark_ready(state: &watch::Sender<AuthState>) {
    state.send_if_modified(|s| {
        if s.loading == LoadingFlag::Ready { return false; }
        s.loading = LoadingFlag::Ready;
        true
    });
}

pub struct SessionReconciler {
    store: Arc<dyn IdentityStore>,
    overrides: Arc<dyn LocalOverrideStore>,
    verifier: Arc<dyn CredentialVerifier>,
    state: StateTx,
    subscription: Mutex<Option<Subscription>>,
    initial_fetch: Mutex<Option<JoinHandle<()>>>,
}

impl SessionReconciler {
    /// Read the override slot, subscribe to the store and kick off the initial
    /// session fetch. Must be called from within a tokio runtime.
    pub fn start(
        store: Arc<dyn IdentityStore>,
        overrides: Arc<dyn LocalOverrideStore>,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> Arc<Self> {
        let (tx, _rx) = watch::channel(AuthState::default());
        let state: StateTx = Arc::new(tx);

        match overrides.read() {
            Ok(Some(identity)) => {
                info!(target: "auth", user = %identity.id, "local override record found");
                state.send_modify(|s| {
                    s.identity = Some(identity);
                    s.loading = LoadingFlag::Ready;
                });
            }
            Ok(None) => {}
            Err(e) => warn!(target: "auth", error = %e, "local override record unreadable; ignoring"),
        }

        let listener_state = state.clone();
        let subscription = match store.subscribe(Arc::new(move |session| apply_remote(&listener_state, session, "change"))) {
            Ok(sub) => Some(sub),
            Err(e) => {
                warn!(target: "auth", error = %e, "session change subscription failed");
                mark_ready(&state);
                None
            }
        };

        let fetch_store = store.clone();
        let fetch_state = state.clone();
        let initial_fetch = tokio::spawn(async move {
            match fetch_store.fetch_current_session().await {
                Ok(session) => apply_remote(&fetch_state, session, "fetch"),
                Err(e) => {
                    warn!(target: "auth", error = %e, "initial session fetch failed");
                    mark_ready(&fetch_state);
                }
            }
        });

        Arc::new(Self {
            store,
            overrides,
            verifier,
            state,
            subscription: Mutex::new(subscription),
            initial_fetch: Mutex::new(Some(initial_fetch)),
        })
    }

    pub fn state(&self) -> AuthState { self.state.borrow().clone() }

    pub fn current_identity(&self) -> Option<Identity> { self.state.borrow().identity.clone() }

    pub fn session(&self) -> Option<Session> { self.state.borrow().session.clone() }

    pub fn is_loading(&self) -> bool { self.state.borrow().is_loading() }

    /// Receiver that observes every published change.
    pub fn watch(&self) -> watch::Receiver<AuthState> { self.state.subscribe() }

    /// Resolve once the loading flag is `Ready`.
    pub async fn wait_ready(&self) -> AuthState {
        let mut rx = self.watch();
        // bound first: the returned Ref borrows rx
        let ready = match rx.wait_for(|s| !s.is_loading()).await {
            Ok(s) => s.clone(),
            Err(_) => self.state(),
        };
        ready
    }

    /// Fallback credentials publish a local-override admin identity without
    /// touching the store. Anything else goes to the store; the resulting
    /// identity arrives through the change subscription.
    pub async fn sign_in(&self, email: &str, password: &str) -> AppResult<()> {
        let req = LoginRequest::new(email, password);
        if let Some(identity) = self.verifier.verify(&req) {
            if let Err(e) = self.overrides.write(&identity) {
                warn!(target: "auth", error = %e, "failed to persist local override record");
            }
            info!(target: "auth", user = %identity.id, "signed in via fallback credentials");
            self.state.send_if_modified(|s| {
                let changed = s.identity.as_ref() != Some(&identity) || s.loading != LoadingFlag::Ready;
                s.identity = Some(identity);
                s.loading = LoadingFlag::Ready;
                changed
            });
            return Ok(());
        }
        match self.store.sign_in_with_password(email, password).await {
            Ok(()) => {
                debug!(target: "auth", email, "remote sign-in accepted");
                Ok(())
            }
            Err(e) => {
                info!(target: "auth", email, code = e.code_str(), "remote sign-in rejected");
                Err(e)
            }
        }
    }

    /// Always ends signed out locally, whatever the store says.
    pub async fn sign_out(&self) {
        if let Err(e) = self.overrides.delete() {
            warn!(target: "auth", error = %e, "failed to delete local override record");
        }
        if let Err(e) = self.store.sign_out().await {
            warn!(target: "auth", error = %e, retryable = e.is_retryable(), "remote sign-out failed; clearing local identity anyway");
        }
        self.state.send_if_modified(|s| {
            let changed = s.identity.is_some() || s.session.is_some() || s.loading != LoadingFlag::Ready;
            s.identity = None;
            s.session = None;
            s.loading = LoadingFlag::Ready;
            changed
        });
        info!(target: "auth", "signed out");
    }

    /// Release the change subscription and stop a pending initial fetch.
    pub fn shutdown(&self) {
        if let Some(mut sub) = self.subscription.lock().take() {
            sub.unsubscribe();
            debug!(target: "auth", "session change subscription released");
        }
        if let Some(handle) = self.initial_fetch.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for SessionReconciler {
    fn drop(&mut self) { self.shutdown(); }
}
