//! Access guard: decides whether a protected screen may render for the
//! reconciler's current identity, and redirects when it may not.
//!
//! Every screen owns a [`ScreenGuard`]. It fires its notice/navigation side
//! effects at most once per distinct `(identity, loading)` pair, so a screen
//! that re-evaluates on every render never loops.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::identity::{AuthState, Identity, LoadingFlag, Role, SessionReconciler};

pub const LOGIN_ROUTE: &str = "/login";
pub const HOME_ROUTE: &str = "/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeVariant {
    Default,
    Destructive,
}

/// User-visible toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub description: String,
    pub variant: NoticeVariant,
}

impl Notice {
    pub fn new(title: &str, description: &str, variant: NoticeVariant) -> Self {
        Self { title: title.to_string(), description: description.to_string(), variant }
    }

    pub fn auth_required() -> Self {
        Self::new("Authentication required", "Please sign in to access this page", NoticeVariant::Destructive)
    }

    pub fn access_denied() -> Self {
        Self::new("Access denied", "You do not have permission to access this page", NoticeVariant::Destructive)
    }
}

pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Navigator that only remembers where it was sent.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    visits: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self { Self::default() }
    pub fn visits(&self) -> Vec<String> { self.visits.lock().clone() }
    pub fn last(&self) -> Option<String> { self.visits.lock().last().cloned() }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, path: &str) { self.visits.lock().push(path.to_string()); }
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self { Self::default() }
    pub fn notices(&self) -> Vec<Notice> { self.notices.lock().clone() }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) { self.notices.lock().push(notice); }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    SignedIn { redirect: String },
    Role { role: Role, redirect: String },
}

impl Requirement {
    pub fn signed_in() -> Self { Requirement::SignedIn { redirect: LOGIN_ROUTE.to_string() } }

    pub fn role(role: Role) -> Self { Requirement::Role { role, redirect: HOME_ROUTE.to_string() } }

    pub fn redirect_to(self, path: &str) -> Self {
        match self {
            Requirement::SignedIn { .. } => Requirement::SignedIn { redirect: path.to_string() },
            Requirement::Role { role, .. } => Requirement::Role { role, redirect: path.to_string() },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Pending,
    DeniedUnauthenticated,
    DeniedWrongRole,
    Allowed,
}

impl Decision {
    pub fn may_render(&self) -> bool { matches!(self, Decision::Allowed) }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardView {
    pub decision: Decision,
    pub identity: Option<Identity>,
    pub loading: bool,
    /// Identity present and, for a role requirement, holding that role.
    /// Computed even while loading.
    pub role_matched: bool,
}

pub fn decide(req: &Requirement, state: &AuthState) -> Decision {
    if state.loading == LoadingFlag::Unknown {
        return Decision::Pending;
    }
    let Some(identity) = state.identity.as_ref() else { return Decision::DeniedUnauthenticated; };
    match req {
        Requirement::SignedIn { .. } => Decision::Allowed,
        Requirement::Role { role, .. } if identity.has_role(*role) => Decision::Allowed,
        Requirement::Role { .. } => Decision::DeniedWrongRole,
    }
}

fn role_matched(req: &Requirement, identity: Option<&Identity>) -> bool {
    match (req, identity) {
        (_, None) => false,
        (Requirement::SignedIn { .. }, Some(_)) => true,
        (Requirement::Role { role, .. }, Some(id)) => id.has_role(*role),
    }
}

/// Hands out per-screen guards bound to one reconciler.
#[derive(Clone)]
pub struct AccessGuard {
    reconciler: Arc<SessionReconciler>,
    navigator: Arc<dyn Navigator>,
    notifier: Arc<dyn Notifier>,
    login_route: String,
    home_route: String,
}

impl AccessGuard {
    pub fn new(reconciler: Arc<SessionReconciler>, navigator: Arc<dyn Navigator>, notifier: Arc<dyn Notifier>) -> Self {
        Self { reconciler, navigator, notifier, login_route: LOGIN_ROUTE.to_string(), home_route: HOME_ROUTE.to_string() }
    }

    pub fn with_login_route(mut self, path: &str) -> Self {
        self.login_route = path.to_string();
        self
    }

    pub fn with_home_route(mut self, path: &str) -> Self {
        self.home_route = path.to_string();
        self
    }

    /// `redirect` defaults to the login route.
    pub fn require_signed_in(&self, redirect: Option<&str>) -> ScreenGuard {
        let redirect = redirect.unwrap_or(&self.login_route).to_string();
        self.guard(Requirement::SignedIn { redirect })
    }

    /// `redirect` (for the wrong-role case) defaults to home; signed-out users
    /// always go to the login route.
    pub fn require_role(&self, role: Role, redirect: Option<&str>) -> ScreenGuard {
        let redirect = redirect.unwrap_or(&self.home_route).to_string();
        self.guard(Requirement::Role { role, redirect })
    }

    pub fn guard(&self, requirement: Requirement) -> ScreenGuard {
        ScreenGuard {
            requirement,
            login_route: self.login_route.clone(),
            rx: self.reconciler.watch(),
            navigator: self.navigator.clone(),
            notifier: self.notifier.clone(),
            last: None,
            view: GuardView { decision: Decision::Pending, identity: None, loading: true, role_matched: false },
        }
    }
}

type EvalKey = (Option<Identity>, LoadingFlag);

pub struct ScreenGuard {
    requirement: Requirement,
    login_route: String,
    rx: watch::Receiver<AuthState>,
    navigator: Arc<dyn Navigator>,
    notifier: Arc<dyn Notifier>,
    last: Option<EvalKey>,
    view: GuardView,
}

impl ScreenGuard {
    /// Evaluate against the current state. Side effects fire only when the
    /// identity or loading flag differ from the previous evaluation.
    pub fn evaluate(&mut self) -> GuardView {
        let state = self.rx.borrow_and_update().clone();
        let key: EvalKey = (state.identity.clone(), state.loading);
        if self.last.as_ref() == Some(&key) {
            return self.view.clone();
        }
        self.last = Some(key);

        let decision = decide(&self.requirement, &state);
        match decision {
            Decision::DeniedUnauthenticated => {
                let target = match &self.requirement {
                    Requirement::SignedIn { redirect } => redirect.as_str(),
                    Requirement::Role { .. } => self.login_route.as_str(),
                };
                info!(target: "guard", redirect = target, "not signed in; redirecting");
                self.notifier.notify(Notice::auth_required());
                self.navigator.navigate(target);
            }
            Decision::DeniedWrongRole => {
                if let Requirement::Role { role, redirect } = &self.requirement {
                    info!(target: "guard", required = %role, redirect = redirect.as_str(), "wrong role; redirecting");
                    self.notifier.notify(Notice::access_denied());
                    self.navigator.navigate(redirect);
                }
            }
            Decision::Pending | Decision::Allowed => {
                debug!(target: "guard", ?decision, "evaluated");
            }
        }

        self.view = GuardView {
            decision,
            role_matched: role_matched(&self.requirement, state.identity.as_ref()),
            identity: state.identity,
            loading: state.loading == LoadingFlag::Unknown,
        };
        self.view.clone()
    }

    /// Wait until identity or loading changes, then re-evaluate. `None` once
    /// the reconciler is gone.
    pub async fn next_change(&mut self) -> Option<GuardView> {
        loop {
            self.rx.changed().await.ok()?;
            let moved = {
                let s = self.rx.borrow();
                self.last.as_ref().map(|(id, loading)| id != &s.identity || *loading != s.loading).unwrap_or(true)
            };
            if moved {
                return Some(self.evaluate());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Provenance;

    fn state(identity: Option<Role>, loading: LoadingFlag) -> AuthState {
        AuthState {
            identity: identity.map(|role| Identity { id: "u".into(), email: "u@uni.test".into(), role, provenance: Provenance::Remote }),
            session: None,
            loading,
        }
    }

    #[test]
    fn decide_state_machine() {
        let signed_in = Requirement::signed_in();
        let admin = Requirement::role(Role::Admin);
        for role in [None, Some(Role::Student), Some(Role::Admin)] {
            assert_eq!(decide(&signed_in, &state(role, LoadingFlag::Unknown)), Decision::Pending);
            assert_eq!(decide(&admin, &state(role, LoadingFlag::Unknown)), Decision::Pending);
        }
        assert_eq!(decide(&signed_in, &state(None, LoadingFlag::Ready)), Decision::DeniedUnauthenticated);
        assert_eq!(decide(&signed_in, &state(Some(Role::Student), LoadingFlag::Ready)), Decision::Allowed);
        assert_eq!(decide(&admin, &state(None, LoadingFlag::Ready)), Decision::DeniedUnauthenticated);
        assert_eq!(decide(&admin, &state(Some(Role::Student), LoadingFlag::Ready)), Decision::DeniedWrongRole);
        assert_eq!(decide(&admin, &state(Some(Role::Admin), LoadingFlag::Ready)), Decision::Allowed);
    }

    #[test]
    fn requirement_redirects() {
        assert_eq!(Requirement::signed_in(), Requirement::SignedIn { redirect: "/login".into() });
        assert_eq!(
            Requirement::role(Role::Admin).redirect_to("/materials"),
            Requirement::Role { role: Role::Admin, redirect: "/materials".into() }
        );
        assert!(Decision::Allowed.may_render());
        assert!(!Decision::Pending.may_render());
    }
}
