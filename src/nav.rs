//! Navigation bar state: primary links plus a login/logout action that
//! follows the reconciled identity.

use std::sync::Arc;

use crate::guard::{Navigator, Notice, NoticeVariant, Notifier};
use crate::identity::SessionReconciler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavLink {
    pub name: &'static str,
    pub path: &'static str,
}

pub const NAV_LINKS: [NavLink; 3] = [
    NavLink { name: "Home", path: "/" },
    NavLink { name: "Materials", path: "/materials" },
    NavLink { name: "Questions", path: "/questions" },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthAction {
    Login { path: String },
    Logout,
}

pub struct NavBar {
    reconciler: Arc<SessionReconciler>,
    navigator: Arc<dyn Navigator>,
    notifier: Arc<dyn Notifier>,
    login_route: String,
}

impl NavBar {
    pub fn new(
        reconciler: Arc<SessionReconciler>,
        navigator: Arc<dyn Navigator>,
        notifier: Arc<dyn Notifier>,
        login_route: &str,
    ) -> Self {
        Self { reconciler, navigator, notifier, login_route: login_route.to_string() }
    }

    pub fn links(&self) -> &'static [NavLink] { &NAV_LINKS }

    pub fn auth_action(&self) -> AuthAction {
        match self.reconciler.current_identity() {
            Some(_) => AuthAction::Logout,
            None => AuthAction::Login { path: self.login_route.clone() },
        }
    }

    /// Sign out, confirm with a toast and go to the login screen.
    pub async fn logout(&self) {
        self.reconciler.sign_out().await;
        self.notifier.notify(Notice::new("Success", "Logged out successfully", NoticeVariant::Default));
        self.navigator.navigate(&self.login_route);
    }
}
