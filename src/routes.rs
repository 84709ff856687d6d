//! Screens of the portal and the access each one needs.

use crate::guard::{AccessGuard, Requirement, ScreenGuard};
use crate::identity::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    SignedIn,
    Role(Role),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub path: &'static str,
    pub name: &'static str,
    pub access: Access,
}

pub const ROUTES: &[Route] = &[
    Route { path: "/", name: "Home", access: Access::Public },
    Route { path: "/login", name: "Login", access: Access::Public },
    Route { path: "/register", name: "Register", access: Access::Public },
    Route { path: "/materials", name: "Materials", access: Access::Public },
    Route { path: "/materials/upload", name: "Upload Material", access: Access::SignedIn },
    Route { path: "/questions", name: "Questions", access: Access::Public },
    Route { path: "/questions/new", name: "Ask a Question", access: Access::SignedIn },
    Route { path: "/admin", name: "Admin Dashboard", access: Access::Role(Role::Admin) },
];

/// Exact match, ignoring a single trailing slash.
pub fn find(path: &str) -> Option<&'static Route> {
    let p = path.trim();
    let p = if p.len() > 1 { p.strip_suffix('/').unwrap_or(p) } else { p };
    ROUTES.iter().find(|r| r.path == p)
}

impl Route {
    pub fn requirement(&self) -> Option<Requirement> {
        match self.access {
            Access::Public => None,
            Access::SignedIn => Some(Requirement::signed_in()),
            Access::Role(role) => Some(Requirement::role(role)),
        }
    }

    /// Guard for this screen; `None` for public screens.
    pub fn guard(&self, guard: &AccessGuard) -> Option<ScreenGuard> {
        match self.access {
            Access::Public => None,
            Access::SignedIn => Some(guard.require_signed_in(None)),
            Access::Role(role) => Some(guard.require_role(role, None)),
        }
    }
}
