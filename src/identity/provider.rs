use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use super::principal::{Identity, Provenance, Role};
use super::session::Session;
use crate::error::{AppError, AppResult};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\S+@\S+\.\S+").expect("email regex"));

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self { email: email.into(), password: password.into() }
    }

    /// Login form checks, run before a request is submitted.
    pub fn validate(&self) -> AppResult<()> {
        let email = self.email.trim();
        if email.is_empty() {
            return Err(AppError::user("email_required", "Email is required"));
        }
        if !EMAIL_RE.is_match(email) {
            return Err(AppError::user("email_invalid", "Email is invalid"));
        }
        if self.password.is_empty() {
            return Err(AppError::user("password_required", "Password is required"));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::user("password_too_short", "Password must be at least 6 characters"));
        }
        Ok(())
    }
}

pub type SessionListener = Arc<dyn Fn(Option<Session>) + Send + Sync>;

/// Handle for a change-event subscription. Released explicitly with
/// `unsubscribe` or implicitly on drop.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self { cancel: Some(Box::new(cancel)) }
    }

    pub fn unsubscribe(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    pub fn is_active(&self) -> bool { self.cancel.is_some() }
}

impl Drop for Subscription {
    fn drop(&mut self) { self.unsubscribe(); }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("active", &self.is_active()).finish()
    }
}

/// Remote authentication service: issues and revokes sessions and streams
/// session changes.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn fetch_current_session(&self) -> AppResult<Option<Session>>;

    fn subscribe(&self, listener: SessionListener) -> AppResult<Subscription>;

    /// Fails with `InvalidCredentials` when the store rejects the pair.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> AppResult<()>;

    async fn sign_out(&self) -> AppResult<()>;
}

/// Local sign-in path that bypasses the identity store.
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, req: &LoginRequest) -> Option<Identity>;
}

/// Never matches; every sign-in goes to the identity store.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFallback;

impl CredentialVerifier for NoFallback {
    fn verify(&self, _req: &LoginRequest) -> Option<Identity> { None }
}

pub const FALLBACK_ADMIN_ID: &str = "local-admin";

/// A single email/password pair that grants a local admin identity.
///
/// Security wart carried from the portal's demo admin account: anyone who
/// knows the pair is admin without the identity store ever seeing the
/// request. Disable it (`STUDYAID_FALLBACK=off`) for any real deployment.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FallbackCredentials {
    pub email: String,
    pub password: String,
}

impl FallbackCredentials {
    pub const RESERVED_EMAIL: &'static str = "admin@example.test";
    pub const RESERVED_PASSWORD: &'static str = "admin-fallback";

    pub fn reserved() -> Self {
        Self { email: Self::RESERVED_EMAIL.to_string(), password: Self::RESERVED_PASSWORD.to_string() }
    }
}

impl CredentialVerifier for FallbackCredentials {
    fn verify(&self, req: &LoginRequest) -> Option<Identity> {
        if req.email != self.email || req.password != self.password {
            return None;
        }
        Some(Identity {
            id: FALLBACK_ADMIN_ID.to_string(),
            email: self.email.clone(),
            role: Role::Admin,
            provenance: Provenance::LocalOverride,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn validate_login_form() {
        assert!(LoginRequest::new("amy@uni.test", "secret1").validate().is_ok());
        let e = LoginRequest::new("  ", "secret1").validate().unwrap_err();
        assert_eq!(e.code_str(), "email_required");
        let e = LoginRequest::new("amy-at-uni", "secret1").validate().unwrap_err();
        assert_eq!(e.code_str(), "email_invalid");
        let e = LoginRequest::new("amy@uni.test", "").validate().unwrap_err();
        assert_eq!(e.code_str(), "password_required");
        let e = LoginRequest::new("amy@uni.test", "12345").validate().unwrap_err();
        assert_eq!(e.code_str(), "password_too_short");
    }

    #[test]
    fn fallback_requires_exact_match() {
        let fb = FallbackCredentials::reserved();
        let id = fb.verify(&LoginRequest::new("admin@example.test", "admin-fallback")).unwrap();
        assert_eq!(id.role, Role::Admin);
        assert_eq!(id.provenance, Provenance::LocalOverride);
        assert!(fb.verify(&LoginRequest::new("Admin@example.test", "admin-fallback")).is_none());
        assert!(fb.verify(&LoginRequest::new("admin@example.test", "admin-fallback ")).is_none());
        assert!(NoFallback.verify(&LoginRequest::new("admin@example.test", "admin-fallback")).is_none());
    }

    #[test]
    fn subscription_cancels_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let mut sub = Subscription::new(move || { h.fetch_add(1, Ordering::SeqCst); });
        assert!(sub.is_active());
        sub.unsubscribe();
        sub.unsubscribe();
        assert!(!sub.is_active());
        drop(sub);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let h = hits.clone();
        let sub = Subscription::new(move || { h.fetch_add(1, Ordering::SeqCst); });
        drop(sub);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
