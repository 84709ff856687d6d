use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use password_hash::{PasswordHash, SaltString};
use tracing::{debug, info};

use super::principal::Role;
use super::provider::{IdentityStore, SessionListener, Subscription};
use super::session::{RemoteUser, Session};
use crate::error::{AppError, AppResult};
use crate::tprintln;

fn hash_password(password: &str) -> AppResult<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| AppError::internal("salt".to_string(), e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| AppError::internal("salt".to_string(), e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::internal("hash".to_string(), e.to_string()))?
        .to_string();
    Ok(phc)
}

fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        let argon2 = Argon2::default();
        argon2.verify_password(password.as_bytes(), &parsed).is_ok()
    } else { false }
}

#[derive(Debug, Clone)]
struct Account {
    user: RemoteUser,
    password_hash: String,
}

type Listeners = Arc<RwLock<HashMap<u64, SessionListener>>>;

/// In-process identity store with simulated latency and failure injection.
pub struct MemoryIdentityStore {
    accounts: RwLock<HashMap<String, Account>>,
    current: Mutex<Option<Session>>,
    listeners: Listeners,
    next_listener: AtomicU64,
    latency: Mutex<Duration>,
    ttl: chrono::Duration,
    fail_fetch: AtomicBool,
    fail_subscribe: AtomicBool,
    fail_sign_out: AtomicBool,
    sign_in_calls: AtomicUsize,
    sign_out_calls: AtomicUsize,
}

impl Default for MemoryIdentityStore {
    fn default() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            current: Mutex::new(None),
            listeners: Arc::new(RwLock::new(HashMap::new())),
            next_listener: AtomicU64::new(1),
            latency: Mutex::new(Duration::ZERO),
            ttl: chrono::Duration::hours(1),
            fail_fetch: AtomicBool::new(false),
            fail_subscribe: AtomicBool::new(false),
            fail_sign_out: AtomicBool::new(false),
            sign_in_calls: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
        }
    }
}

impl MemoryIdentityStore {
    pub fn new() -> Self { Self::default() }

    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock() = latency;
        self
    }

    pub fn add_account(&self, email: &str, password: &str, role: Role) -> AppResult<RemoteUser> {
        let user = RemoteUser { id: uuid::Uuid::new_v4().to_string(), email: email.to_string(), role };
        let password_hash = hash_password(password)?;
        self.accounts
            .write()
            .insert(email.to_ascii_lowercase(), Account { user: user.clone(), password_hash });
        debug!(target: "identity_store", email, role = %role, "account added");
        Ok(user)
    }

    /// Make `session` current and push it to every listener.
    pub fn emit(&self, session: Option<Session>) {
        *self.current.lock() = session.clone();
        let listeners: Vec<SessionListener> = self.listeners.read().values().cloned().collect();
        tprintln!("identity_store.emit listeners={} has_session={}", listeners.len(), session.is_some());
        for l in listeners {
            l(session.clone());
        }
    }

    /// Issue a session for a known account without a password check.
    pub fn session_for(&self, email: &str) -> AppResult<Option<Session>> {
        let accounts = self.accounts.read();
        accounts.get(&email.to_ascii_lowercase()).map(|a| Session::issue(a.user.clone(), self.ttl)).transpose()
    }

    pub fn fail_fetch(&self, on: bool) { self.fail_fetch.store(on, Ordering::SeqCst); }
    pub fn fail_subscribe(&self, on: bool) { self.fail_subscribe.store(on, Ordering::SeqCst); }
    pub fn fail_sign_out(&self, on: bool) { self.fail_sign_out.store(on, Ordering::SeqCst); }

    pub fn listener_count(&self) -> usize { self.listeners.read().len() }
    pub fn sign_in_calls(&self) -> usize { self.sign_in_calls.load(Ordering::SeqCst) }
    pub fn sign_out_calls(&self) -> usize { self.sign_out_calls.load(Ordering::SeqCst) }

    async fn simulate_latency(&self) {
        let d = *self.latency.lock();
        if !d.is_zero() {
            tokio::time::sleep(d).await;
        }
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn fetch_current_session(&self) -> AppResult<Option<Session>> {
        self.simulate_latency().await;
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(AppError::remote("remote_unavailable", "session fetch failed"));
        }
        let current = self.current.lock().clone();
        Ok(current.filter(|s| !s.is_expired_at(Utc::now())))
    }

    fn subscribe(&self, listener: SessionListener) -> AppResult<Subscription> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(AppError::remote("remote_unavailable", "subscribe failed"));
        }
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);
        self.listeners.write().insert(id, listener);
        let listeners = self.listeners.clone();
        Ok(Subscription::new(move || {
            listeners.write().remove(&id);
        }))
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> AppResult<()> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        let account = self.accounts.read().get(&email.to_ascii_lowercase()).cloned();
        let Some(account) = account else {
            return Err(AppError::invalid_credentials("invalid_credentials", "Invalid login credentials"));
        };
        if !verify_password(&account.password_hash, password) {
            return Err(AppError::invalid_credentials("invalid_credentials", "Invalid login credentials"));
        }
        let session = Session::issue(account.user.clone(), self.ttl)?;
        info!(target: "identity_store", user = %account.user.id, "signed in");
        self.emit(Some(session));
        Ok(())
    }

    async fn sign_out(&self) -> AppResult<()> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(AppError::remote("remote_unavailable", "sign out failed"));
        }
        self.emit(None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sign_in_checks_password_and_notifies() {
        let store = MemoryIdentityStore::new();
        store.add_account("amy@uni.test", "secret1", Role::Student).unwrap();
        let seen: Arc<Mutex<Vec<Option<Session>>>> = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let sub = store.subscribe(Arc::new(move |sess| s.lock().push(sess))).unwrap();

        let err = store.sign_in_with_password("amy@uni.test", "wrong-pass").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials { .. }));
        let err = store.sign_in_with_password("nobody@uni.test", "secret1").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials { .. }));
        assert!(seen.lock().is_empty());

        store.sign_in_with_password("AMY@uni.test", "secret1").await.unwrap();
        let fetched = store.fetch_current_session().await.unwrap().unwrap();
        assert_eq!(fetched.user.as_ref().unwrap().email, "amy@uni.test");
        assert_eq!(seen.lock().len(), 1);

        store.sign_out().await.unwrap();
        assert_eq!(seen.lock().last().cloned(), Some(None));
        assert!(store.fetch_current_session().await.unwrap().is_none());
        assert_eq!(store.sign_in_calls(), 3);
        drop(sub);
    }

    #[tokio::test]
    async fn dropping_subscription_removes_listener() {
        let store = MemoryIdentityStore::new();
        let sub = store.subscribe(Arc::new(|_: Option<Session>| {})).unwrap();
        assert_eq!(store.listener_count(), 1);
        drop(sub);
        assert_eq!(store.listener_count(), 0);
    }

    #[tokio::test]
    async fn injected_failures() {
        let store = MemoryIdentityStore::new();
        store.fail_fetch(true);
        store.fail_subscribe(true);
        store.fail_sign_out(true);
        assert!(store.fetch_current_session().await.unwrap_err().is_retryable());
        assert!(store.subscribe(Arc::new(|_: Option<Session>| {})).is_err());
        assert!(store.sign_out().await.is_err());
        assert_eq!(store.sign_out_calls(), 1);
    }
}
