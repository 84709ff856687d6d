//! Identity model, external collaborators and the session reconciler.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod session;
mod provider;
mod override_store;
mod memory_store;
mod reconciler;

pub use principal::{Identity, Provenance, Role};
pub use session::{RemoteUser, Session};
pub use provider::{
    CredentialVerifier, FallbackCredentials, IdentityStore, LoginRequest, NoFallback, SessionListener, Subscription,
    FALLBACK_ADMIN_ID, MIN_PASSWORD_LEN,
};
pub use override_store::{FileOverrideStore, LocalOverrideStore, MemoryOverrideStore};
pub use memory_store::MemoryIdentityStore;
pub use reconciler::{AuthState, LoadingFlag, SessionReconciler};
