use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::principal::{Identity, Provenance, Role};
use crate::error::{AppError, AppResult};

/// User record attached to a remote session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteUser {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub role: Role,
}

/// Credential issued by the identity store. Owned by the store; the
/// reconciler only keeps a read-only copy of the latest one it saw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub user: Option<RemoteUser>,
}

impl Session {
    pub fn issue(user: RemoteUser, ttl: Duration) -> AppResult<Self> {
        Ok(Self { access_token: gen_token()?, expires_at: Utc::now() + ttl, user: Some(user) })
    }

    /// Identity derived from the attached user, if there is one.
    pub fn identity(&self) -> Option<Identity> {
        self.user.as_ref().map(|u| Identity {
            id: u.id.clone(),
            email: u.email.clone(),
            role: u.role,
            provenance: Provenance::Remote,
        })
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool { self.expires_at <= now }
}

pub(crate) fn gen_token() -> AppResult<String> {
    token_from(getrandom::getrandom)
}

// 256-bit random token base64url without padding
fn token_from<F>(fill: F) -> AppResult<String>
where
    F: FnOnce(&mut [u8]) -> Result<(), getrandom::Error>,
{
    let mut buf = [0u8; 32];
    fill(&mut buf).map_err(|e| AppError::internal("token_entropy".to_string(), e.to_string()))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_from_session_is_remote() {
        let s = Session::issue(
            RemoteUser { id: "u-1".into(), email: "amy@uni.test".into(), role: Role::Student },
            Duration::hours(1),
        )
        .unwrap();
        let id = s.identity().unwrap();
        assert_eq!(id.provenance, Provenance::Remote);
        assert_eq!(id.email, "amy@uni.test");
        assert!(!s.is_expired_at(Utc::now()));
        assert!(s.is_expired_at(Utc::now() + Duration::hours(2)));
    }

    #[test]
    fn session_without_user_has_no_identity() {
        let s = Session { access_token: gen_token().unwrap(), expires_at: Utc::now(), user: None };
        assert!(s.identity().is_none());
    }

    #[test]
    fn tokens_are_unique_and_url_safe() {
        let a = gen_token().unwrap();
        let b = gen_token().unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn entropy_failure_is_an_error_not_a_zero_token() {
        let err = token_from(|_| Err(getrandom::Error::UNSUPPORTED)).unwrap_err();
        assert!(matches!(err, AppError::Internal { .. }));
        assert_eq!(err.code_str(), "token_entropy");

        let user = RemoteUser { id: "u-1".into(), email: "amy@uni.test".into(), role: Role::Student };
        let zeroes = token_from(|buf| { buf.fill(0); Ok(()) }).unwrap();
        assert_ne!(Session::issue(user, Duration::hours(1)).unwrap().access_token, zeroes);
    }
}
