use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::guard::{HOME_ROUTE, LOGIN_ROUTE};
use crate::identity::{CredentialVerifier, FallbackCredentials, NoFallback};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Directory holding the local override slot.
    pub override_dir: PathBuf,
    pub override_key: String,
    pub login_route: String,
    pub home_route: String,
    pub fallback: Option<FallbackCredentials>,
    /// Simulated round-trip for the bundled in-memory identity store.
    pub remote_latency_ms: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            override_dir: PathBuf::from(".studyaid"),
            override_key: "user".to_string(),
            login_route: LOGIN_ROUTE.to_string(),
            home_route: HOME_ROUTE.to_string(),
            fallback: Some(FallbackCredentials::reserved()),
            remote_latency_ms: 0,
        }
    }
}

impl AuthConfig {
    pub fn from_json_str(raw: &str) -> AppResult<Self> {
        serde_json::from_str(raw).map_err(|e| AppError::user("config_invalid".to_string(), e.to_string()))
    }

    /// JSON file named by `STUDYAID_CONFIG` (or defaults), then `STUDYAID_*`
    /// environment variables on top.
    pub fn load() -> AppResult<Self> {
        Self::load_with(|k| std::env::var(k).ok())
    }

    pub fn load_with<F: Fn(&str) -> Option<String>>(get: F) -> AppResult<Self> {
        let base = match get("STUDYAID_CONFIG") {
            Some(path) => {
                let raw = std::fs::read_to_string(&path)
                    .map_err(|e| AppError::user("config_unreadable".to_string(), format!("{}: {}", path, e)))?;
                info!(target: "startup", path = %path, "loaded config file");
                Self::from_json_str(&raw)?
            }
            None => Self::default(),
        };
        Ok(base.overlay(get))
    }

    /// `STUDYAID_*` variables on top of whatever the file (or defaults) set.
    fn overlay<F: Fn(&str) -> Option<String>>(mut self, get: F) -> Self {
        if let Some(v) = get("STUDYAID_OVERRIDE_DIR") { self.override_dir = PathBuf::from(v); }
        if let Some(v) = get("STUDYAID_OVERRIDE_KEY") { self.override_key = v; }
        if let Some(v) = get("STUDYAID_LOGIN_ROUTE") { self.login_route = v; }
        if let Some(v) = get("STUDYAID_HOME_ROUTE") { self.home_route = v; }

        let fallback_off = get("STUDYAID_FALLBACK")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "off" | "false" | "0" | "no"))
            .unwrap_or(false);
        let email = get("STUDYAID_FALLBACK_EMAIL");
        let password = get("STUDYAID_FALLBACK_PASSWORD");
        if fallback_off {
            self.fallback = None;
        } else if email.is_some() || password.is_some() {
            // explicit credentials switch the fallback back on
            let mut fb = self.fallback.take().unwrap_or_else(FallbackCredentials::reserved);
            if let Some(v) = email { fb.email = v; }
            if let Some(v) = password { fb.password = v; }
            self.fallback = Some(fb);
        }

        if let Some(v) = get("STUDYAID_REMOTE_LATENCY_MS") {
            match v.trim().parse::<u64>() {
                Ok(ms) => self.remote_latency_ms = ms,
                Err(_) => warn!(target: "startup", value = %v, "STUDYAID_REMOTE_LATENCY_MS is not a number; using default"),
            }
        }
        self
    }

    pub fn verifier(&self) -> Arc<dyn CredentialVerifier> {
        match &self.fallback {
            Some(fb) => Arc::new(fb.clone()),
            None => Arc::new(NoFallback),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let m: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k: &str| m.get(k).cloned()
    }

    #[test]
    fn defaults_keep_reserved_fallback() {
        let cfg = AuthConfig::load_with(lookup(&[])).unwrap();
        assert_eq!(cfg, AuthConfig::default());
        assert_eq!(cfg.fallback, Some(FallbackCredentials::reserved()));
        assert_eq!(cfg.login_route, "/login");
    }

    #[test]
    fn env_overrides() {
        let cfg = AuthConfig::load_with(lookup(&[
            ("STUDYAID_OVERRIDE_DIR", "/tmp/sa"),
            ("STUDYAID_FALLBACK_PASSWORD", "rotated-secret"),
            ("STUDYAID_REMOTE_LATENCY_MS", "50"),
        ])).unwrap();
        assert_eq!(cfg.override_dir, PathBuf::from("/tmp/sa"));
        assert_eq!(cfg.fallback.as_ref().unwrap().password, "rotated-secret");
        assert_eq!(cfg.fallback.as_ref().unwrap().email, FallbackCredentials::RESERVED_EMAIL);
        assert_eq!(cfg.remote_latency_ms, 50);
    }

    #[test]
    fn fallback_can_be_disabled_and_bad_numbers_ignored() {
        let cfg = AuthConfig::load_with(lookup(&[("STUDYAID_FALLBACK", "OFF"), ("STUDYAID_REMOTE_LATENCY_MS", "soon")])).unwrap();
        assert!(cfg.fallback.is_none());
        assert_eq!(cfg.remote_latency_ms, 0);
    }

    #[test]
    fn json_config_fills_missing_fields() {
        let cfg = AuthConfig::from_json_str(r#"{"override_key":"demo","fallback":null}"#).unwrap();
        assert_eq!(cfg.override_key, "demo");
        assert!(cfg.fallback.is_none());
        assert_eq!(cfg.home_route, "/");
    }

    #[test]
    fn config_file_then_env_overlay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("studyaid.json");
        std::fs::write(&path, r#"{"home_route":"/dashboard","fallback":null,"remote_latency_ms":5}"#).unwrap();
        let path = path.to_string_lossy().to_string();

        let cfg = AuthConfig::load_with(lookup(&[("STUDYAID_CONFIG", path.as_str()), ("STUDYAID_OVERRIDE_KEY", "kiosk")])).unwrap();
        assert_eq!(cfg.home_route, "/dashboard");
        assert_eq!(cfg.override_key, "kiosk");
        assert_eq!(cfg.remote_latency_ms, 5);
        // the file switched the fallback off and nothing in the env turns it back on
        assert!(cfg.fallback.is_none());

        let cfg = AuthConfig::load_with(lookup(&[("STUDYAID_CONFIG", path.as_str()), ("STUDYAID_FALLBACK_PASSWORD", "rotated")])).unwrap();
        let fb = cfg.fallback.unwrap();
        assert_eq!(fb.email, FallbackCredentials::RESERVED_EMAIL);
        assert_eq!(fb.password, "rotated");
    }

    #[test]
    fn missing_or_bad_config_file_is_user_error() {
        let err = AuthConfig::load_with(lookup(&[("STUDYAID_CONFIG", "/nonexistent/studyaid.json")])).unwrap_err();
        assert_eq!(err.code_str(), "config_unreadable");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = AuthConfig::load_with(lookup(&[("STUDYAID_CONFIG", path.to_str().unwrap())])).unwrap_err();
        assert_eq!(err.code_str(), "config_invalid");
    }

}
