//! Unified error model for the auth core.
//! Sign-in failures surface to the caller; everything else is logged by the
//! reconciler and never tears down the published identity.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    #[error("{code}: {message}")]
    InvalidCredentials { code: String, message: String },
    #[error("{code}: {message}")]
    RemoteUnavailable { code: String, message: String },
    #[error("{code}: {message}")]
    UserInput { code: String, message: String },
    #[error("{code}: {message}")]
    Storage { code: String, message: String },
    #[error("{code}: {message}")]
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::InvalidCredentials { code, .. }
            | AppError::RemoteUnavailable { code, .. }
            | AppError::UserInput { code, .. }
            | AppError::Storage { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::InvalidCredentials { message, .. }
            | AppError::RemoteUnavailable { message, .. }
            | AppError::UserInput { message, .. }
            | AppError::Storage { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn invalid_credentials<S: Into<String>>(code: S, msg: S) -> Self { AppError::InvalidCredentials { code: code.into(), message: msg.into() } }
    pub fn remote<S: Into<String>>(code: S, msg: S) -> Self { AppError::RemoteUnavailable { code: code.into(), message: msg.into() } }
    pub fn user<S: Into<String>>(code: S, msg: S) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn storage<S: Into<String>>(code: S, msg: S) -> Self { AppError::Storage { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Transport failures may succeed on a later attempt; nothing here retries them.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::RemoteUnavailable { .. })
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage { code: "override_io".into(), message: err.to_string() }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Storage { code: "override_decode".into(), message: err.to_string() }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal { code: "internal".into(), message: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_serde_shape() {
        let e = AppError::invalid_credentials("invalid_credentials", "Invalid login credentials");
        assert_eq!(e.to_string(), "invalid_credentials: Invalid login credentials");
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["type"], "invalid_credentials");
        assert_eq!(v["code"], "invalid_credentials");
    }

    #[test]
    fn only_remote_failures_are_retryable() {
        assert!(AppError::remote("remote_unavailable", "timeout").is_retryable());
        assert!(!AppError::invalid_credentials("invalid_credentials", "x").is_retryable());
        let io: AppError = std::io::Error::new(std::io::ErrorKind::Other, "boom").into();
        assert_eq!(io.code_str(), "override_io");
        assert!(!io.is_retryable());
    }
}
