use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Student,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "admin" => Ok(Role::Admin),
            other => Err(AppError::user("unknown_role".to_string(), format!("unknown role '{}'", other))),
        }
    }
}

/// Where the published identity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    Remote,
    LocalOverride,
}

/// The reconciled "who is signed in" value. Also the on-disk shape of the
/// local override record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub role: Role,
    pub provenance: Provenance,
}

impl Identity {
    pub fn has_role(&self, role: Role) -> bool { self.role == role }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_json_shape() {
        let id = Identity {
            id: "local-admin".into(),
            email: "admin@example.test".into(),
            role: Role::Admin,
            provenance: Provenance::LocalOverride,
        };
        let v = serde_json::to_value(&id).unwrap();
        assert_eq!(v["role"], "admin");
        assert_eq!(v["provenance"], "local-override");
        let back: Identity = serde_json::from_value(v).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn missing_role_defaults_to_student() {
        let raw = r#"{"id":"u1","email":"s@uni.test","provenance":"remote"}"#;
        let id: Identity = serde_json::from_str(raw).unwrap();
        assert_eq!(id.role, Role::Student);
        assert!(!id.has_role(Role::Admin));
    }

    #[test]
    fn role_parse() {
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(" student ".parse::<Role>().unwrap(), Role::Student);
        assert!("moderator".parse::<Role>().is_err());
    }
}
