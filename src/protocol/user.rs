//! The signed-in account.

use std::fmt;

use serde::{Deserialize, Serialize};
use veil::Redact;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Listener,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::Listener => write!(f, "listener"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,

    #[serde(default)]
    pub avatar_url: Option<String>,

    #[serde(default)]
    pub role: Role,
}

impl User {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Registration form.
#[derive(Clone, Serialize, Redact)]
#[serde(rename_all = "camelCase")]
pub struct SignUp {
    pub email: String,
    pub username: String,

    #[redact]
    pub password: String,

    #[redact]
    pub confirm_password: String,
}

/// Acknowledgement carrying a human readable message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles() {
        let user: User = serde_json::from_str(
            r#"{ "id": "u1", "username": "mod", "email": "m@example.com", "role": "admin" }"#,
        )
        .unwrap();
        assert!(user.is_admin());

        let user: User =
            serde_json::from_str(r#"{ "id": "u2", "username": "fan", "email": "f@example.com" }"#)
                .unwrap();
        assert_eq!(user.role, Role::Listener);
    }
}
