//! Authentication payloads.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A user as returned by the auth endpoints.
///
/// Unknown fields are kept in `extra` so the persisted copy mirrors the
/// server payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(rename = "telefono", default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(rename = "rol", default)]
    pub role: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Login form. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Registration form. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterData {
    #[serde(rename = "nombre")]
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(rename = "telefono", skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Response shape shared by `/auth/login`, `/auth/registro` and `/auth/perfil`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(rename = "usuario", default)]
    pub user: Option<User>,
    #[serde(default)]
    pub message: Option<String>,
}

impl AuthResponse {
    /// Splits a successful response into its token and user.
    ///
    /// Returns `None` unless `success` is set and both parts are present.
    pub fn into_session_parts(self) -> Option<(String, User)> {
        if !self.success {
            return None;
        }
        match (self.token, self.user) {
            (Some(token), Some(user)) if !token.is_empty() => Some((token, user)),
            _ => None,
        }
    }
}
