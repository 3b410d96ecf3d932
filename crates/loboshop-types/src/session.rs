//! Client session state.

use serde::Serialize;

use crate::auth::User;

/// The client's current belief about who is logged in.
///
/// A user is only ever held together with its token, so
/// `is_authenticated` is derived rather than stored.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Session {
    /// Startup recovery has not finished yet.
    #[default]
    Unknown,
    Anonymous,
    Authenticated {
        user: User,
        /// Bearer token. Left out of serialized snapshots.
        #[serde(skip_serializing)]
        token: String,
    },
}

impl Session {
    pub fn is_loading(&self) -> bool {
        matches!(self, Session::Unknown)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Session::Authenticated { .. })
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            Session::Authenticated { user, .. } => Some(user),
            _ => None,
        }
    }

    pub fn token(&self) -> Option<&str> {
        match self {
            Session::Authenticated { token, .. } => Some(token),
            _ => None,
        }
    }
}
