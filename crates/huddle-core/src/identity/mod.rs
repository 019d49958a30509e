//! Session and identity contracts.
//!
//! Authentication itself lives outside the sync core. The core only asks who
//! the current user is before scoping a subscription to a channel or project.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    Authenticated,
    SignedOut,
}

/// The signed-in user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    pub user_id: String,
    pub status: AuthStatus,
}

impl UserSession {
    pub fn authenticated(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            status: AuthStatus::Authenticated,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.status == AuthStatus::Authenticated
    }
}

/// Supplies the current user session.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Returns the current session, or `None` when nobody is signed in.
    async fn current_session(&self) -> Option<UserSession>;
}
