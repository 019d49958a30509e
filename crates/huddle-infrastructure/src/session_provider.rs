//! Session provider backed by an explicitly set user.

use async_trait::async_trait;
use huddle_core::identity::{SessionProvider, UserSession};
use tokio::sync::RwLock;

/// Holds the current session in memory. Sign-in and sign-out are driven by
/// whoever owns the authentication flow.
#[derive(Default)]
pub struct StaticSessionProvider {
    session: RwLock<Option<UserSession>>,
}

impl StaticSessionProvider {
    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn signed_in(user_id: impl Into<String>) -> Self {
        Self {
            session: RwLock::new(Some(UserSession::authenticated(user_id))),
        }
    }

    pub async fn sign_in(&self, user_id: impl Into<String>) {
        *self.session.write().await = Some(UserSession::authenticated(user_id));
    }

    pub async fn sign_out(&self) {
        *self.session.write().await = None;
    }
}

#[async_trait]
impl SessionProvider for StaticSessionProvider {
    async fn current_session(&self) -> Option<UserSession> {
        self.session.read().await.clone()
    }
}
