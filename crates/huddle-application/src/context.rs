//! Shared wiring for the sync services.

use crate::change_stream::ChangeStreamClient;
use crate::subscription::SubscriptionLifecycleManager;
use huddle_core::change::PushTransport;
use huddle_core::channel::MessageRepository;
use huddle_core::config::SyncConfig;
use huddle_core::error::{HuddleError, Result};
use huddle_core::identity::{SessionProvider, UserSession};
use std::sync::Arc;

/// Dependencies shared by `ChannelSync` and `ProgressOverlay`.
///
/// Both services must share one context so that they share one
/// `SubscriptionLifecycleManager`.
#[derive(Clone)]
pub struct SyncContext {
    pub repository: Arc<dyn MessageRepository>,
    pub sessions: Arc<dyn SessionProvider>,
    pub subscriptions: Arc<SubscriptionLifecycleManager>,
    pub config: SyncConfig,
}

impl SyncContext {
    pub fn new(
        repository: Arc<dyn MessageRepository>,
        sessions: Arc<dyn SessionProvider>,
        transport: Arc<dyn PushTransport>,
        config: SyncConfig,
    ) -> Self {
        let client = ChangeStreamClient::new(transport);
        Self {
            repository,
            sessions,
            subscriptions: Arc::new(SubscriptionLifecycleManager::new(client)),
            config,
        }
    }

    /// The current session, which must be authenticated.
    ///
    /// # Errors
    ///
    /// Returns `HuddleError::Unauthenticated` when nobody is signed in.
    pub async fn authenticated_session(&self) -> Result<UserSession> {
        match self.sessions.current_session().await {
            Some(session) if session.is_authenticated() => Ok(session),
            _ => Err(HuddleError::Unauthenticated),
        }
    }
}
