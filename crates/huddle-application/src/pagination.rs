//! Message pagination engine.
//!
//! Fetches channel history one page at a time, newest page first. Within a
//! channel session the engine never hands out the same message twice, even
//! when the store's offsets shift because new messages arrived between two
//! fetches.

use huddle_core::channel::{MessagePage, MessageRepository};
use huddle_core::error::{HuddleError, Result};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Identifies one pagination session. Every `begin_session` or `end_session`
/// issues a new token, and pages fetched under an older one are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionToken(u64);

#[derive(Default)]
struct PaginationSession {
    token: u64,
    channel_id: Option<String>,
    seen: HashSet<String>,
}

pub struct MessagePaginator {
    repository: Arc<dyn MessageRepository>,
    page_size: usize,
    session: Mutex<PaginationSession>,
}

impl MessagePaginator {
    pub fn new(repository: Arc<dyn MessageRepository>, page_size: usize) -> Self {
        Self {
            repository,
            page_size: page_size.max(1),
            session: Mutex::new(PaginationSession::default()),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Starts a fresh session for `channel_id`, forgetting every id seen so far.
    pub fn begin_session(&self, channel_id: &str) -> SessionToken {
        let mut session = self.lock_session();
        session.token += 1;
        session.channel_id = Some(channel_id.to_string());
        session.seen.clear();
        SessionToken(session.token)
    }

    /// Ends the current session.
    pub fn end_session(&self) {
        let mut session = self.lock_session();
        session.token += 1;
        session.channel_id = None;
        session.seen.clear();
    }

    /// Token of the session in progress.
    pub fn current_session(&self) -> SessionToken {
        SessionToken(self.lock_session().token)
    }

    // Never held across an await.
    fn lock_session(&self) -> MutexGuard<'_, PaginationSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetches the page of `channel_id` starting `offset` messages back from
    /// the newest, with at most `limit` messages.
    ///
    /// `has_more` and `next_offset` reflect the store's response. Messages
    /// already returned earlier in the session are filtered out.
    ///
    /// # Errors
    ///
    /// - `HuddleError::Fetch`: the store query failed
    /// - `HuddleError::StaleResultDiscarded`: `token` was superseded while the
    ///   query was in flight; the page is dropped without touching the session
    pub async fn fetch_page(
        &self,
        token: SessionToken,
        channel_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<MessagePage> {
        let stored = self
            .repository
            .fetch_messages(channel_id, offset, limit)
            .await
            .map_err(|e| match e {
                HuddleError::Fetch { .. } => e,
                other => HuddleError::fetch(channel_id, other.to_string()),
            })?;

        let mut session = self.lock_session();
        if session.token != token.0 || session.channel_id.as_deref() != Some(channel_id) {
            tracing::debug!(
                "[MessagePaginator] Dropping page for {} (session {} superseded)",
                channel_id,
                token.0
            );
            return Err(HuddleError::stale(channel_id));
        }

        let next_offset = offset + stored.rows.len();
        let has_more = stored.has_more;
        let mut messages: Vec<_> = stored
            .rows
            .into_iter()
            .filter(|m| m.channel_id == channel_id)
            .filter(|m| session.seen.insert(m.id.clone()))
            .collect();
        messages.sort_by_key(|m| m.order_key());

        tracing::debug!(
            "[MessagePaginator] {} offset={} -> {} messages, has_more={}",
            channel_id,
            offset,
            messages.len(),
            has_more
        );

        Ok(MessagePage {
            messages,
            has_more,
            next_offset,
        })
    }

    /// Fetches with the configured page size.
    pub async fn fetch_default(
        &self,
        token: SessionToken,
        channel_id: &str,
        offset: usize,
    ) -> Result<MessagePage> {
        self.fetch_page(token, channel_id, offset, self.page_size).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use huddle_core::channel::{Channel, StoredPage};
    use huddle_infrastructure::LocalBackend;
    use std::collections::HashSet;

    async fn backend_with_history(count: usize) -> LocalBackend {
        let backend = LocalBackend::default();
        backend.create_channel("general", "p1", &["u1"]).await;
        backend.seed_history("general", "u1", count).await.unwrap();
        backend
    }

    #[tokio::test]
    async fn test_general_with_25_messages_pages_20_then_5() {
        let backend = backend_with_history(25).await;
        let paginator = MessagePaginator::new(backend.repository.clone(), 20);
        let token = paginator.begin_session("general");

        let first = paginator.fetch_page(token, "general", 0, 20).await.unwrap();
        assert_eq!(first.messages.len(), 20);
        assert!(first.has_more);
        assert_eq!(first.next_offset, 20);

        let second = paginator.fetch_page(token, "general", 20, 20).await.unwrap();
        assert_eq!(second.messages.len(), 5);
        assert!(!second.has_more);
        assert_eq!(second.next_offset, 25);
    }

    #[tokio::test]
    async fn test_successive_pages_never_repeat_ids() {
        let backend = backend_with_history(25).await;
        let paginator = MessagePaginator::new(backend.repository.clone(), 20);
        let token = paginator.begin_session("general");

        let first = paginator.fetch_page(token, "general", 0, 20).await.unwrap();
        // A new message shifts the store's offsets by one.
        backend.post_message("general", "u2", "fresh").await.unwrap();
        let second = paginator
            .fetch_page(token, "general", first.messages.len(), 20)
            .await
            .unwrap();

        let ids: HashSet<_> = first
            .messages
            .iter()
            .chain(second.messages.iter())
            .map(|m| m.id.clone())
            .collect();
        assert_eq!(ids.len(), first.messages.len() + second.messages.len());
        assert_eq!(ids.len(), 25);
    }

    #[tokio::test]
    async fn test_empty_channel_is_not_an_error() {
        let backend = backend_with_history(0).await;
        let paginator = MessagePaginator::new(backend.repository.clone(), 20);
        let token = paginator.begin_session("general");

        let page = paginator.fetch_page(token, "general", 0, 20).await.unwrap();
        assert_eq!(page, MessagePage::empty());
    }

    #[tokio::test]
    async fn test_page_is_sorted_ascending() {
        let backend = backend_with_history(5).await;
        let paginator = MessagePaginator::new(backend.repository.clone(), 20);
        let token = paginator.begin_session("general");

        let page = paginator.fetch_default(token, "general", 0).await.unwrap();
        assert!(page.messages.windows(2).all(|w| w[0].order_key() <= w[1].order_key()));
    }

    #[tokio::test]
    async fn test_page_for_abandoned_session_is_stale() {
        let backend = backend_with_history(3).await;
        let paginator = MessagePaginator::new(backend.repository.clone(), 20);
        let token = paginator.begin_session("random");

        let err = paginator.fetch_page(token, "general", 0, 20).await.unwrap_err();
        assert!(err.is_stale());
    }

    #[tokio::test]
    async fn test_page_from_earlier_session_of_same_channel_is_dropped() {
        let backend = backend_with_history(25).await;
        let paginator = MessagePaginator::new(backend.repository.clone(), 20);
        let earlier = paginator.begin_session("general");
        let current = paginator.begin_session("general");
        assert_ne!(earlier, current);
        assert_eq!(paginator.current_session(), current);

        let err = paginator.fetch_page(earlier, "general", 0, 20).await.unwrap_err();
        assert!(err.is_stale());

        // The dropped page must not mark its ids as seen for the new session.
        let page = paginator.fetch_page(current, "general", 0, 20).await.unwrap();
        assert_eq!(page.messages.len(), 20);
        assert_eq!(page.next_offset, 20);
    }

    #[tokio::test]
    async fn test_ended_session_drops_pending_pages() {
        let backend = backend_with_history(3).await;
        let paginator = MessagePaginator::new(backend.repository.clone(), 20);
        let token = paginator.begin_session("general");
        paginator.end_session();

        let err = paginator.fetch_page(token, "general", 0, 20).await.unwrap_err();
        assert!(err.is_stale());
    }

    struct FailingRepository;

    #[async_trait]
    impl MessageRepository for FailingRepository {
        async fn fetch_messages(&self, _: &str, _: usize, _: usize) -> Result<StoredPage> {
            Err(HuddleError::io("connection reset"))
        }

        async fn find_channel(&self, _: &str) -> Result<Option<Channel>> {
            Ok(None)
        }

        async fn is_channel_member(&self, _: &str, _: &str) -> Result<bool> {
            Ok(false)
        }

        async fn is_project_member(&self, _: &str, _: &str) -> Result<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_store_failure_becomes_fetch_error() {
        let paginator = MessagePaginator::new(Arc::new(FailingRepository), 20);
        let token = paginator.begin_session("general");

        let err = paginator.fetch_page(token, "general", 0, 20).await.unwrap_err();
        assert!(err.is_fetch());
    }
}
