//! In-memory MessageRepository implementation.
//!
//! Backs local development, the CLI simulator and tests. Paging follows the
//! hosted store's contract: offsets count from the newest message backwards.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use huddle_core::channel::{Channel, Message, MessageRepository, StoredPage};
use huddle_core::error::{HuddleError, Result};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Result of adding a user to a channel or project.
///
/// Joining twice is not an error; the second call reports `AlreadyMember`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    AlreadyMember,
}

#[derive(Default)]
struct StoreInner {
    channels: HashMap<String, Channel>,
    messages: HashMap<String, Vec<Message>>,
    channel_members: HashMap<String, HashSet<String>>,
    project_members: HashMap<String, HashSet<String>>,
    next_sequence: u64,
}

impl StoreInner {
    fn next_sequence(&mut self) -> u64 {
        self.next_sequence += 1;
        self.next_sequence
    }
}

/// Message store kept entirely in memory.
#[derive(Default)]
pub struct InMemoryMessageRepository {
    inner: RwLock<StoreInner>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a channel. Re-adding an existing id replaces its metadata.
    pub async fn add_channel(&self, channel: Channel) {
        let mut inner = self.inner.write().await;
        inner.messages.entry(channel.id.clone()).or_default();
        inner.channels.insert(channel.id.clone(), channel);
    }

    /// Adds `user_id` to a channel's members.
    pub async fn join_channel(&self, channel_id: &str, user_id: &str) -> JoinOutcome {
        let mut inner = self.inner.write().await;
        Self::join(&mut inner.channel_members, channel_id, user_id)
    }

    /// Adds `user_id` to a project's members.
    pub async fn join_project(&self, project_id: &str, user_id: &str) -> JoinOutcome {
        let mut inner = self.inner.write().await;
        Self::join(&mut inner.project_members, project_id, user_id)
    }

    fn join(
        members: &mut HashMap<String, HashSet<String>>,
        scope: &str,
        user_id: &str,
    ) -> JoinOutcome {
        if members
            .entry(scope.to_string())
            .or_default()
            .insert(user_id.to_string())
        {
            JoinOutcome::Joined
        } else {
            tracing::debug!(
                "[InMemoryMessageRepository] {} already member of {}",
                user_id,
                scope
            );
            JoinOutcome::AlreadyMember
        }
    }

    /// Appends a new message to a channel and returns the stored row.
    ///
    /// `created_at` never goes backwards within a channel, so the stored
    /// sequence stays ordered even when the wall clock does not.
    pub async fn insert_message(
        &self,
        channel_id: &str,
        author_id: &str,
        body: &str,
        created_at: Option<DateTime<Utc>>,
    ) -> Result<Message> {
        let mut inner = self.inner.write().await;
        if !inner.channels.contains_key(channel_id) {
            return Err(HuddleError::not_found("Channel", channel_id));
        }
        let sequence = inner.next_sequence();
        let messages = inner.messages.entry(channel_id.to_string()).or_default();

        let requested = created_at.unwrap_or_else(Utc::now);
        let created_at = match messages.last() {
            Some(last) if last.created_at > requested => last.created_at,
            _ => requested,
        };

        let message = Message {
            id: Uuid::new_v4().to_string(),
            channel_id: channel_id.to_string(),
            author_id: author_id.to_string(),
            body: body.to_string(),
            created_at,
            sequence,
        };
        messages.push(message.clone());
        Ok(message)
    }

    /// Replaces a message body. Returns the updated row, or `None` if the
    /// message does not exist.
    pub async fn update_message(
        &self,
        channel_id: &str,
        message_id: &str,
        body: &str,
    ) -> Option<Message> {
        let mut inner = self.inner.write().await;
        let message = inner
            .messages
            .get_mut(channel_id)?
            .iter_mut()
            .find(|m| m.id == message_id)?;
        message.body = body.to_string();
        Some(message.clone())
    }

    /// Removes a message and returns its last stored state.
    pub async fn delete_message(&self, channel_id: &str, message_id: &str) -> Option<Message> {
        let mut inner = self.inner.write().await;
        let messages = inner.messages.get_mut(channel_id)?;
        let index = messages.iter().position(|m| m.id == message_id)?;
        Some(messages.remove(index))
    }

    pub async fn message_count(&self, channel_id: &str) -> usize {
        let inner = self.inner.read().await;
        inner.messages.get(channel_id).map_or(0, Vec::len)
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn fetch_messages(
        &self,
        channel_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<StoredPage> {
        let inner = self.inner.read().await;
        let messages = inner
            .messages
            .get(channel_id)
            .ok_or_else(|| HuddleError::not_found("Channel", channel_id))?;

        let end = messages.len().saturating_sub(offset);
        let start = end.saturating_sub(limit);

        Ok(StoredPage {
            rows: messages[start..end].to_vec(),
            has_more: start > 0,
        })
    }

    async fn find_channel(&self, channel_id: &str) -> Result<Option<Channel>> {
        let inner = self.inner.read().await;
        Ok(inner.channels.get(channel_id).cloned())
    }

    async fn is_channel_member(&self, channel_id: &str, user_id: &str) -> Result<bool> {
        let inner = self.inner.read().await;
        Ok(inner
            .channel_members
            .get(channel_id)
            .is_some_and(|members| members.contains(user_id)))
    }

    async fn is_project_member(&self, project_id: &str, user_id: &str) -> Result<bool> {
        let inner = self.inner.read().await;
        Ok(inner
            .project_members
            .get(project_id)
            .is_some_and(|members| members.contains(user_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(id: &str) -> Channel {
        Channel {
            id: id.to_string(),
            project_id: "p1".to_string(),
            name: format!("#{id}"),
        }
    }

    async fn seeded(count: usize) -> InMemoryMessageRepository {
        let repo = InMemoryMessageRepository::new();
        repo.add_channel(channel("general")).await;
        for i in 0..count {
            repo.insert_message("general", "u1", &format!("message {i}"), None)
                .await
                .unwrap();
        }
        repo
    }

    #[tokio::test]
    async fn test_pages_walk_backwards_from_newest() {
        let repo = seeded(25).await;

        let first = repo.fetch_messages("general", 0, 20).await.unwrap();
        assert_eq!(first.rows.len(), 20);
        assert!(first.has_more);
        assert_eq!(first.rows.last().unwrap().body, "message 24");
        assert_eq!(first.rows.first().unwrap().body, "message 5");

        let second = repo.fetch_messages("general", 20, 20).await.unwrap();
        assert_eq!(second.rows.len(), 5);
        assert!(!second.has_more);
        assert_eq!(second.rows.first().unwrap().body, "message 0");
    }

    #[tokio::test]
    async fn test_empty_channel_returns_empty_page() {
        let repo = seeded(0).await;
        let page = repo.fetch_messages("general", 0, 20).await.unwrap();
        assert!(page.rows.is_empty());
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn test_unknown_channel_is_not_found() {
        let repo = InMemoryMessageRepository::new();
        let err = repo.fetch_messages("missing", 0, 20).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_join_is_idempotent() {
        let repo = InMemoryMessageRepository::new();
        assert_eq!(repo.join_project("p1", "u1").await, JoinOutcome::Joined);
        assert_eq!(repo.join_project("p1", "u1").await, JoinOutcome::AlreadyMember);
        assert!(repo.is_project_member("p1", "u1").await.unwrap());
    }

    #[tokio::test]
    async fn test_created_at_never_goes_backwards() {
        let repo = seeded(1).await;
        let earlier = Utc::now() - chrono::Duration::hours(1);
        let message = repo
            .insert_message("general", "u2", "late clock", Some(earlier))
            .await
            .unwrap();
        let page = repo.fetch_messages("general", 0, 10).await.unwrap();
        assert_eq!(page.rows.last().unwrap().id, message.id);
        assert!(page.rows[0].order_key() < page.rows[1].order_key());
    }
}
