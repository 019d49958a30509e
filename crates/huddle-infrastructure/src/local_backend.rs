//! Local backend pairing the in-memory store with the in-memory transport.
//!
//! A hosted backend emits a change notification for every committed row.
//! `LocalBackend` reproduces that: each mutation is written to the store first
//! and then published.

use crate::in_memory_message_repository::InMemoryMessageRepository;
use crate::in_memory_push_transport::InMemoryPushTransport;
use chrono::Utc;
use huddle_core::change::ChangeKind;
use huddle_core::channel::{Channel, Message};
use huddle_core::error::{HuddleError, Result};
use huddle_core::progress::ProgressEvent;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct LocalBackend {
    pub repository: Arc<InMemoryMessageRepository>,
    pub transport: Arc<InMemoryPushTransport>,
}

impl LocalBackend {
    pub fn new(event_buffer: usize) -> Self {
        Self {
            repository: Arc::new(InMemoryMessageRepository::new()),
            transport: Arc::new(InMemoryPushTransport::new(event_buffer)),
        }
    }

    /// Creates a channel and makes each of `members` a member of both the
    /// channel and its project.
    pub async fn create_channel(
        &self,
        channel_id: &str,
        project_id: &str,
        members: &[&str],
    ) -> Channel {
        let channel = Channel {
            id: channel_id.to_string(),
            project_id: project_id.to_string(),
            name: format!("#{channel_id}"),
        };
        self.repository.add_channel(channel.clone()).await;
        for member in members {
            self.repository.join_channel(channel_id, member).await;
            self.repository.join_project(project_id, member).await;
        }
        channel
    }

    /// Stores `count` messages without publishing them, as pre-existing history.
    pub async fn seed_history(&self, channel_id: &str, author_id: &str, count: usize) -> Result<()> {
        let base = Utc::now() - chrono::Duration::seconds(count as i64);
        for i in 0..count {
            let created_at = base + chrono::Duration::seconds(i as i64);
            self.repository
                .insert_message(channel_id, author_id, &format!("message {i}"), Some(created_at))
                .await?;
        }
        Ok(())
    }

    pub async fn post_message(&self, channel_id: &str, author_id: &str, body: &str) -> Result<Message> {
        let message = self
            .repository
            .insert_message(channel_id, author_id, body, None)
            .await?;
        self.transport
            .publish_message(ChangeKind::Insert, &message)
            .await?;
        Ok(message)
    }

    pub async fn edit_message(&self, channel_id: &str, message_id: &str, body: &str) -> Result<Message> {
        let message = self
            .repository
            .update_message(channel_id, message_id, body)
            .await
            .ok_or_else(|| HuddleError::not_found("Message", message_id))?;
        self.transport
            .publish_message(ChangeKind::Update, &message)
            .await?;
        Ok(message)
    }

    pub async fn remove_message(&self, channel_id: &str, message_id: &str) -> Result<Message> {
        let message = self
            .repository
            .delete_message(channel_id, message_id)
            .await
            .ok_or_else(|| HuddleError::not_found("Message", message_id))?;
        self.transport
            .publish_message(ChangeKind::Delete, &message)
            .await?;
        Ok(message)
    }

    /// Records a progress step for a project's running job.
    pub async fn report_progress(&self, project_id: &str, step: &str, progress: u8) -> Result<ProgressEvent> {
        let event = ProgressEvent {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            step: step.to_string(),
            progress: progress.min(100),
            created_at: Utc::now(),
        };
        self.transport.publish_progress(&event).await?;
        Ok(event)
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new(huddle_core::config::DEFAULT_EVENT_BUFFER)
    }
}
