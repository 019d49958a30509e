//! In-memory PushTransport implementation.
//!
//! Emulates a realtime server: every published change gets a commit
//! sequence and is fanned out to each open stream whose filter matches.

use async_trait::async_trait;
use huddle_core::change::{
    ChangeFilter, ChangeKind, MESSAGES_TABLE, PROGRESS_EVENTS_TABLE, PushTransport, RawChange,
    TopicKey, TransportHandle, TransportStream,
};
use huddle_core::channel::Message;
use huddle_core::config::DEFAULT_EVENT_BUFFER;
use huddle_core::error::{HuddleError, Result};
use huddle_core::progress::ProgressEvent;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{RwLock, mpsc};

struct Registration {
    topic: TopicKey,
    filter: ChangeFilter,
    sender: mpsc::Sender<RawChange>,
}

/// Push transport that lives in the current process.
pub struct InMemoryPushTransport {
    buffer: usize,
    registrations: RwLock<HashMap<TransportHandle, Registration>>,
    available: AtomicBool,
    next_commit: AtomicU64,
}

impl Default for InMemoryPushTransport {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}

impl InMemoryPushTransport {
    /// Creates a transport whose streams buffer up to `buffer` changes.
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
            registrations: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            next_commit: AtomicU64::new(0),
        }
    }

    /// Simulates an outage: while unavailable, `open` fails.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of streams currently open.
    pub async fn active_subscriptions(&self) -> usize {
        self.registrations.read().await.len()
    }

    /// Topics with an open stream, for leak checks.
    pub async fn active_topics(&self) -> Vec<TopicKey> {
        let registrations = self.registrations.read().await;
        registrations.values().map(|r| r.topic.clone()).collect()
    }

    /// Publishes a change and returns its commit sequence.
    ///
    /// Delivery awaits buffer space on each matching stream, so changes reach
    /// every subscriber in commit order.
    pub async fn publish(
        &self,
        table: &str,
        kind: ChangeKind,
        record: Option<serde_json::Value>,
        old_record: Option<serde_json::Value>,
    ) -> u64 {
        let commit_sequence = self.next_commit.fetch_add(1, Ordering::SeqCst) + 1;
        let change = RawChange {
            table: table.to_string(),
            kind,
            record,
            old_record,
            commit_sequence,
        };

        let targets: Vec<(TransportHandle, mpsc::Sender<RawChange>)> = {
            let registrations = self.registrations.read().await;
            registrations
                .iter()
                .filter(|(_, r)| r.filter.matches(&change))
                .map(|(handle, r)| (*handle, r.sender.clone()))
                .collect()
        };

        let mut dropped = Vec::new();
        for (handle, sender) in targets {
            if sender.send(change.clone()).await.is_err() {
                dropped.push(handle);
            }
        }

        if !dropped.is_empty() {
            let mut registrations = self.registrations.write().await;
            for handle in dropped {
                registrations.remove(&handle);
            }
        }

        tracing::trace!(
            "[InMemoryPushTransport] committed #{} on {}",
            commit_sequence,
            table
        );
        commit_sequence
    }

    /// Publishes a message row change. Deletes carry the row as `old_record`.
    pub async fn publish_message(&self, kind: ChangeKind, message: &Message) -> Result<u64> {
        let row = serde_json::to_value(message)?;
        let (record, old_record) = match kind {
            ChangeKind::Delete => (None, Some(row)),
            ChangeKind::Insert | ChangeKind::Update => (Some(row), None),
        };
        Ok(self.publish(MESSAGES_TABLE, kind, record, old_record).await)
    }

    /// Publishes a progress-event insert.
    pub async fn publish_progress(&self, event: &ProgressEvent) -> Result<u64> {
        let row = serde_json::to_value(event)?;
        Ok(self
            .publish(PROGRESS_EVENTS_TABLE, ChangeKind::Insert, Some(row), None)
            .await)
    }
}

#[async_trait]
impl PushTransport for InMemoryPushTransport {
    async fn open(&self, topic: &TopicKey, filter: &ChangeFilter) -> Result<TransportStream> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(HuddleError::subscription(
                topic.to_string(),
                "transport unavailable",
            ));
        }

        let (sender, events) = mpsc::channel(self.buffer);
        let handle = TransportHandle::new();
        self.registrations.write().await.insert(
            handle,
            Registration {
                topic: topic.clone(),
                filter: filter.clone(),
                sender,
            },
        );
        tracing::debug!(
            "[InMemoryPushTransport] opened {} with filter {}",
            topic,
            filter
        );

        Ok(TransportStream { handle, events })
    }

    async fn close(&self, handle: TransportHandle) -> Result<()> {
        if let Some(registration) = self.registrations.write().await.remove(&handle) {
            tracing::debug!("[InMemoryPushTransport] closed {}", registration.topic);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_reaches_matching_stream_only() {
        let transport = InMemoryPushTransport::default();
        let mut general = transport
            .open(&TopicKey::channel("general"), &ChangeFilter::messages_in("general"))
            .await
            .unwrap();
        let mut random = transport
            .open(&TopicKey::channel("random"), &ChangeFilter::messages_in("random"))
            .await
            .unwrap();

        transport
            .publish(
                MESSAGES_TABLE,
                ChangeKind::Insert,
                Some(json!({ "channel_id": "general" })),
                None,
            )
            .await;

        let change = general.events.recv().await.unwrap();
        assert_eq!(change.commit_sequence, 1);
        assert!(random.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_open_fails_when_unavailable() {
        let transport = InMemoryPushTransport::default();
        transport.set_available(false);
        let err = transport
            .open(&TopicKey::progress("p1"), &ChangeFilter::progress_for("p1"))
            .await
            .unwrap_err();
        assert!(err.is_subscription());
        assert_eq!(transport.active_subscriptions().await, 0);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let transport = InMemoryPushTransport::default();
        let stream = transport
            .open(&TopicKey::channel("general"), &ChangeFilter::messages_in("general"))
            .await
            .unwrap();
        transport.close(stream.handle).await.unwrap();
        transport.close(stream.handle).await.unwrap();
        assert_eq!(transport.active_subscriptions().await, 0);
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_pruned() {
        let transport = InMemoryPushTransport::default();
        let stream = transport
            .open(&TopicKey::channel("general"), &ChangeFilter::messages_in("general"))
            .await
            .unwrap();
        drop(stream);
        transport
            .publish(
                MESSAGES_TABLE,
                ChangeKind::Insert,
                Some(json!({ "channel_id": "general" })),
                None,
            )
            .await;
        assert_eq!(transport.active_subscriptions().await, 0);
    }
}
