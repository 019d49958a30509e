//! Typed change stream client over a push transport.
//!
//! `ChangeStreamClient` turns a raw transport stream into typed
//! [`ChangeEvent`]s delivered to a callback. Each open subscription gets one
//! forwarding task, so callbacks for a topic run sequentially in commit order.

use huddle_core::change::{
    ChangeEvent, ChangeFilter, ChangeSubscription, PushTransport, SubscriptionStatus, TopicKey,
    TransportHandle,
};
use huddle_core::error::{HuddleError, Result};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

struct OpenStream {
    handle: TransportHandle,
    forwarder: JoinHandle<()>,
}

pub struct ChangeStreamClient {
    transport: Arc<dyn PushTransport>,
    streams: Mutex<HashMap<Uuid, OpenStream>>,
}

impl ChangeStreamClient {
    pub fn new(transport: Arc<dyn PushTransport>) -> Self {
        Self {
            transport,
            streams: Mutex::new(HashMap::new()),
        }
    }

    /// Opens a subscription to `topic` and forwards each decoded change to
    /// `on_event`.
    ///
    /// Changes that fail to decode are logged and skipped; they never stop the
    /// stream.
    ///
    /// # Errors
    ///
    /// Returns `HuddleError::Subscription` if the transport cannot open the topic.
    pub async fn open<T, F>(
        &self,
        topic: TopicKey,
        filter: ChangeFilter,
        mut on_event: F,
    ) -> Result<ChangeSubscription>
    where
        T: DeserializeOwned + Send + 'static,
        F: FnMut(ChangeEvent<T>) + Send + 'static,
    {
        let stream = self
            .transport
            .open(&topic, &filter)
            .await
            .map_err(|e| match e {
                HuddleError::Subscription { .. } => e,
                other => HuddleError::subscription(topic.to_string(), other.to_string()),
            })?;

        let subscription = ChangeSubscription::new(topic);
        let label = subscription.topic.to_string();
        let mut events = stream.events;

        let forwarder = tokio::spawn(async move {
            while let Some(raw) = events.recv().await {
                match ChangeEvent::<T>::decode(&label, &raw) {
                    Ok(event) => on_event(event),
                    Err(e) => tracing::warn!(
                        "[ChangeStream] Skipping change #{} on {}: {}",
                        raw.commit_sequence,
                        label,
                        e
                    ),
                }
            }
            tracing::debug!("[ChangeStream] Transport stream ended: {}", label);
        });

        self.streams.lock().await.insert(
            subscription.id,
            OpenStream {
                handle: stream.handle,
                forwarder,
            },
        );
        tracing::debug!(
            "[ChangeStream] Opened {} ({})",
            subscription.topic,
            subscription.id
        );

        Ok(subscription)
    }

    /// Closes a subscription. Closing an already-closed subscription is a no-op.
    ///
    /// The forwarding task is aborted, so no further changes are delivered. A
    /// transport failure while closing is logged; the subscription is closed
    /// regardless.
    pub async fn close(&self, subscription: &mut ChangeSubscription) {
        if subscription.status == SubscriptionStatus::Closed {
            return;
        }
        subscription.status = SubscriptionStatus::Closed;

        let Some(open) = self.streams.lock().await.remove(&subscription.id) else {
            return;
        };
        open.forwarder.abort();
        if let Err(e) = self.transport.close(open.handle).await {
            tracing::warn!(
                "[ChangeStream] Transport close failed for {}: {}",
                subscription.topic,
                e
            );
        }
        tracing::debug!(
            "[ChangeStream] Closed {} ({})",
            subscription.topic,
            subscription.id
        );
    }

    /// Number of subscriptions this client currently holds open.
    pub async fn open_count(&self) -> usize {
        self.streams.lock().await.len()
    }
}
