//! Subscription lifecycle management.
//!
//! `SubscriptionLifecycleManager` owns the single live subscription of each
//! topic kind and sequences every replacement as
//! `Inactive -> Opening -> Active -> Closing -> Inactive`.
//!
//! Requests for a topic kind are serialized: a replacement always awaits the
//! full close of the previous subscription before opening the next one, so
//! two subscriptions of the same kind never overlap. Each request takes a
//! ticket first; a request whose ticket has been overtaken by a newer one is
//! superseded and never leaves a subscription behind.

use crate::change_stream::ChangeStreamClient;
use huddle_core::change::{ChangeEvent, ChangeFilter, ChangeSubscription, TopicKey, TopicKind};
use huddle_core::error::{HuddleError, Result};
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, watch};

/// Lifecycle state of one topic kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    Inactive,
    Opening(TopicKey),
    Active(TopicKey),
    Closing(TopicKey),
}

impl LifecycleState {
    /// The topic this state refers to, if any.
    pub fn topic(&self) -> Option<&TopicKey> {
        match self {
            Self::Inactive => None,
            Self::Opening(topic) | Self::Active(topic) | Self::Closing(topic) => Some(topic),
        }
    }
}

/// How `activate` treats a request for the topic that is already active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescopePolicy {
    /// Keep the live subscription when the requested topic is already active.
    ReuseIfSameKey,
    /// Always close and reopen, even for the same topic.
    AlwaysReplace,
}

/// Position of one request in a topic kind's request order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeTicket {
    kind: TopicKind,
    value: u64,
}

impl ScopeTicket {
    pub fn kind(&self) -> TopicKind {
        self.kind
    }
}

/// Result of a successful `activate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    Opened(ChangeSubscription),
    Reused(ChangeSubscription),
}

impl Activation {
    pub fn subscription(&self) -> &ChangeSubscription {
        match self {
            Self::Opened(subscription) | Self::Reused(subscription) => subscription,
        }
    }
}

struct TopicSlot {
    latest_ticket: AtomicU64,
    current: Mutex<Option<ChangeSubscription>>,
    state: watch::Sender<LifecycleState>,
}

impl TopicSlot {
    fn new() -> Self {
        let (state, _) = watch::channel(LifecycleState::Inactive);
        Self {
            latest_ticket: AtomicU64::new(0),
            current: Mutex::new(None),
            state,
        }
    }

    fn issue_ticket(&self) -> u64 {
        self.latest_ticket.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_latest(&self, ticket: u64) -> bool {
        self.latest_ticket.load(Ordering::SeqCst) == ticket
    }

    fn set_state(&self, state: LifecycleState) {
        self.state.send_replace(state);
    }
}

pub struct SubscriptionLifecycleManager {
    client: ChangeStreamClient,
    channel: TopicSlot,
    progress: TopicSlot,
}

impl SubscriptionLifecycleManager {
    pub fn new(client: ChangeStreamClient) -> Self {
        Self {
            client,
            channel: TopicSlot::new(),
            progress: TopicSlot::new(),
        }
    }

    fn slot(&self, kind: TopicKind) -> &TopicSlot {
        match kind {
            TopicKind::ChannelChanges => &self.channel,
            TopicKind::ProgressChanges => &self.progress,
        }
    }

    /// Current lifecycle state of `kind`.
    pub fn state(&self, kind: TopicKind) -> LifecycleState {
        self.slot(kind).state.borrow().clone()
    }

    /// Observes lifecycle transitions of `kind`.
    pub fn watch_state(&self, kind: TopicKind) -> watch::Receiver<LifecycleState> {
        self.slot(kind).state.subscribe()
    }

    /// The topic of `kind` that is currently active, if any.
    pub fn active_topic(&self, kind: TopicKind) -> Option<TopicKey> {
        match self.state(kind) {
            LifecycleState::Active(topic) => Some(topic),
            _ => None,
        }
    }

    /// Reserves the next request slot for `kind`.
    ///
    /// Callers reserve synchronously, at the moment they change their scoping
    /// key, so tickets are ordered exactly like the key changes. Reserving
    /// supersedes every earlier ticket of the same kind.
    pub fn reserve(&self, kind: TopicKind) -> ScopeTicket {
        ScopeTicket {
            kind,
            value: self.slot(kind).issue_ticket(),
        }
    }

    /// Whether `ticket` is still the newest request of its kind.
    pub fn is_current(&self, ticket: ScopeTicket) -> bool {
        self.slot(ticket.kind).is_latest(ticket.value)
    }

    /// Scopes the subscription of `ticket.kind` to `topic`.
    ///
    /// Any previous subscription of the same kind is closed first. No retry is
    /// attempted when opening fails.
    ///
    /// # Errors
    ///
    /// - `HuddleError::Subscription`: the transport refused; state is `Inactive`
    /// - `HuddleError::StaleResultDiscarded`: a newer ticket of the same kind
    ///   was reserved while this request was waiting or opening
    pub async fn activate<T, F>(
        &self,
        ticket: ScopeTicket,
        topic: TopicKey,
        filter: ChangeFilter,
        policy: RescopePolicy,
        on_event: F,
    ) -> Result<Activation>
    where
        T: DeserializeOwned + Send + 'static,
        F: FnMut(ChangeEvent<T>) + Send + 'static,
    {
        if ticket.kind != topic.kind {
            return Err(HuddleError::internal(format!(
                "ticket for {} used to open {}",
                ticket.kind, topic
            )));
        }
        let slot = self.slot(topic.kind);
        let mut current = slot.current.lock().await;

        if !slot.is_latest(ticket.value) {
            tracing::debug!("[SubscriptionLifecycle] Skipping superseded request for {}", topic);
            return Err(HuddleError::stale(topic.to_string()));
        }

        if policy == RescopePolicy::ReuseIfSameKey
            && let Some(existing) = current.as_ref().filter(|s| s.topic == topic && s.is_active())
        {
            tracing::debug!("[SubscriptionLifecycle] Reusing {}", topic);
            return Ok(Activation::Reused(existing.clone()));
        }

        self.close_current(slot, &mut current).await;

        slot.set_state(LifecycleState::Opening(topic.clone()));
        let mut subscription = match self.client.open(topic.clone(), filter, on_event).await {
            Ok(subscription) => subscription,
            Err(e) => {
                slot.set_state(LifecycleState::Inactive);
                tracing::warn!("[SubscriptionLifecycle] Failed to open {}: {}", topic, e);
                return Err(e);
            }
        };

        if !slot.is_latest(ticket.value) {
            tracing::debug!(
                "[SubscriptionLifecycle] {} superseded while opening, closing it",
                topic
            );
            slot.set_state(LifecycleState::Closing(topic.clone()));
            self.client.close(&mut subscription).await;
            slot.set_state(LifecycleState::Inactive);
            return Err(HuddleError::stale(topic.to_string()));
        }

        slot.set_state(LifecycleState::Active(topic.clone()));
        tracing::info!("[SubscriptionLifecycle] Active: {}", topic);
        *current = Some(subscription.clone());
        Ok(Activation::Opened(subscription))
    }

    /// Closes the subscription of `ticket.kind`, leaving it `Inactive`.
    ///
    /// Does nothing and returns `false` when a newer ticket exists; the newer
    /// request owns the slot.
    pub async fn deactivate(&self, ticket: ScopeTicket) -> bool {
        let slot = self.slot(ticket.kind);
        let mut current = slot.current.lock().await;
        if !slot.is_latest(ticket.value) {
            return false;
        }
        self.close_current(slot, &mut current).await;
        true
    }

    /// Unconditionally closes the subscription of `kind`.
    pub async fn shutdown(&self, kind: TopicKind) {
        let ticket = self.reserve(kind);
        self.deactivate(ticket).await;
    }

    async fn close_current(&self, slot: &TopicSlot, current: &mut Option<ChangeSubscription>) {
        if let Some(mut subscription) = current.take() {
            slot.set_state(LifecycleState::Closing(subscription.topic.clone()));
            self.client.close(&mut subscription).await;
            tracing::info!("[SubscriptionLifecycle] Closed: {}", subscription.topic);
        }
        slot.set_state(LifecycleState::Inactive);
    }

    /// Number of transport subscriptions held open across all kinds.
    pub async fn open_count(&self) -> usize {
        self.client.open_count().await
    }
}

#[cfg(test)]
#[path = "subscription_test.rs"]
mod tests;
