//! Channel synchronization coordinator.
//!
//! `ChannelSync` wires the view store, the paginator and the channel
//! subscription together. A channel switch runs as:
//!
//! 1. reset the view store (cleared and loading, before anything is awaited)
//! 2. check the session and channel membership
//! 3. rescope the channel subscription
//! 4. fetch the newest page and merge it under the switch's generation
//!
//! Inbound changes travel from the subscription callback over an mpsc channel
//! to a pump task that applies them to the store in arrival order.

use crate::channel_view::{ChannelViewStore, MergeOutcome};
use crate::context::SyncContext;
use crate::pagination::{MessagePaginator, SessionToken};
use crate::subscription::{RescopePolicy, ScopeTicket};
use huddle_core::change::{ChangeEvent, ChangeFilter, TopicKey, TopicKind};
use huddle_core::channel::{ChannelViewState, Message};
use huddle_core::error::{HuddleError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;

/// Result of `ChannelSync::set_active_channel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// The channel is subscribed and its newest page is loaded.
    Loaded,
    /// No channel is active.
    Cleared,
    /// A newer switch took over before this one finished.
    Superseded,
}

/// Result of `ChannelSync::load_older`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Appended { added: usize },
    /// The store reported no older history.
    Exhausted,
    /// A fetch for the active channel is already in flight.
    AlreadyLoading,
    NoActiveChannel,
    Superseded,
}

/// Inbound change tagged with the channel its subscription was opened for.
type Inbound = (String, ChangeEvent<Message>);

pub struct ChannelSync {
    ctx: SyncContext,
    store: Arc<Mutex<ChannelViewStore>>,
    paginator: MessagePaginator,
    updates: watch::Receiver<ChannelViewState>,
    /// Generation of the `load_older` fetch in flight, 0 when idle
    older_in_flight: AtomicU64,
    /// Latest generation with at least one merged page
    merged_generation: AtomicU64,
    inbound: mpsc::UnboundedSender<Inbound>,
    pump: JoinHandle<()>,
}

impl ChannelSync {
    /// Creates a coordinator with no active channel. Must be called within a
    /// tokio runtime.
    pub fn new(ctx: SyncContext) -> Self {
        let store = ChannelViewStore::new();
        let updates = store.subscribe();
        let store = Arc::new(Mutex::new(store));
        let paginator = MessagePaginator::new(ctx.repository.clone(), ctx.config.page_size);
        let (inbound, rx) = mpsc::unbounded_channel();
        let pump = tokio::spawn(Self::pump(store.clone(), rx));

        Self {
            ctx,
            store,
            paginator,
            updates,
            older_in_flight: AtomicU64::new(0),
            merged_generation: AtomicU64::new(0),
            inbound,
            pump,
        }
    }

    async fn pump(store: Arc<Mutex<ChannelViewStore>>, mut rx: mpsc::UnboundedReceiver<Inbound>) {
        while let Some((channel_id, event)) = rx.recv().await {
            let mut store = store.lock().await;
            if !store.state().is_active(&channel_id) {
                tracing::trace!("[ChannelSync] Dropping event from inactive channel {}", channel_id);
                continue;
            }
            let message_id = event.entity().id.clone();
            match store.merge_inbound(event) {
                MergeOutcome::Duplicate | MergeOutcome::Missing | MergeOutcome::ForeignChannel => {
                    tracing::trace!("[ChannelSync] No-op change for message {}", message_id);
                }
                outcome => {
                    tracing::debug!("[ChannelSync] {:?} message {}", outcome, message_id);
                }
            }
        }
    }

    /// Makes `channel_id` the active channel, or clears it.
    ///
    /// The view is reset before the first suspension point, so observers never
    /// see the previous channel's messages under the new id.
    ///
    /// # Errors
    ///
    /// - `HuddleError::Unauthenticated`, `Forbidden`, `NotFound`: access was
    ///   refused and the channel subscription is torn down
    /// - `HuddleError::Subscription`: the live subscription could not be opened
    /// - `HuddleError::Fetch`: the first page could not be loaded; the
    ///   subscription stays open and `load_older` retries from offset 0
    ///
    /// In every error case the view is left with the channel active, no
    /// messages and the loading flag cleared.
    pub async fn set_active_channel(&self, channel_id: Option<&str>) -> Result<SwitchOutcome> {
        let (generation, session, ticket) = {
            let mut store = self.store.lock().await;
            let generation = store.set_active_channel(channel_id);
            let ticket = self.ctx.subscriptions.reserve(TopicKind::ChannelChanges);
            let session = match channel_id {
                Some(id) => self.paginator.begin_session(id),
                None => {
                    self.paginator.end_session();
                    self.paginator.current_session()
                }
            };
            (generation, session, ticket)
        };

        let Some(channel_id) = channel_id else {
            self.ctx.subscriptions.deactivate(ticket).await;
            tracing::info!("[ChannelSync] No active channel");
            return Ok(SwitchOutcome::Cleared);
        };
        tracing::info!("[ChannelSync] Switching to channel {}", channel_id);

        match self.open_channel(channel_id, generation, session, ticket).await {
            Ok(()) => Ok(SwitchOutcome::Loaded),
            Err(e) if e.is_stale() => {
                tracing::debug!("[ChannelSync] Switch to {} superseded", channel_id);
                Ok(SwitchOutcome::Superseded)
            }
            Err(e) => {
                // Fetch errors were already recorded by `load_page`.
                if !e.is_fetch() {
                    self.store.lock().await.fail_loading(generation);
                    self.ctx.subscriptions.deactivate(ticket).await;
                }
                tracing::warn!("[ChannelSync] Failed to open channel {}: {}", channel_id, e);
                Err(e)
            }
        }
    }

    async fn open_channel(
        &self,
        channel_id: &str,
        generation: u64,
        session: SessionToken,
        ticket: ScopeTicket,
    ) -> Result<()> {
        self.authorize(channel_id).await?;

        let inbound = self.inbound.clone();
        let scope = channel_id.to_string();
        self.ctx
            .subscriptions
            .activate(
                ticket,
                TopicKey::channel(channel_id),
                ChangeFilter::messages_in(channel_id),
                RescopePolicy::ReuseIfSameKey,
                move |event: ChangeEvent<Message>| {
                    let _ = inbound.send((scope.clone(), event));
                },
            )
            .await?;

        let added = self.load_page(channel_id, generation, session, 0).await?;
        tracing::debug!("[ChannelSync] Loaded {} messages for {}", added, channel_id);
        Ok(())
    }

    async fn authorize(&self, channel_id: &str) -> Result<()> {
        let session = self.ctx.authenticated_session().await?;
        if self.ctx.repository.find_channel(channel_id).await?.is_none() {
            return Err(HuddleError::not_found("Channel", channel_id));
        }
        if !self
            .ctx
            .repository
            .is_channel_member(channel_id, &session.user_id)
            .await?
        {
            return Err(HuddleError::forbidden(channel_id, session.user_id));
        }
        Ok(())
    }

    /// Fetches one page at `offset` and merges it under `generation`.
    async fn load_page(
        &self,
        channel_id: &str,
        generation: u64,
        session: SessionToken,
        offset: usize,
    ) -> Result<usize> {
        let fetched = self
            .paginator
            .fetch_default(session, channel_id, offset)
            .await;

        let mut store = self.store.lock().await;
        match fetched {
            Ok(page) => {
                let added = store.append_older_page(generation, page)?;
                self.merged_generation.store(generation, Ordering::SeqCst);
                Ok(added)
            }
            Err(e) => {
                if !e.is_stale() {
                    store.fail_loading(generation);
                }
                Err(e)
            }
        }
    }

    /// Loads the next page of older history for the active channel.
    ///
    /// On a fetch error the view is unchanged, so calling again retries the
    /// same offset.
    ///
    /// # Errors
    ///
    /// Returns `HuddleError::Fetch` when the store query failed.
    pub async fn load_older(&self) -> Result<LoadOutcome> {
        let (channel_id, generation, session, offset) = {
            let store = self.store.lock().await;
            let state = store.state();
            let Some(channel_id) = state.active_channel_id.clone() else {
                return Ok(LoadOutcome::NoActiveChannel);
            };
            let generation = store.generation();
            if state.is_loading_messages
                || self.older_in_flight.load(Ordering::SeqCst) == generation
            {
                return Ok(LoadOutcome::AlreadyLoading);
            }
            // Until a page is merged (the first fetch may have failed) there
            // is always something to load.
            if !state.messages.has_more
                && self.merged_generation.load(Ordering::SeqCst) == generation
            {
                return Ok(LoadOutcome::Exhausted);
            }
            self.older_in_flight.store(generation, Ordering::SeqCst);
            let session = self.paginator.current_session();
            (channel_id, generation, session, state.messages.next_offset)
        };

        let result = self.load_page(&channel_id, generation, session, offset).await;
        let _ = self.older_in_flight.compare_exchange(
            generation,
            0,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );

        match result {
            Ok(added) => {
                tracing::debug!(
                    "[ChannelSync] {} older messages for {} from offset {}",
                    added,
                    channel_id,
                    offset
                );
                Ok(LoadOutcome::Appended { added })
            }
            Err(e) if e.is_stale() => Ok(LoadOutcome::Superseded),
            Err(e) => {
                tracing::warn!("[ChannelSync] Loading older messages failed: {}", e);
                Err(e)
            }
        }
    }

    /// Optimistically shows a message the local user just sent. The push echo
    /// of the same message is absorbed as a duplicate.
    pub async fn apply_local_insert(&self, message: Message) -> MergeOutcome {
        self.store
            .lock()
            .await
            .merge_inbound(ChangeEvent::Insert(message))
    }

    /// Snapshot of the current view.
    pub fn state(&self) -> ChannelViewState {
        self.updates.borrow().clone()
    }

    /// Observes every view change.
    pub fn watch(&self) -> watch::Receiver<ChannelViewState> {
        self.updates.clone()
    }

    /// Clears the view and tears down the channel subscription.
    pub async fn shutdown(&self) {
        let _ = self.set_active_channel(None).await;
        self.ctx
            .subscriptions
            .shutdown(TopicKind::ChannelChanges)
            .await;
    }
}

impl Drop for ChannelSync {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

#[cfg(test)]
#[path = "sync_test.rs"]
mod tests;
