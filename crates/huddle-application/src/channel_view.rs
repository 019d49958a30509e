//! Channel view state store.
//!
//! `ChannelViewStore` is the authoritative state of the active channel. All
//! operations are synchronous and run to completion; async callers hold the
//! store only between suspension points, never across one.
//!
//! Every channel switch bumps a generation counter. Results of async work
//! (page fetches) carry the generation they were started under and are
//! rejected once it is no longer current.
//!
//! A page may have been read from the store before a change that has already
//! been applied here. Within a generation the store remembers deleted ids and
//! edits of messages not yet loaded, and applies them to every page it merges.

use huddle_core::change::ChangeEvent;
use huddle_core::channel::{ChannelViewState, Message, MessagePage};
use huddle_core::error::{HuddleError, Result};
use std::collections::{HashMap, HashSet};
use tokio::sync::watch;

/// What `merge_inbound` did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Replaced,
    Removed,
    /// Insert of a message already present
    Duplicate,
    /// Update or delete of a message not present
    Missing,
    /// The event belongs to a channel other than the active one
    ForeignChannel,
}

impl MergeOutcome {
    pub fn changed_state(self) -> bool {
        matches!(self, Self::Inserted | Self::Replaced | Self::Removed)
    }
}

pub struct ChannelViewStore {
    state: ChannelViewState,
    generation: u64,
    /// Ids deleted during the current generation
    tombstones: HashSet<String>,
    /// Latest update of each message that was not loaded when it arrived
    pending_edits: HashMap<String, Message>,
    notifier: watch::Sender<ChannelViewState>,
}

impl Default for ChannelViewStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelViewStore {
    pub fn new() -> Self {
        let (notifier, _) = watch::channel(ChannelViewState::default());
        Self {
            state: ChannelViewState::default(),
            generation: 0,
            tombstones: HashSet::new(),
            pending_edits: HashMap::new(),
            notifier,
        }
    }

    /// Observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<ChannelViewState> {
        self.notifier.subscribe()
    }

    pub fn get_state(&self) -> ChannelViewState {
        self.state.clone()
    }

    pub fn state(&self) -> &ChannelViewState {
        &self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    /// Switches the active channel and returns the new generation.
    ///
    /// The message list is cleared and, for a non-null channel, the store is
    /// marked loading before this returns. No message of the previous channel
    /// is ever observable under the new channel id.
    pub fn set_active_channel(&mut self, channel_id: Option<&str>) -> u64 {
        self.generation += 1;
        self.tombstones.clear();
        self.pending_edits.clear();
        self.state = match channel_id {
            Some(id) => ChannelViewState::loading(id),
            None => ChannelViewState::default(),
        };
        tracing::debug!(
            "[ChannelViewStore] Active channel -> {:?} (generation {})",
            channel_id,
            self.generation
        );
        self.publish();
        self.generation
    }

    /// Merges an older page fetched under `generation` in front of the loaded
    /// messages and clears the loading flag. Returns the number of messages
    /// added.
    ///
    /// Messages deleted during this generation are dropped from the page, and
    /// rows with a newer edit seen during this generation are replaced by it.
    /// `has_more` and `next_offset` are taken from `page` as-is.
    ///
    /// # Errors
    ///
    /// Returns `HuddleError::StaleResultDiscarded` when `generation` is no
    /// longer current; the state is left untouched.
    pub fn append_older_page(&mut self, generation: u64, page: MessagePage) -> Result<usize> {
        let Some(channel_id) = self.current_channel(generation)? else {
            return Err(HuddleError::stale("no active channel"));
        };

        let existing = std::mem::take(&mut self.state.messages.messages);
        let mut merged: Vec<Message> = page
            .messages
            .into_iter()
            .filter(|m| m.channel_id == channel_id)
            .filter(|m| !existing.iter().any(|e| e.id == m.id))
            .filter(|m| !self.tombstones.contains(&m.id))
            .map(|m| self.pending_edits.remove(&m.id).unwrap_or(m))
            .collect();
        let added = merged.len();
        merged.extend(existing);
        merged.sort_by_key(|m| m.order_key());

        self.state.messages = MessagePage {
            messages: merged,
            has_more: page.has_more,
            next_offset: page.next_offset,
        };
        self.state.is_loading_messages = false;
        self.publish();
        Ok(added)
    }

    /// Clears the loading flag after a failed load under `generation`,
    /// keeping the loaded messages and offsets as they were.
    pub fn fail_loading(&mut self, generation: u64) {
        if self.is_current(generation) && self.state.is_loading_messages {
            self.state.is_loading_messages = false;
            self.publish();
        }
    }

    /// Applies an inbound change to the loaded messages.
    ///
    /// - Insert: placed by commit order; ignored if the id is already present
    /// - Update: replaces the message with the same id; if absent, it is kept
    ///   for the page that will load it
    /// - Delete: removes the message with the same id; the id is remembered
    ///   so that no later page brings it back
    ///
    /// Events for any channel other than the active one are ignored.
    pub fn merge_inbound(&mut self, event: ChangeEvent<Message>) -> MergeOutcome {
        if !self.state.is_active(&event.entity().channel_id) {
            return MergeOutcome::ForeignChannel;
        }

        let outcome = match event {
            ChangeEvent::Insert(message) => {
                if self.state.messages.contains(&message.id) {
                    MergeOutcome::Duplicate
                } else {
                    self.insert_ordered(message);
                    MergeOutcome::Inserted
                }
            }
            ChangeEvent::Update(message) => {
                if self.tombstones.contains(&message.id) {
                    MergeOutcome::Missing
                } else if let Some(index) = self.state.messages.position(&message.id) {
                    self.state.messages.messages.remove(index);
                    self.insert_ordered(message);
                    MergeOutcome::Replaced
                } else {
                    self.pending_edits.insert(message.id.clone(), message);
                    MergeOutcome::Missing
                }
            }
            ChangeEvent::Delete(message) => {
                self.pending_edits.remove(&message.id);
                self.tombstones.insert(message.id.clone());
                match self.state.messages.position(&message.id) {
                    Some(index) => {
                        self.state.messages.messages.remove(index);
                        MergeOutcome::Removed
                    }
                    None => MergeOutcome::Missing,
                }
            }
        };

        if outcome.changed_state() {
            self.publish();
        }
        outcome
    }

    fn insert_ordered(&mut self, message: Message) {
        let key = message.order_key();
        let messages = &mut self.state.messages.messages;
        let index = messages.partition_point(|m| m.order_key() <= key);
        messages.insert(index, message);
    }

    fn current_channel(&self, generation: u64) -> Result<Option<String>> {
        if !self.is_current(generation) {
            return Err(HuddleError::stale(format!("generation {generation}")));
        }
        Ok(self.state.active_channel_id.clone())
    }

    fn publish(&self) {
        self.notifier.send_replace(self.state.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn message(channel: &str, id: &str, secs: i64) -> Message {
        Message {
            id: id.to_string(),
            channel_id: channel.to_string(),
            author_id: "u1".to_string(),
            body: format!("body {id}"),
            created_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            sequence: secs as u64,
        }
    }

    fn ids(store: &ChannelViewStore) -> Vec<String> {
        store
            .state()
            .messages
            .messages
            .iter()
            .map(|m| m.id.clone())
            .collect()
    }

    #[test]
    fn test_switch_clears_messages_and_marks_loading() {
        let mut store = ChannelViewStore::new();
        let generation = store.set_active_channel(Some("general"));
        store
            .append_older_page(
                generation,
                MessagePage {
                    messages: vec![message("general", "m1", 1)],
                    has_more: false,
                    next_offset: 1,
                },
            )
            .unwrap();

        for next in ["random", "general", "random"] {
            store.set_active_channel(Some(next));
            let state = store.get_state();
            assert!(state.messages.is_empty());
            assert!(state.is_loading_messages);
            assert!(state.is_active(next));
        }
    }

    #[test]
    fn test_null_channel_is_empty_and_idle() {
        let mut store = ChannelViewStore::new();
        store.set_active_channel(Some("general"));
        store.set_active_channel(None);
        let state = store.get_state();
        assert_eq!(state, ChannelViewState::default());
        assert!(state.is_consistent());
    }

    #[test]
    fn test_insert_is_idempotent() {
        let mut store = ChannelViewStore::new();
        store.set_active_channel(Some("general"));
        let event = ChangeEvent::Insert(message("general", "m1", 1));

        assert_eq!(store.merge_inbound(event.clone()), MergeOutcome::Inserted);
        let once = store.get_state();
        assert_eq!(store.merge_inbound(event), MergeOutcome::Duplicate);
        assert_eq!(store.get_state(), once);
    }

    #[test]
    fn test_inserts_keep_commit_order_despite_jitter() {
        let mut store = ChannelViewStore::new();
        store.set_active_channel(Some("general"));
        for secs in [3, 1, 4, 2, 5] {
            store.merge_inbound(ChangeEvent::Insert(message(
                "general",
                &format!("m{secs}"),
                secs,
            )));
        }
        assert_eq!(ids(&store), vec!["m1", "m2", "m3", "m4", "m5"]);
    }

    #[test]
    fn test_update_and_delete_are_noops_when_absent() {
        let mut store = ChannelViewStore::new();
        store.set_active_channel(Some("general"));
        assert_eq!(
            store.merge_inbound(ChangeEvent::Update(message("general", "m1", 1))),
            MergeOutcome::Missing
        );
        assert_eq!(
            store.merge_inbound(ChangeEvent::Delete(message("general", "m1", 1))),
            MergeOutcome::Missing
        );
        assert!(store.state().messages.is_empty());
    }

    #[test]
    fn test_update_replaces_and_delete_removes() {
        let mut store = ChannelViewStore::new();
        store.set_active_channel(Some("general"));
        store.merge_inbound(ChangeEvent::Insert(message("general", "m1", 1)));
        store.merge_inbound(ChangeEvent::Insert(message("general", "m2", 2)));

        let mut edited = message("general", "m1", 1);
        edited.body = "edited".to_string();
        assert_eq!(
            store.merge_inbound(ChangeEvent::Update(edited)),
            MergeOutcome::Replaced
        );
        assert_eq!(store.state().messages.messages[0].body, "edited");

        assert_eq!(
            store.merge_inbound(ChangeEvent::Delete(message("general", "m2", 2))),
            MergeOutcome::Removed
        );
        assert_eq!(ids(&store), vec!["m1"]);
    }

    #[test]
    fn test_foreign_channel_events_are_ignored() {
        let mut store = ChannelViewStore::new();
        store.set_active_channel(Some("general"));
        assert_eq!(
            store.merge_inbound(ChangeEvent::Insert(message("random", "m1", 1))),
            MergeOutcome::ForeignChannel
        );

        store.set_active_channel(None);
        assert_eq!(
            store.merge_inbound(ChangeEvent::Insert(message("general", "m1", 1))),
            MergeOutcome::ForeignChannel
        );
        assert!(store.state().is_consistent());
    }

    #[test]
    fn test_older_page_is_prepended_and_deduplicated() {
        let mut store = ChannelViewStore::new();
        let generation = store.set_active_channel(Some("general"));
        store.merge_inbound(ChangeEvent::Insert(message("general", "m5", 5)));

        let added = store
            .append_older_page(
                generation,
                MessagePage {
                    messages: vec![
                        message("general", "m3", 3),
                        message("general", "m4", 4),
                        message("general", "m5", 5),
                    ],
                    has_more: true,
                    next_offset: 3,
                },
            )
            .unwrap();

        assert_eq!(added, 2);
        assert_eq!(ids(&store), vec!["m3", "m4", "m5"]);
        assert!(store.state().messages.has_more);
        assert_eq!(store.state().messages.next_offset, 3);
        assert!(!store.state().is_loading_messages);
    }

    #[test]
    fn test_stale_page_is_rejected() {
        let mut store = ChannelViewStore::new();
        let stale = store.set_active_channel(Some("general"));
        store.set_active_channel(Some("random"));

        let err = store
            .append_older_page(
                stale,
                MessagePage {
                    messages: vec![message("general", "m1", 1)],
                    has_more: false,
                    next_offset: 1,
                },
            )
            .unwrap_err();

        assert!(err.is_stale());
        assert!(store.state().messages.is_empty());
        assert!(store.state().is_loading_messages);
    }

    #[test]
    fn test_page_read_before_delete_does_not_resurrect_message() {
        let mut store = ChannelViewStore::new();
        let generation = store.set_active_channel(Some("general"));
        assert_eq!(
            store.merge_inbound(ChangeEvent::Delete(message("general", "m2", 2))),
            MergeOutcome::Missing
        );
        // A late update of the deleted message changes nothing either.
        store.merge_inbound(ChangeEvent::Update(message("general", "m2", 2)));

        let added = store
            .append_older_page(
                generation,
                MessagePage {
                    messages: vec![message("general", "m1", 1), message("general", "m2", 2)],
                    has_more: false,
                    next_offset: 2,
                },
            )
            .unwrap();

        assert_eq!(added, 1);
        assert_eq!(ids(&store), vec!["m1"]);
        assert_eq!(store.state().messages.next_offset, 2);
    }

    #[test]
    fn test_page_read_before_update_shows_the_edit() {
        let mut store = ChannelViewStore::new();
        let generation = store.set_active_channel(Some("general"));
        let mut edited = message("general", "m1", 1);
        edited.body = "edited".to_string();
        assert_eq!(
            store.merge_inbound(ChangeEvent::Update(edited)),
            MergeOutcome::Missing
        );

        store
            .append_older_page(
                generation,
                MessagePage {
                    messages: vec![message("general", "m1", 1)],
                    has_more: false,
                    next_offset: 1,
                },
            )
            .unwrap();
        assert_eq!(store.state().messages.messages[0].body, "edited");
    }

    #[test]
    fn test_switch_forgets_deletes_and_edits() {
        let mut store = ChannelViewStore::new();
        store.set_active_channel(Some("general"));
        store.merge_inbound(ChangeEvent::Delete(message("general", "m1", 1)));
        let mut edited = message("general", "m2", 2);
        edited.body = "edited".to_string();
        store.merge_inbound(ChangeEvent::Update(edited));

        let generation = store.set_active_channel(Some("general"));
        store
            .append_older_page(
                generation,
                MessagePage {
                    messages: vec![message("general", "m1", 1), message("general", "m2", 2)],
                    has_more: false,
                    next_offset: 2,
                },
            )
            .unwrap();
        assert_eq!(ids(&store), vec!["m1", "m2"]);
        assert_eq!(store.state().messages.messages[1].body, "body m2");
    }

    #[test]
    fn test_fail_loading_keeps_offsets() {
        let mut store = ChannelViewStore::new();
        let generation = store.set_active_channel(Some("general"));
        store.fail_loading(generation);
        let state = store.get_state();
        assert!(!state.is_loading_messages);
        assert_eq!(state.messages.next_offset, 0);
    }

    #[tokio::test]
    async fn test_subscribers_see_reset_before_data() {
        let mut store = ChannelViewStore::new();
        let mut rx = store.subscribe();
        let generation = store.set_active_channel(Some("general"));

        assert!(rx.has_changed().unwrap());
        let seen = rx.borrow_and_update().clone();
        assert!(seen.is_loading_messages);
        assert!(seen.messages.is_empty());

        store
            .append_older_page(generation, MessagePage::empty())
            .unwrap();
        assert!(!rx.borrow_and_update().is_loading_messages);
    }
}
