//! Channel message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Page size used when the caller does not specify one.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// A single message posted to a channel.
///
/// Messages are ordered by `created_at` and then by `sequence`, which the
/// store assigns in commit order. The pair is the ordering key everywhere a
/// loaded sequence is kept sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique within the channel
    pub id: String,
    pub channel_id: String,
    pub author_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    /// Position marker assigned by the store in commit order
    #[serde(default)]
    pub sequence: u64,
}

impl Message {
    /// Returns the key messages are ordered by.
    pub fn order_key(&self) -> (DateTime<Utc>, u64) {
        (self.created_at, self.sequence)
    }
}

/// A bounded, ordered batch of messages.
///
/// The same shape doubles as the loaded sequence inside
/// [`ChannelViewState`](super::ChannelViewState): `has_more` and `next_offset`
/// always come from the most recent store response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePage {
    /// Messages in ascending `created_at` order
    pub messages: Vec<Message>,
    /// Whether older history exists beyond this page
    pub has_more: bool,
    /// Offset to request the next (older) page with
    pub next_offset: usize,
}

impl MessagePage {
    /// The page returned for a channel without any messages.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.messages.iter().any(|m| m.id == message_id)
    }

    pub fn position(&self, message_id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.id == message_id)
    }
}
