use serde::{Deserialize, Serialize};

use super::message::MessagePage;

/// Snapshot of the active channel as presented to the UI.
///
/// `active_channel_id == None` always comes with an empty `messages` page and
/// `is_loading_messages == false`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelViewState {
    pub active_channel_id: Option<String>,
    pub messages: MessagePage,
    pub is_loading_messages: bool,
}

impl ChannelViewState {
    /// State right after switching to `channel_id`, before any fetch resolves.
    pub fn loading(channel_id: impl Into<String>) -> Self {
        Self {
            active_channel_id: Some(channel_id.into()),
            messages: MessagePage::empty(),
            is_loading_messages: true,
        }
    }

    /// Returns true when this state upholds the no-channel invariant.
    pub fn is_consistent(&self) -> bool {
        match self.active_channel_id {
            Some(_) => true,
            None => self.messages.is_empty() && !self.is_loading_messages,
        }
    }

    pub fn is_active(&self, channel_id: &str) -> bool {
        self.active_channel_id.as_deref() == Some(channel_id)
    }
}
