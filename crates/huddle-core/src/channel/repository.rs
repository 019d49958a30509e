//! Message repository trait.
//!
//! Defines the interface to the persistent store backing channel history.

use async_trait::async_trait;

use super::message::Message;
use super::model::Channel;
use crate::error::Result;

/// Raw result of one paged query against the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredPage {
    /// Rows in ascending `created_at` order
    pub rows: Vec<Message>,
    /// Whether the store holds older rows past this page
    pub has_more: bool,
}

/// An abstract repository for channel history and membership lookups.
///
/// This trait decouples the sync core from the concrete store (a hosted
/// Postgres, a local cache, an in-memory fixture).
///
/// # Paging semantics
///
/// `offset` counts messages already loaded, newest first: offset `0` returns
/// the newest `limit` messages, and increasing the offset walks further back
/// in history. Rows inside a page are still returned oldest first.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Fetches one page of channel history.
    ///
    /// # Returns
    ///
    /// - `Ok(StoredPage)`: Rows plus the store's own `has_more` flag
    /// - `Err(_)`: The query failed
    async fn fetch_messages(
        &self,
        channel_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<StoredPage>;

    /// Finds a channel by its ID.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(Channel))`: Channel found
    /// - `Ok(None)`: Channel not found
    /// - `Err(_)`: Error occurred during retrieval
    async fn find_channel(&self, channel_id: &str) -> Result<Option<Channel>>;

    /// Returns whether `user_id` may read and subscribe to `channel_id`.
    async fn is_channel_member(&self, channel_id: &str, user_id: &str) -> Result<bool>;

    /// Returns whether `user_id` belongs to `project_id`.
    async fn is_project_member(&self, project_id: &str, user_id: &str) -> Result<bool>;
}
