//! Push transport trait.
//!
//! The push transport is the network-level provider of change notifications.
//! Topics are addressed by [`TopicKey`] and narrowed with a [`ChangeFilter`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::event::RawChange;
use super::topic::{ChangeFilter, TopicKey};
use crate::error::Result;

/// Transport-side identifier of an open stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransportHandle(pub Uuid);

impl TransportHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransportHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// An open transport stream.
///
/// `events` yields changes for a single topic in server commit order. The
/// receiver ends when the transport drops the stream.
#[derive(Debug)]
pub struct TransportStream {
    pub handle: TransportHandle,
    pub events: mpsc::Receiver<RawChange>,
}

/// Topic-addressed push provider with at-least-once delivery per topic.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Opens a stream for `topic`, delivering only changes matching `filter`.
    ///
    /// # Returns
    ///
    /// - `Ok(TransportStream)`: The stream is live
    /// - `Err(_)`: The transport refused or could not reach the server
    async fn open(&self, topic: &TopicKey, filter: &ChangeFilter) -> Result<TransportStream>;

    /// Terminates a stream. Closing an unknown or already-closed handle
    /// succeeds without effect.
    async fn close(&self, handle: TransportHandle) -> Result<()>;
}
