use serde::{Deserialize, Serialize};

/// A named conversation scope.
///
/// Channels are created elsewhere; the sync core only references them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Unique channel identifier
    pub id: String,
    /// Project the channel belongs to
    pub project_id: String,
    /// Display name
    pub name: String,
}
