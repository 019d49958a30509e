use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{HuddleError, Result};

/// Row-level operation reported by the push transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A change notification as it comes off the wire.
///
/// Payload shape depends on the operation: inserts and updates carry the new
/// row in `record`, deletes carry the pre-deletion row in `old_record`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChange {
    /// Table the row lives in
    pub table: String,
    pub kind: ChangeKind,
    #[serde(default)]
    pub record: Option<Value>,
    #[serde(default)]
    pub old_record: Option<Value>,
    /// Server commit order within the topic
    pub commit_sequence: u64,
}

impl RawChange {
    /// The row a filter should be evaluated against.
    pub fn row(&self) -> Option<&Value> {
        match self.kind {
            ChangeKind::Delete => self.old_record.as_ref(),
            ChangeKind::Insert | ChangeKind::Update => self.record.as_ref(),
        }
    }
}

/// A typed change event.
///
/// For `Delete` the entity is the snapshot taken before deletion; the store
/// cannot report a post-state for a row that no longer exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "entity", rename_all = "snake_case")]
pub enum ChangeEvent<T> {
    Insert(T),
    Update(T),
    Delete(T),
}

impl<T> ChangeEvent<T> {
    pub fn kind(&self) -> ChangeKind {
        match self {
            Self::Insert(_) => ChangeKind::Insert,
            Self::Update(_) => ChangeKind::Update,
            Self::Delete(_) => ChangeKind::Delete,
        }
    }

    pub fn entity(&self) -> &T {
        match self {
            Self::Insert(entity) | Self::Update(entity) | Self::Delete(entity) => entity,
        }
    }

    pub fn into_entity(self) -> T {
        match self {
            Self::Insert(entity) | Self::Update(entity) | Self::Delete(entity) => entity,
        }
    }
}

impl<T: DeserializeOwned> ChangeEvent<T> {
    /// Decodes a wire-level change into its typed form.
    ///
    /// `topic` is only used to label the error.
    pub fn decode(topic: &str, raw: &RawChange) -> Result<Self> {
        let row = raw.row().ok_or_else(|| {
            HuddleError::decode(topic, format!("{:?} change without a row payload", raw.kind))
        })?;
        let entity: T = serde_json::from_value(row.clone())
            .map_err(|e| HuddleError::decode(topic, e.to_string()))?;

        Ok(match raw.kind {
            ChangeKind::Insert => Self::Insert(entity),
            ChangeKind::Update => Self::Update(entity),
            ChangeKind::Delete => Self::Delete(entity),
        })
    }
}
