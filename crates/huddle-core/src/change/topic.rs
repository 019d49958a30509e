use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::event::{ChangeKind, RawChange};

/// Table holding channel messages.
pub const MESSAGES_TABLE: &str = "messages";
/// Table holding background-job progress events.
pub const PROGRESS_EVENTS_TABLE: &str = "progress_events";

/// The kinds of topic the core subscribes to. At most one subscription per
/// kind is active at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicKind {
    /// Row-level changes of one channel's messages
    ChannelChanges,
    /// Progress-event inserts for one project
    ProgressChanges,
}

impl TopicKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ChannelChanges => "channel-changes",
            Self::ProgressChanges => "progress-changes",
        }
    }
}

impl fmt::Display for TopicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address of one push topic: a kind plus the scoping key (channel id or
/// project id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicKey {
    pub kind: TopicKind,
    pub scope: String,
}

impl TopicKey {
    pub fn channel(channel_id: impl Into<String>) -> Self {
        Self {
            kind: TopicKind::ChannelChanges,
            scope: channel_id.into(),
        }
    }

    pub fn progress(project_id: impl Into<String>) -> Self {
        Self {
            kind: TopicKind::ProgressChanges,
            scope: project_id.into(),
        }
    }
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.scope)
    }
}

/// Filter-by-column predicate handed to the push transport.
///
/// A change matches when it targets `table`, its kind is listed in `kinds`
/// (an empty list accepts every kind), and the row's `column` equals `value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeFilter {
    pub table: String,
    pub column: String,
    pub value: String,
    #[serde(default)]
    pub kinds: Vec<ChangeKind>,
}

impl ChangeFilter {
    /// All message changes of one channel.
    pub fn messages_in(channel_id: impl Into<String>) -> Self {
        Self {
            table: MESSAGES_TABLE.to_string(),
            column: "channel_id".to_string(),
            value: channel_id.into(),
            kinds: Vec::new(),
        }
    }

    /// Progress-event inserts of one project.
    pub fn progress_for(project_id: impl Into<String>) -> Self {
        Self {
            table: PROGRESS_EVENTS_TABLE.to_string(),
            column: "project_id".to_string(),
            value: project_id.into(),
            kinds: vec![ChangeKind::Insert],
        }
    }

    pub fn matches(&self, change: &RawChange) -> bool {
        if change.table != self.table {
            return false;
        }
        if !self.kinds.is_empty() && !self.kinds.contains(&change.kind) {
            return false;
        }
        match change.row().and_then(|row| row.get(&self.column)) {
            Some(Value::String(s)) => s == &self.value,
            Some(other) => other.to_string() == self.value,
            None => false,
        }
    }
}

impl fmt::Display for ChangeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}=eq.{}", self.table, self.column, self.value)
    }
}
