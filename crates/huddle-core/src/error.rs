//! Error types for the Huddle sync core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A shared error type for the sync core.
///
/// Every failure is scoped to a single channel or project context and is
/// recoverable by re-invoking the operation that produced it. The core never
/// retries on its own; callers decide retry and backoff policy.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HuddleError {
    /// A pagination request against the persistent store failed.
    ///
    /// The channel view is left untouched so a retry can reuse the same offset.
    #[error("Fetch failed for channel '{channel_id}': {message}")]
    Fetch { channel_id: String, message: String },

    /// Opening a push subscription failed. The subscription stays inactive.
    #[error("Subscription to '{topic}' failed: {message}")]
    Subscription { topic: String, message: String },

    /// An async result completed after its scope was superseded and was dropped.
    ///
    /// Internal signal only; public operations translate it into a
    /// `Superseded` outcome rather than surfacing it as a failure.
    #[error("Stale result discarded for scope '{scope}'")]
    StaleResultDiscarded { scope: String },

    /// No authenticated session is available.
    #[error("No authenticated session")]
    Unauthenticated,

    /// The current user may not subscribe to the requested scope.
    #[error("User '{user_id}' is not a member of '{scope}'")]
    Forbidden { scope: String, user_id: String },

    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// An inbound change payload could not be decoded into its typed form.
    #[error("Undecodable change on '{topic}': {message}")]
    Decode { topic: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization {
        format: String, // "TOML", "JSON", etc.
        message: String,
    },

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HuddleError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates a Fetch error
    pub fn fetch(channel_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            channel_id: channel_id.into(),
            message: message.into(),
        }
    }

    /// Creates a Subscription error
    pub fn subscription(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Subscription {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Creates a StaleResultDiscarded signal
    pub fn stale(scope: impl Into<String>) -> Self {
        Self::StaleResultDiscarded {
            scope: scope.into(),
        }
    }

    /// Creates a Forbidden error
    pub fn forbidden(scope: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self::Forbidden {
            scope: scope.into(),
            user_id: user_id.into(),
        }
    }

    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates a Decode error
    pub fn decode(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Check if this is a Fetch error
    pub fn is_fetch(&self) -> bool {
        matches!(self, Self::Fetch { .. })
    }

    /// Check if this is a Subscription error
    pub fn is_subscription(&self) -> bool {
        matches!(self, Self::Subscription { .. })
    }

    /// Check if this is the internal stale-result signal
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::StaleResultDiscarded { .. })
    }

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a config error
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true for errors caused by the caller's identity rather than
    /// by the data source or transport.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::Unauthenticated | Self::Forbidden { .. })
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for HuddleError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for HuddleError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for HuddleError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::ser::Error> for HuddleError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// Conversion from anyhow::Error, used by collaborator adapters that report
/// failures through anyhow.
impl From<anyhow::Error> for HuddleError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// A type alias for `Result<T, HuddleError>`.
pub type Result<T> = std::result::Result<T, HuddleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_display() {
        let err = HuddleError::fetch("general", "connection reset");
        assert_eq!(
            err.to_string(),
            "Fetch failed for channel 'general': connection reset"
        );
        assert!(err.is_fetch());
        assert!(!err.is_subscription());
    }

    #[test]
    fn test_access_denied_predicate() {
        assert!(HuddleError::Unauthenticated.is_access_denied());
        assert!(HuddleError::forbidden("general", "u1").is_access_denied());
        assert!(!HuddleError::stale("general").is_access_denied());
    }

    #[test]
    fn test_io_conversion_keeps_kind() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: HuddleError = io.into();
        match err {
            HuddleError::Io { message } => assert!(message.contains("NotFound")),
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
