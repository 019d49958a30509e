//! Tracing layer that streams sync diagnostics to a channel.
//!
//! Events emitted from the `huddle_*` crates are captured and forwarded over a
//! tokio channel, so a devtools panel can show channel switches, subscription
//! transitions and dropped events as they happen.

use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// Only events whose target starts with this prefix are forwarded.
pub const SYNC_TARGET_PREFIX: &str = "huddle_";

/// One captured diagnostic event.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SyncDiagnostic {
    /// Event target (e.g., "huddle_application::sync")
    pub target: String,
    /// Log level (INFO, DEBUG, WARN, ERROR)
    pub level: String,
    /// Bracketed component prefix of the message, e.g. "ChannelSync"
    pub component: Option<String>,
    /// Message with the component prefix removed
    pub message: String,
    /// Structured fields other than the message
    pub fields: HashMap<String, Value>,
    /// Name of the span the event was recorded in
    pub span: Option<String>,
    pub timestamp: String,
}

pub struct SyncEventLayer {
    sender: mpsc::UnboundedSender<SyncDiagnostic>,
}

impl SyncEventLayer {
    pub fn new(sender: mpsc::UnboundedSender<SyncDiagnostic>) -> Self {
        Self { sender }
    }
}

impl<S> Layer<S> for SyncEventLayer
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let target = event.metadata().target();
        if !target.starts_with(SYNC_TARGET_PREFIX) {
            return;
        }

        let mut fields = HashMap::new();
        event.record(&mut FieldVisitor(&mut fields));
        let raw = match fields.remove("message") {
            Some(Value::String(message)) => message,
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let (component, message) = split_component(&raw);

        let diagnostic = SyncDiagnostic {
            target: target.to_string(),
            level: event.metadata().level().to_string(),
            component,
            message,
            fields,
            span: ctx.event_span(event).map(|span| span.name().to_string()),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        // Receiver gone: diagnostics are simply not wanted anymore.
        let _ = self.sender.send(diagnostic);
    }
}

/// Splits "[Component] text" into `(Some("Component"), "text")`.
fn split_component(raw: &str) -> (Option<String>, String) {
    if let Some(rest) = raw.strip_prefix('[')
        && let Some((component, message)) = rest.split_once(']')
    {
        return (Some(component.to_string()), message.trim_start().to_string());
    }
    (None, raw.to_string())
}

struct FieldVisitor<'a>(&'a mut HashMap<String, Value>);

impl tracing::field::Visit for FieldVisitor<'_> {
    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.insert(
            field.name().to_string(),
            serde_json::json!(format!("{:?}", value)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    fn capture(emit: impl FnOnce()) -> Vec<SyncDiagnostic> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscriber = tracing_subscriber::registry().with(SyncEventLayer::new(tx));
        tracing::subscriber::with_default(subscriber, emit);

        let mut captured = Vec::new();
        while let Ok(diagnostic) = rx.try_recv() {
            captured.push(diagnostic);
        }
        captured
    }

    #[test]
    fn test_forwards_sync_events_with_component() {
        let captured = capture(|| {
            tracing::info!(
                target: "huddle_application::sync",
                channel = "general",
                "[ChannelSync] Switching to channel general"
            );
        });

        assert_eq!(captured.len(), 1);
        let diagnostic = &captured[0];
        assert_eq!(diagnostic.level, "INFO");
        assert_eq!(diagnostic.component.as_deref(), Some("ChannelSync"));
        assert_eq!(diagnostic.message, "Switching to channel general");
        assert_eq!(diagnostic.fields.get("channel"), Some(&serde_json::json!("general")));
        assert!(diagnostic.span.is_none());
    }

    #[test]
    fn test_ignores_foreign_targets() {
        let captured = capture(|| {
            tracing::warn!(target: "hyper::proto", "connection closed");
        });
        assert!(captured.is_empty());
    }

    #[test]
    fn test_records_enclosing_span() {
        let captured = capture(|| {
            let span = tracing::info_span!(target: "huddle_application::sync", "switch");
            let _guard = span.enter();
            tracing::debug!(target: "huddle_application::sync", "plain message");
        });

        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].span.as_deref(), Some("switch"));
        assert!(captured[0].component.is_none());
    }

    #[test]
    fn test_split_component() {
        assert_eq!(
            split_component("[ProgressOverlay] Idle"),
            (Some("ProgressOverlay".to_string()), "Idle".to_string())
        );
        assert_eq!(split_component("no prefix"), (None, "no prefix".to_string()));
    }
}
