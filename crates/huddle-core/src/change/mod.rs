//! Change notification module.
//!
//! Types shared by the push transport and the change stream client: wire
//! changes, typed change events, topic addressing and subscription handles.

mod event;
mod subscription;
mod topic;
mod transport;

pub use event::{ChangeEvent, ChangeKind, RawChange};
pub use subscription::{ChangeSubscription, SubscriptionStatus};
pub use topic::{ChangeFilter, MESSAGES_TABLE, PROGRESS_EVENTS_TABLE, TopicKey, TopicKind};
pub use transport::{PushTransport, TransportHandle, TransportStream};
