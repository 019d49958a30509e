//! Application layer for Huddle.
//!
//! This crate provides the real-time channel synchronization services that
//! coordinate the domain types of `huddle-core` with the collaborators behind
//! its traits.

pub mod change_stream;
pub mod channel_view;
pub mod context;
pub mod pagination;
pub mod progress;
pub mod subscription;
pub mod sync;

pub use change_stream::ChangeStreamClient;
pub use channel_view::{ChannelViewStore, MergeOutcome};
pub use context::SyncContext;
pub use pagination::{MessagePaginator, SessionToken};
pub use progress::{OverlayState, ProgressOverlay, ProgressTracker, TrackOutcome};
pub use subscription::{
    Activation, LifecycleState, RescopePolicy, ScopeTicket, SubscriptionLifecycleManager,
};
pub use sync::{ChannelSync, LoadOutcome, SwitchOutcome};
