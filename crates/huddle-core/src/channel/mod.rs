//! Channel domain module.
//!
//! This module contains the channel-scoped domain models and the repository
//! interface for the persistent message store.
//!
//! # Module Structure
//!
//! - `model`: Channel identity (`Channel`)
//! - `message`: Message types (`Message`, `MessagePage`)
//! - `view`: The observable aggregate for the active channel (`ChannelViewState`)
//! - `repository`: Repository trait for paged message queries and membership lookups

mod message;
mod model;
mod repository;
mod view;

pub use message::{DEFAULT_PAGE_SIZE, Message, MessagePage};
pub use model::Channel;
pub use repository::{MessageRepository, StoredPage};
pub use view::ChannelViewState;
