//! Domain types and collaborator contracts for the Huddle channel sync core.
//!
//! Nothing in this crate performs I/O. The application layer composes these
//! types into the sync components, and the infrastructure layer provides
//! concrete stores and transports.

pub mod change;
pub mod channel;
pub mod config;
pub mod error;
pub mod identity;
pub mod progress;

// Re-export common error type
pub use error::{HuddleError, Result};
