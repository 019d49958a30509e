pub mod config_service;
pub mod in_memory_message_repository;
pub mod in_memory_push_transport;
pub mod local_backend;
pub mod paths;
pub mod session_provider;

pub use crate::config_service::ConfigService;
pub use crate::in_memory_message_repository::{InMemoryMessageRepository, JoinOutcome};
pub use crate::in_memory_push_transport::InMemoryPushTransport;
pub use crate::local_backend::LocalBackend;
pub use crate::session_provider::StaticSessionProvider;
