//! Per-chat routing state for the relay.
//!
//! Resolves which agent backend, agent and project an inbound chat message is
//! forwarded to. Lookups are synchronous; the relay treats them as an
//! already-consistent read.
mod atomic_io;
mod file_store;
mod types;

pub use atomic_io::write_text_atomic;
pub use file_store::{
    ChatAgentRecord, ChatProjectRecord, FileRoutingStore, FileRoutingStoreConfig, RouteSummary,
    UserCredentialsRecord,
};
pub use types::{NotConfiguredReason, RoutingContext, RoutingDecision, RoutingError, RoutingResolver};
