//! Backend implementations for computer and execution records.

mod base;
mod memory;
mod pocketbase;

pub use base::{AgentBackend, BackendError, BackendResult, Subscription, SubscriptionHandle};
pub use memory::MemoryBackend;
pub use pocketbase::{PocketBaseBackend, PocketBaseConfig};
