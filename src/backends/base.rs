//! Backend interface the agent consumes: computer and execution records plus
//! the realtime execution feed.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::models::{Computer, ComputerPatch, Execution, ExecutionEvent, ExecutionPatch};

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("backend responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("subscription failed: {0}")]
    Subscription(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Teardown handle for a realtime subscription. Unsubscribing twice is a
/// no-op.
#[async_trait]
pub trait SubscriptionHandle: Send + Sync {
    async fn unsubscribe(&self) -> BackendResult<()>;
}

/// Live execution feed. The channel closes when the underlying stream ends.
pub struct Subscription {
    pub events: mpsc::Receiver<ExecutionEvent>,
    pub handle: Box<dyn SubscriptionHandle>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

/// Record store and push channel for one agent credential.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// The computer record associated with this agent's credential.
    async fn fetch_computer(&self) -> BackendResult<Computer>;

    /// Partially update a computer record.
    async fn update_computer(
        &self,
        computer_id: &str,
        patch: &ComputerPatch,
    ) -> BackendResult<Computer>;

    /// Partially update an execution record.
    async fn update_execution(
        &self,
        execution_id: &str,
        patch: &ExecutionPatch,
    ) -> BackendResult<Execution>;

    /// Subscribe to changes of executions owned by `computer_id`. Delivery is
    /// at-least-once.
    async fn subscribe_executions(&self, computer_id: &str) -> BackendResult<Subscription>;
}
