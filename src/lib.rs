//! Execution agent - receives pushed code executions for this computer, runs
//! each in a child interpreter process, and reports results and machine
//! status back to the backend.

pub mod agent;
pub mod backends;
pub mod config;
pub mod ledger;
pub mod models;
pub mod network;
pub mod observability;
pub mod runner;

pub use agent::{Agent, AgentOptions, EventDisposition, STARTED_LOG, ShutdownReport};
pub use backends::{
    AgentBackend, BackendError, BackendResult, MemoryBackend, PocketBaseBackend, PocketBaseConfig,
    Subscription, SubscriptionHandle,
};
pub use config::AgentConfig;
pub use ledger::ExecutionLedger;
pub use models::{
    Computer, ComputerPatch, ComputerStatus, EventAction, Execution, ExecutionEvent,
    ExecutionPatch,
};
pub use network::HostIdentity;
pub use observability::ObservabilityOptions;
pub use runner::{RunnerConfig, SandboxRunner};
