//! In-memory backend that records every operation, for tests and local runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::base::{AgentBackend, BackendError, BackendResult, Subscription, SubscriptionHandle};
use crate::models::{
    Computer, ComputerPatch, ComputerStatus, Execution, ExecutionEvent, ExecutionPatch,
};

const EVENT_BUFFER: usize = 256;

/// Operations that can be made to fail on demand.
#[derive(Clone, Debug, Default)]
struct FailureFlags {
    status_updates: bool,
    execution_updates: bool,
    subscribe: bool,
    unsubscribe: bool,
}

/// Backend that keeps records and call history in memory.
#[derive(Clone)]
pub struct MemoryBackend {
    computer: Arc<Mutex<Computer>>,
    executions: Arc<Mutex<HashMap<String, Execution>>>,
    computer_updates: Arc<Mutex<Vec<ComputerPatch>>>,
    execution_updates: Arc<Mutex<Vec<(String, ExecutionPatch)>>>,
    subscribers: Arc<Mutex<Vec<mpsc::Sender<ExecutionEvent>>>>,
    subscribe_calls: Arc<AtomicUsize>,
    unsubscribe_calls: Arc<AtomicUsize>,
    failures: Arc<Mutex<FailureFlags>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(Computer {
            id: "computer-local".to_string(),
            name: "local".to_string(),
            ip: String::new(),
            mac: String::new(),
            region: String::new(),
            status: ComputerStatus::Offline,
            created: String::new(),
            updated: String::new(),
        })
    }
}

impl MemoryBackend {
    pub fn new(computer: Computer) -> Self {
        Self {
            computer: Arc::new(Mutex::new(computer)),
            executions: Arc::new(Mutex::new(HashMap::new())),
            computer_updates: Arc::new(Mutex::new(Vec::new())),
            execution_updates: Arc::new(Mutex::new(Vec::new())),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            subscribe_calls: Arc::new(AtomicUsize::new(0)),
            unsubscribe_calls: Arc::new(AtomicUsize::new(0)),
            failures: Arc::new(Mutex::new(FailureFlags::default())),
        }
    }

    pub fn computer(&self) -> Computer {
        self.computer.lock().expect("computer poisoned").clone()
    }

    pub fn execution(&self, execution_id: &str) -> Option<Execution> {
        self.executions
            .lock()
            .expect("executions poisoned")
            .get(execution_id)
            .cloned()
    }

    pub fn computer_updates(&self) -> Vec<ComputerPatch> {
        self.computer_updates
            .lock()
            .expect("computer updates poisoned")
            .clone()
    }

    /// Every status written, in order, including failed attempts.
    pub fn status_history(&self) -> Vec<ComputerStatus> {
        self.computer_updates()
            .into_iter()
            .filter_map(|patch| patch.status)
            .collect()
    }

    pub fn execution_updates(&self) -> Vec<(String, ExecutionPatch)> {
        self.execution_updates
            .lock()
            .expect("execution updates poisoned")
            .clone()
    }

    pub fn execution_updates_for(&self, execution_id: &str) -> Vec<ExecutionPatch> {
        self.execution_updates()
            .into_iter()
            .filter(|(id, _)| id == execution_id)
            .map(|(_, patch)| patch)
            .collect()
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn unsubscribe_calls(&self) -> usize {
        self.unsubscribe_calls.load(Ordering::SeqCst)
    }

    pub fn fail_status_updates(&self, fail: bool) {
        self.failures.lock().expect("failures poisoned").status_updates = fail;
    }

    pub fn fail_execution_updates(&self, fail: bool) {
        self.failures.lock().expect("failures poisoned").execution_updates = fail;
    }

    pub fn fail_subscribe(&self, fail: bool) {
        self.failures.lock().expect("failures poisoned").subscribe = fail;
    }

    pub fn fail_unsubscribe(&self, fail: bool) {
        self.failures.lock().expect("failures poisoned").unsubscribe = fail;
    }

    fn failures(&self) -> FailureFlags {
        self.failures.lock().expect("failures poisoned").clone()
    }

    /// Deliver an event to every live subscriber. Returns how many received it.
    pub async fn publish(&self, event: ExecutionEvent) -> usize {
        let senders = self
            .subscribers
            .lock()
            .expect("subscribers poisoned")
            .clone();
        let mut delivered = 0;
        for sender in senders {
            if sender.send(event.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Drop every subscriber channel, as if the realtime stream ended.
    pub fn close_subscriptions(&self) {
        self.subscribers
            .lock()
            .expect("subscribers poisoned")
            .clear();
    }
}

#[async_trait]
impl AgentBackend for MemoryBackend {
    async fn fetch_computer(&self) -> BackendResult<Computer> {
        Ok(self.computer())
    }

    async fn update_computer(
        &self,
        computer_id: &str,
        patch: &ComputerPatch,
    ) -> BackendResult<Computer> {
        self.computer_updates
            .lock()
            .expect("computer updates poisoned")
            .push(patch.clone());

        if patch.status.is_some() && self.failures().status_updates {
            return Err(BackendError::Message(
                "injected computer update failure".to_string(),
            ));
        }

        let mut computer = self.computer.lock().expect("computer poisoned");
        if computer.id != computer_id {
            return Err(BackendError::NotFound(computer_id.to_string()));
        }
        if let Some(ip) = &patch.ip {
            computer.ip = ip.clone();
        }
        if let Some(mac) = &patch.mac {
            computer.mac = mac.clone();
        }
        if let Some(status) = patch.status {
            computer.status = status;
        }
        Ok(computer.clone())
    }

    async fn update_execution(
        &self,
        execution_id: &str,
        patch: &ExecutionPatch,
    ) -> BackendResult<Execution> {
        self.execution_updates
            .lock()
            .expect("execution updates poisoned")
            .push((execution_id.to_string(), patch.clone()));

        if self.failures().execution_updates {
            return Err(BackendError::Message(
                "injected execution update failure".to_string(),
            ));
        }

        let mut executions = self.executions.lock().expect("executions poisoned");
        let execution = executions
            .entry(execution_id.to_string())
            .or_insert_with(|| Execution::pending(execution_id, ""));
        if let Some(logs) = &patch.logs {
            execution.logs = logs.clone();
        }
        if let Some(completed) = patch.completed {
            execution.completed = completed;
        }
        Ok(execution.clone())
    }

    async fn subscribe_executions(&self, computer_id: &str) -> BackendResult<Subscription> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if self.failures().subscribe {
            return Err(BackendError::Subscription(format!(
                "injected subscribe failure for {computer_id}"
            )));
        }

        let (sender, events) = mpsc::channel(EVENT_BUFFER);
        self.subscribers
            .lock()
            .expect("subscribers poisoned")
            .push(sender);

        Ok(Subscription {
            events,
            handle: Box::new(MemorySubscription {
                backend: self.clone(),
                closed: AtomicBool::new(false),
            }),
        })
    }
}

struct MemorySubscription {
    backend: MemoryBackend,
    closed: AtomicBool,
}

#[async_trait]
impl SubscriptionHandle for MemorySubscription {
    async fn unsubscribe(&self) -> BackendResult<()> {
        self.backend.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
        if self.backend.failures().unsubscribe {
            return Err(BackendError::Subscription(
                "injected unsubscribe failure".to_string(),
            ));
        }
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.backend.close_subscriptions();
        }
        Ok(())
    }
}
