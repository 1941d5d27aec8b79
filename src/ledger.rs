//! Dedup and active-task accounting for dispatched executions.

use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct LedgerState {
    executed: HashSet<String>,
    active: HashSet<String>,
}

/// Tracks which executions were dispatched and which are still running.
///
/// Every operation takes the inner lock exactly once, so the combined
/// check-and-mutate steps (`mark_if_new`, `add_active`, `remove_active`) are
/// atomic with respect to concurrent dispatches. The lock is never held across
/// an await point.
#[derive(Debug, Default)]
pub struct ExecutionLedger {
    state: Mutex<LedgerState>,
}

impl ExecutionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut LedgerState) -> T) -> T {
        // The state is two plain sets; a panic mid-update cannot leave them
        // inconsistent, so a poisoned lock is still usable.
        let mut guard = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    pub fn is_marked(&self, execution_id: &str) -> bool {
        self.with_state(|state| state.executed.contains(execution_id))
    }

    pub fn mark(&self, execution_id: &str) {
        self.with_state(|state| {
            state.executed.insert(execution_id.to_string());
        });
    }

    /// Mark the execution, returning true if it had not been marked before.
    pub fn mark_if_new(&self, execution_id: &str) -> bool {
        self.with_state(|state| state.executed.insert(execution_id.to_string()))
    }

    /// Add to the active set. Returns true when the set was empty beforehand.
    pub fn add_active(&self, execution_id: &str) -> bool {
        self.with_state(|state| {
            let was_empty = state.active.is_empty();
            state.executed.insert(execution_id.to_string());
            state.active.insert(execution_id.to_string());
            was_empty
        })
    }

    /// Remove from the active set. Returns true when the set is now empty.
    pub fn remove_active(&self, execution_id: &str) -> bool {
        self.with_state(|state| {
            state.active.remove(execution_id);
            state.active.is_empty()
        })
    }

    pub fn active_count(&self) -> usize {
        self.with_state(|state| state.active.len())
    }

    pub fn executed_count(&self) -> usize {
        self.with_state(|state| state.executed.len())
    }
}
