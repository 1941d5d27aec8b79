//! Execution orchestrator.
//!
//! Receives execution events from the backend feed, deduplicates them through
//! the [`ExecutionLedger`], dispatches new work to the [`SandboxRunner`] on a
//! supervised task set, and keeps the computer's status in step with the
//! number of running executions: `Offline -> Idle -> Running <-> Idle`, and
//! back to `Offline` from any state on shutdown.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::backends::{AgentBackend, BackendError, BackendResult, Subscription, SubscriptionHandle};
use crate::config::AgentConfig;
use crate::ledger::ExecutionLedger;
use crate::models::{
    Computer, ComputerPatch, ComputerStatus, EventAction, Execution, ExecutionEvent,
    ExecutionPatch,
};
use crate::network::HostIdentity;
use crate::runner::SandboxRunner;

/// Progress marker written before an execution starts running.
pub const STARTED_LOG: &str = "Execution started...\n";

#[derive(Clone, Debug, Default)]
pub struct AgentOptions {
    /// Wall-clock limit handed to the runner for every execution.
    pub execution_timeout: Option<Duration>,
    /// How long shutdown waits for in-flight executions before detaching them.
    pub shutdown_grace: Duration,
    /// Only newly created executions are dispatched; updates are ignored.
    pub create_events_only: bool,
}

impl From<&AgentConfig> for AgentOptions {
    fn from(config: &AgentConfig) -> Self {
        Self {
            execution_timeout: config.execution_timeout,
            shutdown_grace: config.shutdown_grace,
            create_events_only: config.create_events_only,
        }
    }
}

/// What the event handler did with one event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventDisposition {
    /// Dispatch scheduled.
    Dispatched,
    /// Identifier was already seen.
    Duplicate,
    /// Record already completed; marked but not run.
    AlreadyCompleted,
    /// Event kind is not acted upon.
    Ignored,
}

/// Outcome of the shutdown sequence.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub offline_written: bool,
    /// `None` when there was no subscription to tear down.
    pub unsubscribed: Option<bool>,
    pub finished_during_grace: usize,
    pub detached: usize,
}

struct AgentInner<B> {
    backend: Arc<B>,
    ledger: ExecutionLedger,
    runner: SandboxRunner,
    // Also serialises status writes.
    computer: tokio::sync::Mutex<Computer>,
    computer_id: String,
    options: AgentOptions,
    shutting_down: AtomicBool,
}

pub struct Agent<B> {
    inner: Arc<AgentInner<B>>,
    tasks: Mutex<JoinSet<()>>,
    // Dispatches still running when shutdown finished.
    detached: Mutex<Vec<JoinSet<()>>>,
}

impl<B> Drop for Agent<B> {
    fn drop(&mut self) {
        // Dropping a JoinSet aborts its tasks; executions must outlive the agent.
        let tasks = self
            .tasks
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        tasks.detach_all();
        let detached = self
            .detached
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for mut set in detached.drain(..) {
            set.detach_all();
        }
    }
}

impl<B> Agent<B>
where
    B: AgentBackend + 'static,
{
    /// Fetch this agent's computer record and mark it idle with the probed
    /// network identity.
    pub async fn initialize(
        backend: Arc<B>,
        runner: SandboxRunner,
        options: AgentOptions,
        identity: HostIdentity,
    ) -> BackendResult<Self> {
        let computer = backend.fetch_computer().await?;
        let patch = ComputerPatch {
            ip: identity.ip,
            mac: identity.mac,
            status: Some(ComputerStatus::Idle),
        };
        let computer = backend.update_computer(&computer.id, &patch).await?;

        info!(
            computer_id = %computer.id,
            name = %computer.name,
            ip = %computer.ip,
            "agent initialized for computer"
        );

        Ok(Self {
            inner: Arc::new(AgentInner {
                backend,
                ledger: ExecutionLedger::new(),
                runner,
                computer_id: computer.id.clone(),
                computer: tokio::sync::Mutex::new(computer),
                options,
                shutting_down: AtomicBool::new(false),
            }),
            tasks: Mutex::new(JoinSet::new()),
            detached: Mutex::new(Vec::new()),
        })
    }

    pub fn computer_id(&self) -> &str {
        &self.inner.computer_id
    }

    pub async fn computer(&self) -> Computer {
        self.inner.computer.lock().await.clone()
    }

    pub fn ledger(&self) -> &ExecutionLedger {
        &self.inner.ledger
    }

    /// Dispatches still tracked by the task set.
    pub fn in_flight(&self) -> usize {
        self.lock_tasks().len()
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, JoinSet<()>> {
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Handle one push event. Never waits for the execution itself.
    pub fn on_execution_event(&self, event: ExecutionEvent) -> EventDisposition {
        match event.action {
            EventAction::Delete => return EventDisposition::Ignored,
            EventAction::Update if self.inner.options.create_events_only => {
                return EventDisposition::Ignored;
            }
            EventAction::Create | EventAction::Update => {}
        }

        let execution = event.record;
        if execution.id.is_empty() {
            warn!("ignoring execution event without an id");
            return EventDisposition::Ignored;
        }

        // Check and mark in one step, before anything is scheduled, so a
        // replayed event racing this one is rejected.
        if !self.inner.ledger.mark_if_new(&execution.id) {
            debug!(execution_id = %execution.id, "duplicate execution event");
            return EventDisposition::Duplicate;
        }

        if execution.completed {
            debug!(execution_id = %execution.id, "execution already completed");
            return EventDisposition::AlreadyCompleted;
        }

        let inner = Arc::clone(&self.inner);
        self.lock_tasks()
            .spawn(async move { inner.process_execution(execution).await });
        EventDisposition::Dispatched
    }

    fn lock_detached(&self) -> std::sync::MutexGuard<'_, Vec<JoinSet<()>>> {
        self.detached
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Executions left running by [`Agent::shutdown`].
    pub fn detached_count(&self) -> usize {
        self.lock_detached().iter().map(JoinSet::len).sum()
    }

    /// Wait for executions left running by [`Agent::shutdown`] to write their
    /// results. Dropping this future aborts them.
    pub async fn wait_for_detached(&self) -> usize {
        let sets = std::mem::take(&mut *self.lock_detached());
        let mut finished = 0;
        for mut set in sets {
            finished += join_all(&mut set).await;
        }
        finished
    }

    fn reap_finished(&self) {
        let mut tasks = self.lock_tasks();
        while let Some(result) = tasks.try_join_next() {
            if let Err(err) = result {
                error!(error = %err, "execution task failed");
            }
        }
    }

    /// Wait for every dispatched execution to finish.
    pub async fn wait_for_dispatches(&self) -> usize {
        let mut tasks = std::mem::take(&mut *self.lock_tasks());
        join_all(&mut tasks).await
    }

    /// Subscribe to the execution feed and handle events until `shutdown`
    /// resolves or the feed fails, then run the shutdown sequence.
    pub async fn run<F>(&self, shutdown: F) -> BackendResult<ShutdownReport>
    where
        F: Future<Output = ()>,
    {
        info!(computer_id = %self.inner.computer_id, "subscribing to executions");
        let subscription = match self
            .inner
            .backend
            .subscribe_executions(&self.inner.computer_id)
            .await
        {
            Ok(subscription) => subscription,
            Err(err) => {
                error!(error = %err, "failed to subscribe to executions");
                self.shutdown(None).await;
                return Err(err);
            }
        };
        let Subscription { mut events, handle } = subscription;
        info!("subscription active, waiting for executions");

        tokio::pin!(shutdown);
        let outcome = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break Ok(());
                }
                event = events.recv() => match event {
                    Some(event) => {
                        self.on_execution_event(event);
                        self.reap_finished();
                    }
                    None => {
                        error!("execution feed closed");
                        break Err(BackendError::Subscription("execution feed closed".into()));
                    }
                },
            }
        };

        let report = self.shutdown(Some(&*handle)).await;
        outcome.map(|()| report)
    }

    /// Force the computer offline and tear down the subscription. Each step is
    /// attempted regardless of the other's outcome.
    ///
    /// Executions still running afterwards are not cancelled; they are kept
    /// for [`Agent::wait_for_detached`] and left to run if the agent is dropped.
    pub async fn shutdown(&self, subscription: Option<&dyn SubscriptionHandle>) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        let mut tasks = std::mem::take(&mut *self.lock_tasks());

        let grace = self.inner.options.shutdown_grace;
        if !tasks.is_empty() && !grace.is_zero() {
            info!(
                in_flight = tasks.len(),
                grace_secs = grace.as_secs_f64(),
                "waiting for running executions"
            );
            let mut finished = 0;
            let _ = tokio::time::timeout(grace, async {
                while let Some(result) = tasks.join_next().await {
                    finished += 1;
                    if let Err(err) = result {
                        error!(error = %err, "execution task failed");
                    }
                }
            })
            .await;
            report.finished_during_grace = finished;
        }

        report.offline_written = self.inner.force_offline().await;

        if let Some(handle) = subscription {
            match handle.unsubscribe().await {
                Ok(()) => {
                    info!("unsubscribed from executions");
                    report.unsubscribed = Some(true);
                }
                Err(err) => {
                    error!(error = %err, "error unsubscribing");
                    report.unsubscribed = Some(false);
                }
            }
        }

        report.detached = tasks.len();
        if report.detached > 0 {
            warn!(
                in_flight = report.detached,
                "executions still running after shutdown"
            );
            self.lock_detached().push(tasks);
        }
        report
    }
}

async fn join_all(tasks: &mut JoinSet<()>) -> usize {
    let mut finished = 0;
    while let Some(result) = tasks.join_next().await {
        finished += 1;
        if let Err(err) = result {
            error!(error = %err, "execution task failed");
        }
    }
    finished
}

impl<B> AgentInner<B>
where
    B: AgentBackend,
{
    async fn process_execution(&self, execution: Execution) {
        let execution_id = execution.id.as_str();

        if self.ledger.add_active(execution_id) {
            self.transition_status(ComputerStatus::Running).await;
        }
        info!(
            execution_id,
            active = self.ledger.active_count(),
            "executing task"
        );

        if let Err(err) = self
            .backend
            .update_execution(execution_id, &ExecutionPatch::started(STARTED_LOG))
            .await
        {
            warn!(execution_id, error = %err, "failed to write start marker");
        }

        let logs = self
            .runner
            .execute(
                &execution.executable,
                execution_id,
                self.options.execution_timeout,
            )
            .await;

        if let Err(err) = self
            .backend
            .update_execution(execution_id, &ExecutionPatch::finished(logs))
            .await
        {
            error!(execution_id, error = %err, "failed to write execution result");
        }

        if self.ledger.remove_active(execution_id) {
            self.transition_status(ComputerStatus::Idle).await;
        }
        info!(
            execution_id,
            remaining = self.ledger.active_count(),
            "task completed"
        );
    }

    /// Bring the remote status in line with the active set.
    ///
    /// `trigger` is what the caller observed when it crossed the empty/non-empty
    /// boundary; by the time the lock is held another dispatch may have crossed
    /// it back, so the target is re-read from the ledger.
    async fn transition_status(&self, trigger: ComputerStatus) {
        let mut computer = self.computer.lock().await;
        if self.shutting_down.load(Ordering::SeqCst) {
            debug!(%trigger, "shutting down, status transition skipped");
            return;
        }

        let target = if self.ledger.active_count() > 0 {
            ComputerStatus::Running
        } else {
            ComputerStatus::Idle
        };
        if target != trigger {
            debug!(%trigger, %target, "status trigger superseded");
        }
        if computer.status == target {
            return;
        }

        match self
            .backend
            .update_computer(&self.computer_id, &ComputerPatch::status(target))
            .await
        {
            Ok(updated) => {
                *computer = updated;
                info!(status = %target, "computer status updated");
            }
            Err(err) => {
                warn!(status = %target, error = %err, "failed to update computer status");
            }
        }
    }

    async fn force_offline(&self) -> bool {
        let mut computer = self.computer.lock().await;
        self.shutting_down.store(true, Ordering::SeqCst);
        match self
            .backend
            .update_computer(
                &self.computer_id,
                &ComputerPatch::status(ComputerStatus::Offline),
            )
            .await
        {
            Ok(updated) => {
                *computer = updated;
                info!("computer marked offline");
                true
            }
            Err(err) => {
                error!(error = %err, "failed to mark computer offline");
                false
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::backends::MemoryBackend;
    use crate::runner::RunnerConfig;

    // Shell scripts keep these tests independent of a Python install.
    fn shell_runner(dir: &std::path::Path) -> SandboxRunner {
        SandboxRunner::new(RunnerConfig {
            interpreter: "sh".into(),
            work_dir: dir.to_path_buf(),
            artifact_suffix: ".sh".to_string(),
        })
    }

    async fn agent_with(
        backend: &MemoryBackend,
        dir: &std::path::Path,
        options: AgentOptions,
    ) -> Agent<MemoryBackend> {
        Agent::initialize(
            Arc::new(backend.clone()),
            shell_runner(dir),
            options,
            HostIdentity {
                ip: Some("10.0.0.5".to_string()),
                mac: None,
            },
        )
        .await
        .expect("initialize agent")
    }

    #[tokio::test]
    async fn test_initialize_marks_computer_idle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = MemoryBackend::default();
        let agent = agent_with(&backend, dir.path(), AgentOptions::default()).await;

        assert_eq!(agent.computer().await.status, ComputerStatus::Idle);
        assert_eq!(backend.computer().ip, "10.0.0.5");
        assert_eq!(backend.status_history(), vec![ComputerStatus::Idle]);
    }

    #[tokio::test]
    async fn test_duplicate_events_dispatch_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = MemoryBackend::default();
        let agent = agent_with(&backend, dir.path(), AgentOptions::default()).await;
        let execution = Execution::pending("e1", "echo hello");

        assert_eq!(
            agent.on_execution_event(ExecutionEvent::created(execution.clone())),
            EventDisposition::Dispatched
        );
        assert_eq!(
            agent.on_execution_event(ExecutionEvent::updated(execution)),
            EventDisposition::Duplicate
        );
        agent.wait_for_dispatches().await;

        let updates = backend.execution_updates_for("e1");
        assert_eq!(
            updates,
            vec![
                ExecutionPatch::started(STARTED_LOG),
                ExecutionPatch::finished("hello\n"),
            ]
        );
    }

    #[tokio::test]
    async fn test_completed_event_is_marked_but_not_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = MemoryBackend::default();
        let agent = agent_with(&backend, dir.path(), AgentOptions::default()).await;
        let mut execution = Execution::pending("e1", "echo hello");
        execution.completed = true;

        assert_eq!(
            agent.on_execution_event(ExecutionEvent::updated(execution.clone())),
            EventDisposition::AlreadyCompleted
        );
        execution.completed = false;
        assert_eq!(
            agent.on_execution_event(ExecutionEvent::updated(execution)),
            EventDisposition::Duplicate
        );
        agent.wait_for_dispatches().await;

        assert!(backend.execution_updates().is_empty());
        assert!(agent.ledger().is_marked("e1"));
    }

    #[tokio::test]
    async fn test_delete_and_filtered_updates_are_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = MemoryBackend::default();
        let agent = agent_with(
            &backend,
            dir.path(),
            AgentOptions {
                create_events_only: true,
                ..AgentOptions::default()
            },
        )
        .await;

        let deleted = ExecutionEvent {
            action: EventAction::Delete,
            record: Execution::pending("e1", "echo hi"),
        };
        assert_eq!(agent.on_execution_event(deleted), EventDisposition::Ignored);
        assert_eq!(
            agent.on_execution_event(ExecutionEvent::updated(Execution::pending("e1", "echo hi"))),
            EventDisposition::Ignored
        );
        assert!(!agent.ledger().is_marked("e1"));
        assert_eq!(
            agent.on_execution_event(ExecutionEvent::created(Execution::pending("e1", "echo hi"))),
            EventDisposition::Dispatched
        );
        agent.wait_for_dispatches().await;
    }

    #[tokio::test]
    async fn test_single_execution_toggles_status_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = MemoryBackend::default();
        let agent = agent_with(&backend, dir.path(), AgentOptions::default()).await;

        agent.on_execution_event(ExecutionEvent::created(Execution::pending("e1", "echo hi")));
        agent.wait_for_dispatches().await;

        assert_eq!(
            backend.status_history(),
            vec![
                ComputerStatus::Idle,
                ComputerStatus::Running,
                ComputerStatus::Idle
            ]
        );
        assert_eq!(agent.ledger().active_count(), 0);
    }

    #[tokio::test]
    async fn test_overlapping_executions_toggle_status_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = MemoryBackend::default();
        let agent = agent_with(&backend, dir.path(), AgentOptions::default()).await;

        for idx in 0..4 {
            agent.on_execution_event(ExecutionEvent::created(Execution::pending(
                format!("e{idx}"),
                format!("sleep 0.{}; echo {idx}", 3 + idx),
            )));
        }
        agent.wait_for_dispatches().await;

        assert_eq!(
            backend.status_history(),
            vec![
                ComputerStatus::Idle,
                ComputerStatus::Running,
                ComputerStatus::Idle
            ]
        );
        for idx in 0..4 {
            let execution = backend.execution(&format!("e{idx}")).expect("execution");
            assert!(execution.completed);
            assert_eq!(execution.logs, format!("{idx}\n"));
        }
    }

    #[tokio::test]
    async fn test_status_failures_do_not_block_results() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = MemoryBackend::default();
        let agent = agent_with(&backend, dir.path(), AgentOptions::default()).await;
        backend.fail_status_updates(true);

        agent.on_execution_event(ExecutionEvent::created(Execution::pending(
            "e1",
            "echo oops >&2; exit 3",
        )));
        agent.wait_for_dispatches().await;

        let execution = backend.execution("e1").expect("execution");
        assert!(execution.completed);
        assert_eq!(execution.logs, "Errors:\noops\n\n\nProcess exited with code 3");
        // The failed Running write left the mirror idle, so no Idle write follows.
        assert_eq!(
            backend.status_history(),
            vec![ComputerStatus::Idle, ComputerStatus::Running]
        );
    }

    #[tokio::test]
    async fn test_timeout_is_applied_to_executions() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = MemoryBackend::default();
        let agent = agent_with(
            &backend,
            dir.path(),
            AgentOptions {
                execution_timeout: Some(Duration::from_millis(300)),
                ..AgentOptions::default()
            },
        )
        .await;

        agent.on_execution_event(ExecutionEvent::created(Execution::pending("e1", "exec sleep 5")));
        agent.wait_for_dispatches().await;

        let execution = backend.execution("e1").expect("execution");
        assert!(execution.completed);
        assert!(
            execution.logs.starts_with("Execution timed out after 0.3 seconds."),
            "got {:?}",
            execution.logs
        );
    }

    #[tokio::test]
    async fn test_shutdown_attempts_both_steps_when_they_fail() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = MemoryBackend::default();
        let agent = agent_with(&backend, dir.path(), AgentOptions::default()).await;
        backend.fail_status_updates(true);
        backend.fail_unsubscribe(true);

        let report = agent.run(async {}).await.expect("run");

        assert!(!report.offline_written);
        assert_eq!(report.unsubscribed, Some(false));
        assert_eq!(backend.unsubscribe_calls(), 1);
        let offline_attempts = backend
            .status_history()
            .into_iter()
            .filter(|status| *status == ComputerStatus::Offline)
            .count();
        assert_eq!(offline_attempts, 1);
    }

    #[tokio::test]
    async fn test_detached_execution_does_not_revive_status() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = MemoryBackend::default();
        let agent = agent_with(&backend, dir.path(), AgentOptions::default()).await;

        agent.on_execution_event(ExecutionEvent::created(Execution::pending(
            "slow",
            "sleep 0.5; echo late",
        )));
        // Let the dispatch start before shutting down.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let report = agent.shutdown(None).await;
        assert_eq!(report.detached, 1);
        assert_eq!(report.unsubscribed, None);

        assert_eq!(agent.detached_count(), 1);
        assert_eq!(agent.wait_for_detached().await, 1);
        assert_eq!(agent.detached_count(), 0);
        let execution = backend.execution("slow").expect("execution finished");
        assert!(execution.completed);
        assert_eq!(
            backend.status_history().last(),
            Some(&ComputerStatus::Offline)
        );
    }

    #[tokio::test]
    async fn test_dropping_agent_lets_detached_execution_finish() {
        let dir = tempfile::tempdir().expect("tempdir");
        let marker = dir.path().join("finished");
        let backend = MemoryBackend::default();
        let agent = agent_with(&backend, dir.path(), AgentOptions::default()).await;

        agent.on_execution_event(ExecutionEvent::created(Execution::pending(
            "slow",
            format!("sleep 0.5; touch {}", marker.display()),
        )));
        tokio::time::sleep(Duration::from_millis(100)).await;
        let report = agent.shutdown(None).await;
        assert_eq!(report.detached, 1);
        drop(agent);

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while backend.execution("slow").is_none_or(|e| !e.completed)
            && std::time::Instant::now() < deadline
        {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(marker.exists());
        assert!(backend.execution("slow").expect("execution").completed);
    }

    #[tokio::test]
    async fn test_failed_execution_writes_still_release_status() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = MemoryBackend::default();
        let agent = agent_with(&backend, dir.path(), AgentOptions::default()).await;
        backend.fail_execution_updates(true);

        assert_eq!(
            agent.on_execution_event(ExecutionEvent::created(Execution::pending("e1", "echo hi"))),
            EventDisposition::Dispatched
        );
        agent.wait_for_dispatches().await;

        assert_eq!(
            backend.execution_updates_for("e1"),
            vec![
                ExecutionPatch::started(STARTED_LOG),
                ExecutionPatch::finished("hi\n"),
            ]
        );
        assert!(backend.execution("e1").is_none());
        assert_eq!(agent.ledger().active_count(), 0);
        assert!(agent.ledger().is_marked("e1"));
        assert_eq!(
            backend.status_history(),
            vec![
                ComputerStatus::Idle,
                ComputerStatus::Running,
                ComputerStatus::Idle
            ]
        );
    }

    #[tokio::test]
    async fn test_shutdown_grace_waits_for_in_flight() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = MemoryBackend::default();
        let agent = agent_with(
            &backend,
            dir.path(),
            AgentOptions {
                shutdown_grace: Duration::from_secs(5),
                ..AgentOptions::default()
            },
        )
        .await;

        agent.on_execution_event(ExecutionEvent::created(Execution::pending(
            "e1",
            "sleep 0.2; echo ok",
        )));
        let report = agent.shutdown(None).await;

        assert_eq!(report.finished_during_grace, 1);
        assert_eq!(report.detached, 0);
        assert!(report.offline_written);
        assert_eq!(
            backend.status_history(),
            vec![
                ComputerStatus::Idle,
                ComputerStatus::Running,
                ComputerStatus::Idle,
                ComputerStatus::Offline
            ]
        );
    }
}
