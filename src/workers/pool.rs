//! Worker Pool Supervisor
//!
//! Starts registered workers one after another, then waits on every task they
//! spawned. Each worker runs under its own cancellation scope; the failure policy
//! decides whether a failing worker takes the whole pool down or is restarted on
//! its own.
//!
//! Per-worker state: `Configured -> Connecting -> Running -> Stopping -> Stopped`,
//! or `Failed` from `Connecting` or `Running`.

use futures::FutureExt;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};

use super::{Worker, WorkerTask};
use crate::config::{FailurePolicy, WorkerConfig};
use crate::error::{RelayError, Result};
use crate::relay::{Shutdown, ShutdownTrigger};

/// Builds one worker and reports its configuration. Invoked on every (re)start.
pub type WorkerFactory = Box<dyn Fn() -> Result<(Box<dyn Worker>, WorkerConfig)> + Send + Sync>;

// ============================================================================
// WORKER HEALTH
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Configured,
    Connecting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Configured => "configured",
            WorkerState::Connecting => "connecting",
            WorkerState::Running => "running",
            WorkerState::Stopping => "stopping",
            WorkerState::Stopped => "stopped",
            WorkerState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Shared, observable state of every worker the pool has built, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct PoolHealth {
    states: Arc<RwLock<BTreeMap<String, WorkerState>>>,
}

impl PoolHealth {
    pub async fn get(&self, name: &str) -> Option<WorkerState> {
        self.states.read().await.get(name).copied()
    }

    pub async fn snapshot(&self) -> BTreeMap<String, WorkerState> {
        self.states.read().await.clone()
    }

    async fn set(&self, name: &str, state: WorkerState) {
        self.states.write().await.insert(name.to_string(), state);
    }
}

// ============================================================================
// POOL
// ============================================================================

pub struct WorkerPool {
    factories: Vec<WorkerFactory>,
    policy: FailurePolicy,
    health: PoolHealth,
}

impl WorkerPool {
    pub fn new(policy: FailurePolicy) -> Self {
        Self {
            factories: Vec::new(),
            policy,
            health: PoolHealth::default(),
        }
    }

    /// Registers a factory. Workers start in registration order.
    pub fn register(&mut self, factory: WorkerFactory) {
        self.factories.push(factory);
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Handle for observing worker states while the pool runs.
    pub fn health(&self) -> PoolHealth {
        self.health.clone()
    }

    /// Runs every enabled worker until `shutdown` fires or the failure policy
    /// gives up, and returns the first error encountered.
    ///
    /// A factory error is always fatal. With [`FailurePolicy::FailFast`], a
    /// worker that fails to start prevents every later worker from starting.
    /// Workers start one at a time, but task failures and `shutdown` are acted
    /// on while a worker is still starting; its start is then abandoned.
    ///
    /// Only an explicit trigger stops the pool. Dropping the trigger behind
    /// `shutdown` without firing it leaves the pool running.
    pub async fn run(self, shutdown: Shutdown) -> Result<()> {
        let mut supervisor = Supervisor::new(&self.factories, self.policy, self.health.clone(), shutdown);

        for factory_index in 0..self.factories.len() {
            if supervisor.shutdown.is_shutdown() || supervisor.is_stopping() {
                break;
            }

            let (worker, config) = match (self.factories[factory_index])() {
                Ok(built) => built,
                Err(e) => {
                    error!(error = %e, "Failed to build worker");
                    supervisor.record_first_error(e);
                    supervisor.stop_all().await;
                    break;
                }
            };

            if !config.enabled {
                info!(worker = worker.name(), "Worker disabled, skipping");
                continue;
            }

            let slot = supervisor.add_slot(worker.name(), factory_index).await;
            supervisor.launch(slot, worker).await;
        }

        supervisor.supervise().await;

        match supervisor.first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

// ============================================================================
// SUPERVISION
// ============================================================================

enum TaskOutcome {
    Finished(Result<()>),
    RestartDue,
    RestartCancelled,
}

struct Slot {
    name: String,
    factory_index: usize,
    trigger: ShutdownTrigger,
    /// Tasks of the current run still alive
    live: usize,
    failed: bool,
    /// Isolated failure of the current run
    pending_error: Option<RelayError>,
    /// Failure that caused the restart currently waiting on its delay
    backoff_error: Option<RelayError>,
    restarts: u32,
}

struct Supervisor<'a> {
    factories: &'a [WorkerFactory],
    policy: FailurePolicy,
    health: PoolHealth,
    slots: Vec<Slot>,
    tasks: JoinSet<(usize, TaskOutcome)>,
    /// Slots whose restart delay elapsed while another worker was starting
    due_restarts: Vec<usize>,
    /// External shutdown
    shutdown: Shutdown,
    stop: ShutdownTrigger,
    first_error: Option<RelayError>,
}

impl<'a> Supervisor<'a> {
    fn new(factories: &'a [WorkerFactory], policy: FailurePolicy, health: PoolHealth, shutdown: Shutdown) -> Self {
        Self {
            factories,
            policy,
            health,
            slots: Vec::new(),
            tasks: JoinSet::new(),
            due_restarts: Vec::new(),
            shutdown,
            stop: ShutdownTrigger::new(),
            first_error: None,
        }
    }

    fn is_stopping(&self) -> bool {
        self.stop.is_triggered()
    }

    fn record_first_error(&mut self, e: RelayError) {
        if self.first_error.is_none() {
            self.first_error = Some(e);
        }
    }

    async fn add_slot(&mut self, name: &str, factory_index: usize) -> usize {
        self.health.set(name, WorkerState::Configured).await;
        self.slots.push(Slot {
            name: name.to_string(),
            factory_index,
            trigger: ShutdownTrigger::new(),
            live: 0,
            failed: false,
            pending_error: None,
            backoff_error: None,
            restarts: 0,
        });
        self.slots.len() - 1
    }

    /// Starts `worker` in `slot` and spawns its tasks.
    ///
    /// Keeps supervising the running workers while `start` is pending, and
    /// abandons the start once the pool stops.
    async fn launch(&mut self, slot: usize, worker: Box<dyn Worker>) {
        let name = self.slots[slot].name.clone();
        self.health.set(&name, WorkerState::Connecting).await;
        info!(worker = %name, "Starting worker");

        let mut stop = self.stop.subscribe();
        let start = worker.start(self.slots[slot].trigger.subscribe());
        tokio::pin!(start);

        let started = loop {
            let stopping = self.is_stopping();
            tokio::select! {
                started = &mut start => break Some(started),
                _ = stop.recv() => break None,
                _ = self.shutdown.recv(), if !stopping => {
                    info!("Shutdown requested, stopping workers");
                    self.stop_all().await;
                }
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    self.joined(joined).await;
                }
            }
        };

        let Some(started) = started else {
            info!(worker = %name, "Worker start abandoned");
            if let Some(e) = self.slots[slot].backoff_error.take() {
                self.record_first_error(e);
            }
            self.worker_unwound(slot).await;
            return;
        };

        match started {
            Ok(tasks) => {
                self.slots[slot].live = tasks.len();
                self.slots[slot].backoff_error = None;
                for task in tasks {
                    self.spawn(slot, task);
                }
                self.health.set(&name, WorkerState::Running).await;
                if self.slots[slot].live == 0 {
                    self.worker_unwound(slot).await;
                }
            }
            Err(e) => {
                error!(worker = %name, error = %e, "Worker failed to start");
                self.slots[slot].backoff_error = None;
                self.fail(slot, e).await;
                self.worker_unwound(slot).await;
            }
        }
    }

    fn spawn(&mut self, slot: usize, task: WorkerTask) {
        self.tasks.spawn(async move {
            let result = AssertUnwindSafe(task)
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(RelayError::TaskPanicked(panic_message(panic.as_ref()))));
            (slot, TaskOutcome::Finished(result))
        });
    }

    /// Applies the failure policy to an error from `slot`.
    async fn fail(&mut self, slot: usize, e: RelayError) {
        self.slots[slot].failed = true;

        match self.policy {
            FailurePolicy::FailFast => {
                self.record_first_error(e);
                self.stop_all().await;
            }
            FailurePolicy::Isolate { .. } => {
                let name = self.slots[slot].name.clone();
                self.slots[slot].trigger.trigger();
                if self.slots[slot].pending_error.is_none() {
                    self.slots[slot].pending_error = Some(e);
                }
                if self.slots[slot].live > 0 {
                    self.health.set(&name, WorkerState::Stopping).await;
                }
            }
        }
    }

    /// Cancels every worker and any pending restart.
    async fn stop_all(&mut self) {
        if self.is_stopping() {
            return;
        }
        self.stop.trigger();

        for slot in &self.slots {
            slot.trigger.trigger();
            if slot.live > 0 {
                self.health.set(&slot.name, WorkerState::Stopping).await;
            }
        }
    }

    /// Called once the last task of a worker's current run has returned.
    async fn worker_unwound(&mut self, slot: usize) {
        let name = self.slots[slot].name.clone();

        if !std::mem::take(&mut self.slots[slot].failed) {
            self.health.set(&name, WorkerState::Stopped).await;
            return;
        }

        self.health.set(&name, WorkerState::Failed).await;
        let Some(e) = self.slots[slot].pending_error.take() else {
            return;
        };

        let FailurePolicy::Isolate {
            max_restarts,
            restart_delay_ms,
        } = self.policy
        else {
            return;
        };

        if self.is_stopping() || self.slots[slot].restarts >= max_restarts {
            error!(
                worker = %name,
                restarts = self.slots[slot].restarts,
                error = %e,
                "Worker failed permanently"
            );
            self.record_first_error(e);
            return;
        }

        self.slots[slot].restarts += 1;
        warn!(
            worker = %name,
            attempt = self.slots[slot].restarts,
            max_restarts,
            error = %e,
            "Restarting worker"
        );
        self.slots[slot].backoff_error = Some(e);

        let delay = Duration::from_millis(restart_delay_ms);
        let mut stop = self.stop.subscribe();
        self.tasks.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => (slot, TaskOutcome::RestartDue),
                _ = stop.recv() => (slot, TaskOutcome::RestartCancelled),
            }
        });
    }

    async fn restart(&mut self, slot: usize) {
        if self.is_stopping() {
            if let Some(e) = self.slots[slot].backoff_error.take() {
                self.record_first_error(e);
            }
            return;
        }

        let factories = self.factories;
        match (factories[self.slots[slot].factory_index])() {
            Ok((worker, _)) => {
                self.slots[slot].trigger = ShutdownTrigger::new();
                self.launch(slot, worker).await;
            }
            Err(e) => {
                error!(worker = %self.slots[slot].name, error = %e, "Failed to rebuild worker");
                self.slots[slot].backoff_error = None;
                self.fail(slot, e).await;
                self.worker_unwound(slot).await;
            }
        }
    }

    async fn task_finished(&mut self, slot: usize, result: Result<()>) {
        self.slots[slot].live -= 1;

        if let Err(e) = result {
            if self.is_stopping() {
                warn!(worker = %self.slots[slot].name, error = %e, "Worker task failed during shutdown");
            } else {
                error!(worker = %self.slots[slot].name, error = %e, "Worker task failed");
                self.fail(slot, e).await;
            }
        }

        if self.slots[slot].live == 0 {
            self.worker_unwound(slot).await;
        }
    }

    /// Handles one joined task. Due restarts are queued, since a restart
    /// launches a worker and this runs inside [`launch`](Self::launch) too.
    async fn joined(&mut self, joined: std::result::Result<(usize, TaskOutcome), JoinError>) {
        match joined {
            Ok((slot, TaskOutcome::Finished(result))) => self.task_finished(slot, result).await,
            Ok((slot, TaskOutcome::RestartDue)) => self.due_restarts.push(slot),
            Ok((slot, TaskOutcome::RestartCancelled)) => {
                if let Some(e) = self.slots[slot].backoff_error.take() {
                    self.record_first_error(e);
                }
            }
            Err(e) => {
                error!(error = %e, "Worker task aborted");
                self.record_first_error(RelayError::TaskPanicked(e.to_string()));
                self.stop_all().await;
            }
        }
    }

    /// Waits until every task has returned.
    async fn supervise(&mut self) {
        loop {
            while let Some(slot) = self.due_restarts.pop() {
                self.restart(slot).await;
            }

            let stopping = self.is_stopping();
            tokio::select! {
                _ = self.shutdown.recv(), if !stopping => {
                    info!("Shutdown requested, stopping workers");
                    self.stop_all().await;
                }
                joined = self.tasks.join_next() => {
                    let Some(joined) = joined else {
                        break;
                    };
                    self.joined(joined).await;
                }
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
