// Scheduler engine implementation

use crate::recorder::{ExecutionLogEntry, ExecutionRecorder, Phase};
use crate::settle::{Settlement, SettlementRegistry};
use crate::task::{Task, TaskCallback, TaskHandle, Tier, TimedEntry, MAX_DELAY_MS, MAX_LABEL_LEN};
use async_trait::async_trait;
use chrono::Utc;
use common::config::EngineSettings;
use common::errors::{ScheduleError, TaskError};
use common::telemetry;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Notify};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Configuration for the scheduler engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Label assigned to tasks scheduled with an empty one.
    pub default_label: String,
    /// Execution-log size at which a warning is emitted.
    pub recorder_warn_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_label: "(anonymous)".to_string(),
            recorder_warn_threshold: 10_000,
        }
    }
}

impl From<&EngineSettings> for EngineConfig {
    fn from(settings: &EngineSettings) -> Self {
        Self {
            default_label: settings.default_label.clone(),
            recorder_warn_threshold: settings.recorder_warn_threshold,
        }
    }
}

/// One failed dispatch within a [`DispatchReport`].
#[derive(Debug)]
pub struct TaskFailure {
    pub label: String,
    pub tier: Tier,
    pub sequence: u64,
    pub error: TaskError,
}

/// Outcome of one pump pass over both tiers.
///
/// Failures are surfaced here (and via the error log + tracing), never
/// swallowed; a failed task does not stop the pass.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Immediate-tier dispatches performed, failed ones included.
    pub immediate_dispatched: usize,
    /// Timed-tier dispatches performed, failed ones included.
    pub timed_dispatched: usize,
    pub failures: Vec<TaskFailure>,
}

impl DispatchReport {
    pub fn dispatched(&self) -> usize {
        self.immediate_dispatched + self.timed_dispatched
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

struct EngineState {
    immediate: VecDeque<Task>,
    timed: BinaryHeap<Reverse<TimedEntry>>,
    recorder: ExecutionRecorder,
    settlers: SettlementRegistry,
    next_sequence: u64,
    closed: bool,
}

struct EngineShared {
    state: Mutex<EngineState>,
    /// Wakes the async pump loop when work or a settlement waiter arrives.
    work_notify: Notify,
    shutdown_tx: broadcast::Sender<()>,
}

/// Scheduler trait for the async dispatch-loop lifecycle
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Run the dispatch loop until stopped
    async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Stop the dispatch loop gracefully
    async fn stop(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Two-tier deferred-task scheduler.
///
/// Owns an immediate FIFO, a timed queue ordered by (delay, arrival), the
/// execution recorder, and the settlement registry. The immediate tier drains
/// completely before any timed task runs; after each timed dispatch the
/// immediate tier is re-drained before the next timed dispatch. Dispatch is
/// single-threaded and cooperative: a callback runs to completion once
/// started, and delays are ordering hints, never wall-clock waits.
pub struct SchedulerEngine {
    id: Uuid,
    config: EngineConfig,
    shared: Arc<EngineShared>,
}

impl SchedulerEngine {
    /// Create a new engine with the default configuration
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create a new engine with the specified configuration
    pub fn with_config(config: EngineConfig) -> Self {
        let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);
        let id = Uuid::new_v4();

        info!(engine_id = %id, "Scheduler engine created");

        Self {
            id,
            shared: Arc::new(EngineShared {
                state: Mutex::new(EngineState {
                    immediate: VecDeque::new(),
                    timed: BinaryHeap::new(),
                    recorder: ExecutionRecorder::new(config.recorder_warn_threshold),
                    settlers: SettlementRegistry::default(),
                    next_sequence: 0,
                    closed: false,
                }),
                work_notify: Notify::new(),
                shutdown_tx,
            }),
            config,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// A cheap clone of the scheduling surface, for callbacks and other owners.
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            config: self.config.clone(),
            shared: Arc::clone(&self.shared),
        }
    }

    /// Append a task to the immediate FIFO.
    pub fn schedule_immediate<F>(
        &self,
        callback: F,
        label: impl Into<String>,
    ) -> Result<TaskHandle, ScheduleError>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.handle().schedule_immediate(callback, label)
    }

    /// Insert a task into the timed queue at (delay, arrival) order.
    pub fn schedule_timed<F>(
        &self,
        callback: F,
        label: impl Into<String>,
        delay: Duration,
    ) -> Result<TaskHandle, ScheduleError>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.handle().schedule_timed(callback, label, delay)
    }

    /// Run the two-level interleave until both tiers are empty.
    ///
    /// Each cycle drains the immediate FIFO to empty (including tasks the
    /// drained callbacks themselves enqueue), then dispatches at most one
    /// timed task. The moment between those two steps, when the immediate
    /// queue is observed empty and the timed queue is checked, is the
    /// settlement boundary: every waiter registered so far resolves there.
    #[instrument(skip(self), fields(engine_id = %self.id))]
    pub fn process_pending(&self) -> DispatchReport {
        let mut report = DispatchReport::default();

        loop {
            while let Some(task) = self.pop_immediate() {
                self.dispatch(task, &mut report);
            }

            match self.check_timed_and_settle() {
                Some(task) => self.dispatch(task, &mut report),
                None => break,
            }
        }

        telemetry::update_queue_depth(Tier::Immediate.as_str(), 0);
        telemetry::update_queue_depth(Tier::Timed.as_str(), 0);

        if report.dispatched() > 0 {
            debug!(
                immediate = report.immediate_dispatched,
                timed = report.timed_dispatched,
                failed = report.failures.len(),
                "Dispatch pass complete"
            );
        }

        report
    }

    /// Snapshot the execution log and clear it, as one atomic operation.
    pub fn drain_log(&self) -> Vec<ExecutionLogEntry> {
        self.lock_state().recorder.drain()
    }

    /// Future resolved at the next settlement boundary (see
    /// [`process_pending`](Self::process_pending)). Each call gets an
    /// independent signal; concurrent calls all resolve at the same boundary.
    pub fn wait_until_settled(&self) -> Settlement {
        self.handle().wait_until_settled()
    }

    /// Dispose of the engine: reject new work, drop queued tasks, and fail
    /// pending settlements. The execution log survives for a final
    /// [`drain_log`](Self::drain_log).
    #[instrument(skip(self), fields(engine_id = %self.id))]
    pub fn close(&self) {
        {
            let mut state = self.lock_state();
            if state.closed {
                return;
            }
            state.closed = true;

            let dropped = state.immediate.len() + state.timed.len();
            state.immediate.clear();
            state.timed.clear();
            state.settlers.fail_all();

            if dropped > 0 {
                warn!(dropped, "Engine closed with tasks still queued; they will never run");
            }
        }

        let _ = self.shared.shutdown_tx.send(());
        self.shared.work_notify.notify_one();
        info!("Scheduler engine closed");
    }

    pub fn is_closed(&self) -> bool {
        self.lock_state().closed
    }

    fn pop_immediate(&self) -> Option<Task> {
        self.lock_state().immediate.pop_front()
    }

    /// One timed dispatch opportunity: the immediate queue is empty here, so
    /// checking the timed queue is the settlement boundary. Waiters resolve
    /// whether or not a timed task was actually due.
    fn check_timed_and_settle(&self) -> Option<Task> {
        let mut state = self.lock_state();
        let next = state.timed.pop().map(|Reverse(entry)| entry.task);
        state.settlers.resolve_all();
        next
    }

    fn dispatch(&self, task: Task, report: &mut DispatchReport) {
        let Task {
            callback,
            label,
            tier,
            sequence,
            ..
        } = task;

        self.record(Phase::Start, tier, &label, sequence);
        let started = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(callback));
        let elapsed = started.elapsed().as_secs_f64();

        match tier {
            Tier::Immediate => report.immediate_dispatched += 1,
            Tier::Timed => report.timed_dispatched += 1,
        }

        match outcome {
            Ok(Ok(())) => {
                self.record(Phase::End, tier, &label, sequence);
                telemetry::record_dispatch(tier.as_str());
                telemetry::record_task_duration(tier.as_str(), elapsed);
            }
            Ok(Err(err)) => {
                self.record(Phase::Error, tier, &label, sequence);
                error!(label = %label, tier = %tier, error = %err, "Task callback failed");
                telemetry::record_dispatch_failure(tier.as_str(), "failed");
                report.failures.push(TaskFailure {
                    label,
                    tier,
                    sequence,
                    error: TaskError::Failed(err),
                });
            }
            Err(payload) => {
                let message = panic_message(payload);
                self.record(Phase::Error, tier, &label, sequence);
                error!(label = %label, tier = %tier, panic = %message, "Task callback panicked");
                telemetry::record_dispatch_failure(tier.as_str(), "panicked");
                report.failures.push(TaskFailure {
                    label,
                    tier,
                    sequence,
                    error: TaskError::Panicked(message),
                });
            }
        }
    }

    fn record(&self, phase: Phase, tier: Tier, label: &str, sequence: u64) {
        self.lock_state().recorder.record(phase, tier, label, sequence);
    }

    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.shared.state.lock().expect("engine state lock poisoned")
    }
}

impl Default for SchedulerEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scheduler for SchedulerEngine {
    /// Run the pump loop: dispatch everything pending, then sleep until new
    /// work, a settlement waiter, or shutdown arrives.
    async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(engine_id = %self.id, "Starting scheduler engine loop");

        let mut shutdown_rx = self.shared.shutdown_tx.subscribe();

        loop {
            let report = self.process_pending();
            if !report.is_clean() {
                warn!(
                    engine_id = %self.id,
                    failed = report.failures.len(),
                    "Dispatch pass completed with task failures"
                );
            }

            tokio::select! {
                _ = self.shared.work_notify.notified() => {
                    debug!("Work signal received");
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping engine loop");
                    break;
                }
            }
        }

        info!(engine_id = %self.id, "Scheduler engine loop stopped");
        Ok(())
    }

    /// Stop the pump loop gracefully. In-flight dispatch passes complete;
    /// queued tasks stay queued for a later pump or `close`.
    async fn stop(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(engine_id = %self.id, "Stopping scheduler engine loop");
        let _ = self.shared.shutdown_tx.send(());
        Ok(())
    }
}

/// Cloneable scheduling surface over a [`SchedulerEngine`].
#[derive(Clone)]
pub struct SchedulerHandle {
    config: EngineConfig,
    shared: Arc<EngineShared>,
}

impl SchedulerHandle {
    /// See [`SchedulerEngine::schedule_immediate`].
    pub fn schedule_immediate<F>(
        &self,
        callback: F,
        label: impl Into<String>,
    ) -> Result<TaskHandle, ScheduleError>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.enqueue(Box::new(callback), label.into(), Tier::Immediate, None)
    }

    /// See [`SchedulerEngine::schedule_timed`].
    pub fn schedule_timed<F>(
        &self,
        callback: F,
        label: impl Into<String>,
        delay: Duration,
    ) -> Result<TaskHandle, ScheduleError>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.enqueue(Box::new(callback), label.into(), Tier::Timed, Some(delay))
    }

    /// See [`SchedulerEngine::wait_until_settled`].
    pub fn wait_until_settled(&self) -> Settlement {
        let settlement = {
            let mut state = self.lock_state();
            if state.closed {
                Settlement::closed()
            } else {
                state.settlers.register()
            }
        };
        // Nudge the pump so an idle loop still reaches the next boundary.
        self.shared.work_notify.notify_one();
        settlement
    }

    fn enqueue(
        &self,
        callback: TaskCallback,
        label: String,
        tier: Tier,
        delay: Option<Duration>,
    ) -> Result<TaskHandle, ScheduleError> {
        // Validation happens before any queue state is touched.
        let label = self.normalize_label(label)?;
        if let Some(delay) = delay {
            if delay.as_millis() > u128::from(MAX_DELAY_MS) {
                return Err(ScheduleError::DelayTooLarge {
                    delay_ms: delay.as_millis(),
                    max_ms: MAX_DELAY_MS,
                });
            }
        }

        let (handle, depth) = {
            let mut state = self.lock_state();
            if state.closed {
                return Err(ScheduleError::Closed);
            }

            let sequence = state.next_sequence;
            state.next_sequence += 1;

            let task = Task {
                callback,
                label: label.clone(),
                tier,
                sequence,
                enqueued_at: Utc::now(),
            };

            let depth = match tier {
                Tier::Immediate => {
                    state.immediate.push_back(task);
                    state.immediate.len()
                }
                Tier::Timed => {
                    state.timed.push(Reverse(TimedEntry {
                        delay: delay.unwrap_or_default(),
                        task,
                    }));
                    state.timed.len()
                }
            };

            let handle = TaskHandle {
                id: Uuid::new_v4(),
                sequence,
                label,
                tier,
            };
            (handle, depth)
        };

        debug!(
            label = %handle.label,
            tier = %tier,
            sequence = handle.sequence,
            "Task scheduled"
        );
        telemetry::update_queue_depth(tier.as_str(), depth);
        self.shared.work_notify.notify_one();

        Ok(handle)
    }

    fn normalize_label(&self, label: String) -> Result<String, ScheduleError> {
        if label.is_empty() {
            return Ok(self.config.default_label.clone());
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(ScheduleError::LabelTooLong {
                len: label.len(),
                max: MAX_LABEL_LEN,
            });
        }
        Ok(label)
    }

    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.shared.state.lock().expect("engine state lock poisoned")
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "opaque panic payload".to_string()
    }
}
