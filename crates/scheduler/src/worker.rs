//! Periodic worker loop with an explicit lifecycle.
//!
//! A [`WorkerLoop`] owns one [`WorkUnit`] and runs it on its own Tokio task:
//! compute the next interval, run the tick, then sleep either that interval
//! (success) or the recovery interval (failure). A failing or panicking tick
//! never ends the loop. `stop()` lets the in-flight tick finish.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::LifecycleError;
use crate::interval::IntervalSource;

/// Result of a tick that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Completed,
    /// Nothing could be done this tick (e.g. no healthy provider).
    Skipped(String),
}

/// Task-specific logic run once per tick.
#[async_trait]
pub trait WorkUnit: Send + Sync {
    fn name(&self) -> &str;

    /// # Errors
    ///
    /// Any error puts the loop on its recovery interval; it never stops it.
    async fn run_tick(&self) -> anyhow::Result<TickOutcome>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Sleep after a failed tick, usually shorter than the normal interval.
    pub recovery_interval: Duration,
    /// Consecutive failures after which failures are logged at `error`.
    pub escalate_after: u32,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(recovery_interval: Duration) -> Self {
        Self {
            recovery_interval,
            escalate_after: 3,
        }
    }

    #[must_use]
    pub const fn with_escalate_after(mut self, failures: u32) -> Self {
        self.escalate_after = failures;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Default)]
struct WorkerStats {
    ticks: AtomicU64,
    completed: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
    consecutive_failures: AtomicU32,
    last_tick_at: Mutex<Option<DateTime<Utc>>>,
    last_error: Mutex<Option<String>>,
}

impl WorkerStats {
    fn begin_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        *self.last_tick_at.lock() = Some(Utc::now());
    }

    fn record_outcome(&self, outcome: &TickOutcome) {
        let counter = match outcome {
            TickOutcome::Completed => &self.completed,
            TickOutcome::Skipped(_) => &self.skipped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    /// Returns the consecutive failure count including this one.
    fn record_failure(&self, message: String, panicked: bool) -> u32 {
        let counter = if panicked { &self.panicked } else { &self.failed };
        counter.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = Some(message);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Point-in-time view of a worker for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerReport {
    pub name: String,
    pub state: WorkerState,
    pub ticks: u64,
    pub completed: u64,
    pub skipped: u64,
    pub failed: u64,
    pub panicked: u64,
    pub consecutive_failures: u32,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

pub struct WorkerLoop {
    name: String,
    unit: Arc<dyn WorkUnit>,
    interval: IntervalSource,
    policy: RetryPolicy,
    state: Mutex<WorkerState>,
    stop_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<WorkerStats>,
}

impl WorkerLoop {
    #[must_use]
    pub fn new(unit: Arc<dyn WorkUnit>, interval: IntervalSource, policy: RetryPolicy) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            name: unit.name().to_string(),
            unit,
            interval,
            policy,
            state: Mutex::new(WorkerState::Idle),
            stop_tx,
            task: Mutex::new(None),
            stats: Arc::new(WorkerStats::default()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn state(&self) -> WorkerState {
        *self.state.lock()
    }

    /// Idle → Running: spawns the tick loop on its own task.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] if the worker is not idle or no Tokio
    /// runtime is available.
    pub fn start(&self) -> Result<(), LifecycleError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            error!(worker = %self.name, "start() called outside a Tokio runtime");
            LifecycleError::NoRuntime {
                worker: self.name.clone(),
            }
        })?;

        let mut state = self.state.lock();
        if *state != WorkerState::Idle {
            error!(worker = %self.name, state = %*state, "Invalid worker transition: start");
            return Err(self.invalid("start", *state));
        }

        let ctx = LoopContext {
            name: self.name.clone(),
            unit: Arc::clone(&self.unit),
            interval: self.interval.clone(),
            policy: self.policy,
            stats: Arc::clone(&self.stats),
            stop_rx: self.stop_tx.subscribe(),
        };
        *self.task.lock() = Some(runtime.spawn(ctx.run()));
        *state = WorkerState::Running;

        info!(worker = %self.name, "Worker started");
        Ok(())
    }

    /// Running → Stopping → Stopped. Waits for the in-flight tick, if any.
    ///
    /// A worker that was never started goes straight to Stopped.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] if the worker is already stopping or stopped.
    pub async fn stop(&self) -> Result<(), LifecycleError> {
        {
            let mut state = self.state.lock();
            match *state {
                WorkerState::Running => *state = WorkerState::Stopping,
                WorkerState::Idle => {
                    *state = WorkerState::Stopped;
                    info!(worker = %self.name, "Worker stopped before it was started");
                    return Ok(());
                }
                other => {
                    error!(worker = %self.name, state = %other, "Invalid worker transition: stop");
                    return Err(self.invalid("stop", other));
                }
            }
        }

        self.stop_tx.send_replace(true);
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(worker = %self.name, error = %e, "Worker task ended abnormally");
            }
        }

        *self.state.lock() = WorkerState::Stopped;
        info!(worker = %self.name, "Worker stopped");
        Ok(())
    }

    #[must_use]
    pub fn report(&self) -> WorkerReport {
        let stats = &self.stats;
        WorkerReport {
            name: self.name.clone(),
            state: self.state(),
            ticks: stats.ticks.load(Ordering::Relaxed),
            completed: stats.completed.load(Ordering::Relaxed),
            skipped: stats.skipped.load(Ordering::Relaxed),
            failed: stats.failed.load(Ordering::Relaxed),
            panicked: stats.panicked.load(Ordering::Relaxed),
            consecutive_failures: stats.consecutive_failures.load(Ordering::Relaxed),
            last_tick_at: *stats.last_tick_at.lock(),
            last_error: stats.last_error.lock().clone(),
        }
    }

    fn invalid(&self, operation: &'static str, state: WorkerState) -> LifecycleError {
        LifecycleError::InvalidTransition {
            worker: self.name.clone(),
            operation,
            state,
        }
    }
}

impl fmt::Debug for WorkerLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerLoop")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Everything the spawned task owns.
struct LoopContext {
    name: String,
    unit: Arc<dyn WorkUnit>,
    interval: IntervalSource,
    policy: RetryPolicy,
    stats: Arc<WorkerStats>,
    stop_rx: watch::Receiver<bool>,
}

impl LoopContext {
    async fn run(mut self) {
        loop {
            if *self.stop_rx.borrow() {
                break;
            }
            let planned = self.interval.next_interval().await;
            if *self.stop_rx.borrow() {
                break;
            }

            let wait = self.tick(planned).await;

            tokio::select! {
                () = tokio::time::sleep(wait) => {}
                _ = self.stop_rx.changed() => break,
            }
        }
        debug!(worker = %self.name, "Worker loop exited");
    }

    /// Runs one tick and returns how long to sleep afterwards.
    async fn tick(&self, planned: Duration) -> Duration {
        self.stats.begin_tick();
        let result = AssertUnwindSafe(self.unit.run_tick()).catch_unwind().await;

        match result {
            Ok(Ok(outcome)) => {
                if let TickOutcome::Skipped(reason) = &outcome {
                    info!(worker = %self.name, reason = %reason, "Tick skipped");
                }
                self.stats.record_outcome(&outcome);
                debug!(worker = %self.name, next_secs = planned.as_secs(), "Tick finished");
                planned
            }
            Ok(Err(e)) => {
                let failures = self.stats.record_failure(format!("{e:#}"), false);
                if failures >= self.policy.escalate_after {
                    error!(worker = %self.name, error = %e, failures, "Tick failed repeatedly");
                } else {
                    warn!(worker = %self.name, error = %e, failures, "Tick failed");
                }
                self.policy.recovery_interval
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                self.stats.record_failure(format!("panic: {message}"), true);
                error!(worker = %self.name, panic = %message, "Tick panicked");
                self.policy.recovery_interval
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
