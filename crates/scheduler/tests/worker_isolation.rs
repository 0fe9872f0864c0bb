use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use optdesk_core::{CadenceConfig, ExternalResult, IndicatorSource};
use optdesk_scheduler::{
    AdaptiveCadence, CadenceController, CadenceTable, IndicatorCache, IndicatorSettings,
    IntervalSource, RetryPolicy, TickOutcome, WorkUnit, WorkerLoop, WorkerState,
};
use parking_lot::Mutex;
use tokio::time::Instant;

// ============================================================================
// Test units
// ============================================================================

/// Fails on the listed tick numbers (1-based), succeeds otherwise.
struct Flaky {
    name: &'static str,
    ticks: AtomicU32,
    fail_on: Vec<u32>,
}

impl Flaky {
    fn new(name: &'static str, fail_on: Vec<u32>) -> Arc<Self> {
        Arc::new(Self {
            name,
            ticks: AtomicU32::new(0),
            fail_on,
        })
    }

    fn ticks(&self) -> u32 {
        self.ticks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkUnit for Flaky {
    fn name(&self) -> &str {
        self.name
    }

    async fn run_tick(&self) -> anyhow::Result<TickOutcome> {
        let n = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on.contains(&n) {
            anyhow::bail!("injected failure on tick {n}");
        }
        Ok(TickOutcome::Completed)
    }
}

struct Panicky {
    ticks: AtomicU32,
}

#[async_trait]
impl WorkUnit for Panicky {
    fn name(&self) -> &str {
        "panicky"
    }

    async fn run_tick(&self) -> anyhow::Result<TickOutcome> {
        self.ticks.fetch_add(1, Ordering::SeqCst);
        panic!("work unit bug");
    }
}

/// Records the virtual time of every tick.
struct Recorder {
    at: Mutex<Vec<Instant>>,
}

#[async_trait]
impl WorkUnit for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn run_tick(&self) -> anyhow::Result<TickOutcome> {
        self.at.lock().push(Instant::now());
        Ok(TickOutcome::Completed)
    }
}

struct Sequence(Mutex<VecDeque<f64>>);

#[async_trait]
impl IndicatorSource for Sequence {
    async fn fetch_scalar(&self) -> ExternalResult<f64> {
        let mut values = self.0.lock();
        let value = if values.len() > 1 {
            values.pop_front()
        } else {
            values.front().copied()
        };
        Ok(value.unwrap_or(20.0))
    }

    fn name(&self) -> &str {
        "sequence"
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn fixed_worker(unit: Arc<dyn WorkUnit>, every_secs: u64, recovery_secs: u64) -> WorkerLoop {
    WorkerLoop::new(
        unit,
        IntervalSource::Fixed(Duration::from_secs(every_secs)),
        RetryPolicy::new(Duration::from_secs(recovery_secs)),
    )
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn failing_tick_does_not_stop_later_ticks() {
    let unit = Flaky::new("flaky", vec![1]);
    let worker = fixed_worker(unit.clone(), 60, 5);
    worker.start().unwrap();

    // tick 1 at t=0 fails -> tick 2 at t=5 -> tick 3 at t=65
    tokio::time::sleep(Duration::from_secs(70)).await;
    assert_eq!(unit.ticks(), 3);

    let report = worker.report();
    assert_eq!(report.failed, 1);
    assert_eq!(report.completed, 2);
    assert_eq!(report.consecutive_failures, 0);
    assert!(report.last_error.unwrap().contains("injected failure"));

    worker.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn failures_use_the_recovery_interval() {
    let unit = Flaky::new("always-failing", (1..=100).collect());
    let worker = fixed_worker(unit.clone(), 3600, 10);
    worker.start().unwrap();

    tokio::time::sleep(Duration::from_secs(45)).await;
    // t=0,10,20,30,40
    assert_eq!(unit.ticks(), 5);
    assert_eq!(worker.report().consecutive_failures, 5);
    assert_eq!(worker.state(), WorkerState::Running);

    worker.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn panicking_worker_does_not_affect_its_neighbour() {
    let bad = Arc::new(Panicky {
        ticks: AtomicU32::new(0),
    });
    let good = Flaky::new("steady", vec![]);

    let bad_worker = fixed_worker(bad.clone(), 30, 30);
    let good_worker = fixed_worker(good.clone(), 30, 30);
    bad_worker.start().unwrap();
    good_worker.start().unwrap();

    tokio::time::sleep(Duration::from_secs(95)).await;

    // both ran at t=0,30,60,90
    assert_eq!(good.ticks(), 4);
    assert_eq!(bad.ticks.load(Ordering::SeqCst), 4);
    assert_eq!(bad_worker.report().panicked, 4);
    assert_eq!(bad_worker.state(), WorkerState::Running);
    assert_eq!(good_worker.report().failed, 0);

    bad_worker.stop().await.unwrap();
    assert_eq!(good_worker.state(), WorkerState::Running);
    good_worker.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stop_interrupts_the_sleep_between_ticks() {
    let unit = Flaky::new("sleepy", vec![]);
    let worker = fixed_worker(unit.clone(), 3600, 60);
    worker.start().unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let started = Instant::now();
    worker.stop().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(unit.ticks(), 1);
}

#[tokio::test(start_paused = true)]
async fn regime_change_applies_from_the_next_wake_up() {
    let source = Arc::new(Sequence(Mutex::new(VecDeque::from(vec![17.0, 28.0]))));
    let settings = IndicatorSettings {
        ttl: Duration::ZERO,
        ..IndicatorSettings::default()
    };
    let cadence = Arc::new(AdaptiveCadence::new(
        IndicatorCache::new(source, settings),
        CadenceController::new(CadenceTable::from_config(&CadenceConfig::default()).unwrap()),
    ));

    let recorder = Arc::new(Recorder {
        at: Mutex::new(Vec::new()),
    });
    let worker = WorkerLoop::new(
        recorder.clone(),
        IntervalSource::Adaptive(cadence),
        RetryPolicy::new(Duration::from_secs(60)),
    );
    worker.start().unwrap();

    tokio::time::sleep(Duration::from_secs(60 * 60 + 20 * 60 + 30)).await;
    worker.stop().await.unwrap();

    let at = recorder.at.lock().clone();
    assert_eq!(at.len(), 3);
    // indicator 17 -> sleep 60 min; then 28 -> sleep 20 min
    assert_eq!(at[1] - at[0], Duration::from_secs(60 * 60));
    assert_eq!(at[2] - at[1], Duration::from_secs(20 * 60));
}
