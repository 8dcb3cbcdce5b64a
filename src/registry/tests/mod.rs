use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use super::*;
use crate::clock::ManualClock;
use crate::metrics::PhaseStats;


const DAY: Duration = Duration::from_secs(86_400);

/// Registry on a manual clock with the given config.
fn manual_registry(config: RegistryConfig) -> (Arc<ManualClock>, TimerRegistry) {
    let clock = Arc::new(ManualClock::new());
    let registry = TimerRegistry::builder()
        .config(config)
        .clock(clock.clone())
        .build()
        .unwrap();
    (clock, registry)
}

/// Config whose sweep fires every few milliseconds but only evicts after a
/// minute of manual-clock idle time.
fn fast_sweep_config() -> RegistryConfig {
    RegistryConfig::default()
        .with_eviction_interval(Duration::from_millis(5))
        .with_stale_after(Duration::from_secs(60))
}

/// Poll `condition` until it holds or `timeout` passes.
fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

#[derive(Default)]
struct RecordingSink {
    sweeps: Mutex<Vec<SweepStats>>,
    phases: Mutex<Vec<PhaseStats>>,
}

impl RecordingSink {
    fn sweeps(&self) -> Vec<SweepStats> {
        self.sweeps.lock().unwrap().clone()
    }

    fn phases(&self) -> Vec<PhaseStats> {
        self.phases.lock().unwrap().clone()
    }
}

impl MetricsSink for RecordingSink {
    fn on_phase_stopped(&self, stats: &PhaseStats) {
        self.phases.lock().unwrap().push(stats.clone());
    }

    fn on_sweep(&self, stats: &SweepStats) {
        self.sweeps.lock().unwrap().push(stats.clone());
    }
}

/// Spawner that always refuses and counts how often it was asked.
fn refusing_spawn(attempts: Arc<AtomicUsize>) -> Box<SpawnFn> {
    Box::new(move |_, _| {
        attempts.fetch_add(1, Ordering::SeqCst);
        Err(TimerError::SweeperSpawn("thread limit reached".to_string()))
    })
}
