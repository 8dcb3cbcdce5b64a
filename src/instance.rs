//! Phase timers belonging to one named instance.

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::clock::Clock;
use crate::metrics::{MetricsSink, PhaseStats};
use crate::models::{InstanceSnapshot, PhaseSnapshot};
use crate::timers::PhaseTimer;

/// The phases of one instance, in the order they were first started.
///
/// This is the unsynchronized core; callers normally go through an
/// [`InstanceHandle`], which adds locking and a clock.
#[derive(Debug, Clone)]
pub struct InstanceTimerSet {
    phases: Vec<(String, PhaseTimer)>,
    max_key_len: usize,
    created_at: Instant,
    last_used_at: Instant,
    stale_after: Duration,
}

impl InstanceTimerSet {
    pub fn new(now: Instant, stale_after: Duration) -> Self {
        Self {
            phases: Vec::new(),
            max_key_len: 0,
            created_at: now,
            last_used_at: now,
            stale_after,
        }
    }

    /// Start `phase` if it is not known yet. Returns `true` when a new timer
    /// was created; an existing timer, running or finished, is left alone.
    pub fn start(&mut self, phase: &str, now: Instant) -> bool {
        if self.position(phase).is_some() {
            return false;
        }

        let mut timer = PhaseTimer::new();
        timer.start(now);
        self.phases.push((phase.to_string(), timer));
        self.max_key_len = self.max_key_len.max(phase.chars().count());
        self.touch(now);
        true
    }

    /// Stop `phase` if it is known. Returns the elapsed time when this call
    /// completed a started timer.
    pub fn stop(&mut self, phase: &str, now: Instant) -> Option<Duration> {
        let idx = self.position(phase)?;
        let timer = &mut self.phases[idx].1;
        let recorded = timer.stop(now);
        let elapsed = if recorded { timer.elapsed() } else { None };
        self.touch(now);
        elapsed
    }

    /// Forget `phase`. Returns `true` if it was present.
    pub fn clear(&mut self, phase: &str) -> bool {
        match self.position(phase) {
            Some(idx) => {
                self.phases.remove(idx);
                true
            }
            None => false,
        }
    }

    /// One `<name><TAB><duration>` line per phase, names padded to the
    /// longest phase name seen so far.
    pub fn render_report(&self) -> String {
        let width = self.max_key_len;
        self.phases
            .iter()
            .map(|(name, timer)| format!("{name:<width$}\t{}\n", timer.render_duration()))
            .collect()
    }

    /// `true` once the set has been idle for longer than its threshold.
    pub fn is_stale(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_used_at) > self.stale_after
    }

    pub fn phase(&self, phase: &str) -> Option<&PhaseTimer> {
        self.position(phase).map(|idx| &self.phases[idx].1)
    }

    pub fn phase_names(&self) -> Vec<String> {
        self.phases.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_used_at(&self) -> Instant {
        self.last_used_at
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    fn snapshot_phases(&self) -> Vec<PhaseSnapshot> {
        self.phases
            .iter()
            .map(|(name, timer)| PhaseSnapshot {
                name: name.clone(),
                state: timer.state(),
                elapsed: timer.elapsed(),
            })
            .collect()
    }

    fn position(&self, phase: &str) -> Option<usize> {
        self.phases.iter().position(|(name, _)| name == phase)
    }

    fn touch(&mut self, now: Instant) {
        self.last_used_at = self.last_used_at.max(now);
    }
}

/// Shared, thread-safe handle to a registered instance. Cheap to clone; every
/// clone refers to the same set of phases.
///
/// A handle stays usable after its instance has been evicted or cleared, but
/// it is then detached: the registry hands out a fresh set for the same name.
#[derive(Clone)]
pub struct InstanceHandle {
    name: Arc<str>,
    set: Arc<Mutex<InstanceTimerSet>>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn MetricsSink>,
}

impl InstanceHandle {
    pub(crate) fn new(
        name: &str,
        stale_after: Duration,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn MetricsSink>,
    ) -> Self {
        let set = InstanceTimerSet::new(clock.now(), stale_after);
        Self {
            name: Arc::from(name),
            set: Arc::new(Mutex::new(set)),
            clock,
            sink,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&self, phase: &str) {
        let now = self.clock.now();
        if self.lock().start(phase, now) {
            debug!(event = "Phase", phase = "Start", instance = %self.name, phase_name = phase);
        }
    }

    pub fn stop(&self, phase: &str) {
        let now = self.clock.now();
        let elapsed = self.lock().stop(phase, now);

        if let Some(elapsed) = elapsed {
            debug!(
                event = "Phase",
                phase = "Stop",
                instance = %self.name,
                phase_name = phase,
                elapsed_ms = elapsed.as_millis() as u64
            );
            self.sink.on_phase_stopped(&PhaseStats {
                instance: self.name.to_string(),
                phase: phase.to_string(),
                elapsed,
            });
        }
    }

    pub fn clear(&self, phase: &str) {
        self.lock().clear(phase);
    }

    /// Start `phase` now and stop it when the returned guard is dropped.
    ///
    /// ```rust
    /// let registry = phasewatch::TimerRegistry::default();
    /// let job = registry.get_or_create_instance("job");
    /// {
    ///     let _guard = job.time("load");
    ///     // ... work being measured ...
    /// }
    /// assert!(job.render_report().starts_with("load\t"));
    /// # registry.shutdown();
    /// ```
    pub fn time(&self, phase: &str) -> PhaseGuard<'_> {
        self.start(phase);
        PhaseGuard {
            handle: self,
            phase: phase.to_string(),
        }
    }

    pub fn render_report(&self) -> String {
        self.lock().render_report()
    }

    pub fn snapshot(&self) -> InstanceSnapshot {
        InstanceSnapshot {
            name: self.name.to_string(),
            phases: self.lock().snapshot_phases(),
        }
    }

    pub fn phase_names(&self) -> Vec<String> {
        self.lock().phase_names()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn is_stale(&self) -> bool {
        self.lock().is_stale(self.clock.now())
    }

    /// `true` if both handles refer to the same underlying set.
    pub fn same_instance(&self, other: &InstanceHandle) -> bool {
        Arc::ptr_eq(&self.set, &other.set)
    }

    /// Foreground access. The set only holds timestamps, so a panic in another
    /// holder cannot leave it half-updated and poison is recovered.
    fn lock(&self) -> MutexGuard<'_, InstanceTimerSet> {
        self.set.lock().unwrap_or_else(|poisoned| {
            warn!(event = "Lock", phase = "Recovered", instance = %self.name);
            PoisonError::into_inner(poisoned)
        })
    }

    /// Sweep access. A poisoned set is reported instead of recovered so the
    /// sweep can skip it.
    pub(crate) fn try_stale(&self, now: Instant) -> Result<bool, String> {
        self.set
            .lock()
            .map(|set| set.is_stale(now))
            .map_err(|err| err.to_string())
    }

    #[cfg(test)]
    pub(crate) fn poison(&self) {
        let set = Arc::clone(&self.set);
        let _ = std::thread::spawn(move || {
            let _guard = set.lock();
            panic!("poison the instance lock");
        })
        .join();
    }
}

impl Debug for InstanceHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("InstanceHandle")
            .field("name", &self.name)
            .field("phases", &self.phase_names())
            .finish()
    }
}

/// Stops its phase when dropped. Created by [`InstanceHandle::time`].
pub struct PhaseGuard<'a> {
    handle: &'a InstanceHandle,
    phase: String,
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.handle.stop(&self.phase);
    }
}
