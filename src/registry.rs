//! The registry of named instances and its eviction sweep.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::RegistryConfig;
use crate::error::TimerError;
use crate::instance::InstanceHandle;
use crate::metrics::{MetricsSink, NoOpSink, SweepStats};

mod sweeper;

#[cfg(test)]
mod tests;

use sweeper::Sweeper;

/// Minimum wait before retrying a sweep thread that failed to spawn.
const SPAWN_RETRY_BACKOFF: Duration = Duration::from_secs(1);

type SpawnFn = dyn Fn(Arc<Shared>, Duration) -> Result<Sweeper, TimerError> + Send + Sync;

#[derive(Default)]
struct SweeperSlot {
    running: Option<Sweeper>,
    retry_after: Option<Instant>,
}

impl SweeperSlot {
    fn is_running(&self) -> bool {
        self.running.as_ref().is_some_and(Sweeper::is_running)
    }
}

/// State shared between the registry handle and its sweep thread.
pub(crate) struct Shared {
    instances: RwLock<HashMap<String, InstanceHandle>>,
    config: RwLock<RegistryConfig>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn MetricsSink>,
}

impl Shared {
    // Map and config guards only protect handles and plain values; poison is
    // recovered.
    fn instances(&self) -> RwLockReadGuard<'_, HashMap<String, InstanceHandle>> {
        self.instances.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn instances_mut(&self) -> RwLockWriteGuard<'_, HashMap<String, InstanceHandle>> {
        self.instances.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn config(&self) -> RegistryConfig {
        *self.config.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_config(&self, config: RegistryConfig) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
    }

    fn new_handle(&self, name: &str) -> InstanceHandle {
        InstanceHandle::new(
            name,
            self.config().stale_after,
            Arc::clone(&self.clock),
            Arc::clone(&self.sink),
        )
    }

    /// One sweep: inspect every instance and remove those that are stale.
    ///
    /// Candidates are collected under the read lock and re-checked under the
    /// write lock, so an instance touched in between survives.
    pub(crate) fn evict_stale(&self) -> SweepStats {
        let started = Instant::now();
        let now = self.clock.now();

        let candidates: Vec<(String, InstanceHandle)> = self
            .instances()
            .iter()
            .map(|(name, handle)| (name.clone(), handle.clone()))
            .collect();

        let mut stats = SweepStats {
            scanned: candidates.len(),
            ..SweepStats::default()
        };

        let mut stale = Vec::new();
        for (name, handle) in candidates {
            match handle.try_stale(now) {
                Ok(true) => stale.push((name, handle)),
                Ok(false) => {}
                Err(err) => {
                    stats.failed += 1;
                    warn!(event = "Sweep", phase = "Inspect", instance = %name, error = %err);
                }
            }
        }

        if !stale.is_empty() {
            let mut instances = self.instances_mut();
            let now = self.clock.now();
            for (name, handle) in stale {
                let registered = instances
                    .get(&name)
                    .is_some_and(|current| current.same_instance(&handle));
                if registered && matches!(handle.try_stale(now), Ok(true)) {
                    instances.remove(&name);
                    stats.evicted += 1;
                    info!(event = "Sweep", phase = "Evicted", instance = %name);
                }
            }
        }

        stats.duration = started.elapsed();
        debug!(
            event = "Sweep",
            phase = "Done",
            scanned = stats.scanned,
            evicted = stats.evicted,
            failed = stats.failed
        );
        self.sink.on_sweep(&stats);
        stats
    }
}

/// A set of named instances, each holding its own phase timers, plus a
/// background thread that evicts instances left idle for too long.
///
/// The sweep thread starts on the first call to [`configure`], [`create_instance`]
/// or [`get_or_create_instance`], and again on first use after [`shutdown`].
///
/// [`configure`]: TimerRegistry::configure
/// [`create_instance`]: TimerRegistry::create_instance
/// [`get_or_create_instance`]: TimerRegistry::get_or_create_instance
/// [`shutdown`]: TimerRegistry::shutdown
///
/// ```rust
/// use phasewatch::TimerRegistry;
///
/// let registry = TimerRegistry::default();
/// let request = registry.get_or_create_instance("request-42");
/// request.start("parse");
/// request.stop("parse");
/// assert!(request.render_report().starts_with("parse\t"));
/// registry.shutdown();
/// ```
pub struct TimerRegistry {
    shared: Arc<Shared>,
    sweeper: Mutex<SweeperSlot>,
    // Lock-free check for the registration hot path.
    active: AtomicBool,
    spawn: Box<SpawnFn>,
}

impl Default for TimerRegistry {
    fn default() -> Self {
        TimerRegistryBuilder::default().assemble()
    }
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> TimerRegistryBuilder {
        TimerRegistryBuilder::default()
    }

    /// Replace the configuration and restart the sweep on the new interval.
    ///
    /// The new sweep thread is spawned before anything changes: on error the
    /// previous configuration and sweep stay in place. Existing instances keep
    /// the staleness threshold they were created with.
    pub fn configure(&self, config: RegistryConfig) -> Result<(), TimerError> {
        config.validate()?;

        let mut slot = self.sweeper();
        let started = (self.spawn)(Arc::clone(&self.shared), config.eviction_interval)?;

        self.shared.set_config(config);
        info!(
            event = "Registry",
            phase = "Configure",
            eviction_interval_days = config.eviction_interval_days(),
            stale_after_days = config.stale_after_days()
        );

        if let Some(old) = slot.running.replace(started) {
            old.stop();
        }
        slot.retry_after = None;
        self.active.store(true, Ordering::Release);
        Ok(())
    }

    /// [`configure`](TimerRegistry::configure) with the default three-day settings.
    pub fn configure_default(&self) -> Result<(), TimerError> {
        self.configure(RegistryConfig::default())
    }

    /// Register a new instance. Fails if `name` is already registered.
    pub fn create_instance(&self, name: &str) -> Result<InstanceHandle, TimerError> {
        self.ensure_sweeper();

        let mut instances = self.shared.instances_mut();
        if instances.contains_key(name) {
            return Err(TimerError::DuplicateInstance(name.to_string()));
        }

        let handle = self.shared.new_handle(name);
        instances.insert(name.to_string(), handle.clone());
        debug!(event = "Registry", phase = "Create", instance = name);
        Ok(handle)
    }

    /// The instance registered under `name`, created if absent.
    pub fn get_or_create_instance(&self, name: &str) -> InstanceHandle {
        self.ensure_sweeper();

        if let Some(handle) = self.shared.instances().get(name) {
            return handle.clone();
        }

        let mut instances = self.shared.instances_mut();
        instances
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(event = "Registry", phase = "Create", instance = name);
                self.shared.new_handle(name)
            })
            .clone()
    }

    /// Lookup without creating.
    pub fn instance(&self, name: &str) -> Option<InstanceHandle> {
        self.shared.instances().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.shared.instances().contains_key(name)
    }

    /// Remove the instance registered under `name`, if any.
    pub fn clear_instance(&self, name: &str) {
        if self.shared.instances_mut().remove(name).is_some() {
            debug!(event = "Registry", phase = "Clear", instance = name);
        }
    }

    pub fn len(&self) -> usize {
        self.shared.instances().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.instances().is_empty()
    }

    /// Registered instance names, sorted.
    pub fn instance_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shared.instances().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn config(&self) -> RegistryConfig {
        self.shared.config()
    }

    /// The active settings as `key=value` lines.
    pub fn configuration_summary(&self) -> String {
        self.shared.config().to_string()
    }

    /// Run one sweep on the calling thread.
    pub fn evict_stale(&self) -> SweepStats {
        self.shared.evict_stale()
    }

    pub fn is_sweeper_running(&self) -> bool {
        self.sweeper().is_running()
    }

    /// Stop the sweep thread, waiting for it to exit, and drop every instance.
    ///
    /// Safe to call repeatedly. The registry stays usable: the next
    /// registration or [`configure`](TimerRegistry::configure) starts a new sweep.
    pub fn shutdown(&self) {
        {
            let mut slot = self.sweeper();
            self.active.store(false, Ordering::Release);
            slot.retry_after = None;
            if let Some(sweeper) = slot.running.take() {
                sweeper.stop();
            }
        }
        self.shared.instances_mut().clear();
        info!(event = "Registry", phase = "Shutdown");
    }

    fn sweeper(&self) -> MutexGuard<'_, SweeperSlot> {
        self.sweeper.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the sweep thread if it is not running. After a failed spawn,
    /// retries wait at least [`SPAWN_RETRY_BACKOFF`].
    fn ensure_sweeper(&self) {
        if self.active.load(Ordering::Acquire) {
            return;
        }

        let mut slot = self.sweeper();
        if slot.is_running() {
            self.active.store(true, Ordering::Release);
            return;
        }
        let now = Instant::now();
        if slot.retry_after.is_some_and(|after| now < after) {
            return;
        }

        let interval = self.shared.config().eviction_interval;
        match (self.spawn)(Arc::clone(&self.shared), interval) {
            Ok(started) => {
                if let Some(old) = slot.running.replace(started) {
                    old.stop();
                }
                slot.retry_after = None;
                self.active.store(true, Ordering::Release);
            }
            Err(err) => {
                slot.retry_after = Some(now + SPAWN_RETRY_BACKOFF);
                warn!(event = "Sweeper", phase = "Spawn", error = %err, "continuing without eviction");
            }
        }
    }
}

impl Drop for TimerRegistry {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper().running.take() {
            sweeper.stop();
        }
    }
}

/// Builder for a [`TimerRegistry`] with a custom configuration, clock or sink.
#[derive(Default)]
pub struct TimerRegistryBuilder {
    config: RegistryConfig,
    clock: Option<Arc<dyn Clock>>,
    sink: Option<Arc<dyn MetricsSink>>,
}

impl TimerRegistryBuilder {
    pub fn config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Validate the configuration and build the registry. No thread is
    /// started until the registry is first used.
    pub fn build(self) -> Result<TimerRegistry, TimerError> {
        self.config.validate()?;
        Ok(self.assemble())
    }

    fn assemble(self) -> TimerRegistry {
        let shared = Shared {
            instances: RwLock::new(HashMap::new()),
            config: RwLock::new(self.config),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            sink: self.sink.unwrap_or_else(|| Arc::new(NoOpSink)),
        };
        TimerRegistry {
            shared: Arc::new(shared),
            sweeper: Mutex::new(SweeperSlot::default()),
            active: AtomicBool::new(false),
            spawn: Box::new(Sweeper::spawn),
        }
    }
}
