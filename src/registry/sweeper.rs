//! Background thread that periodically evicts stale instances.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{info, warn};

use super::Shared;
use crate::error::TimerError;

const THREAD_NAME: &str = "phasewatch-sweeper";

/// A running sweep thread. Dropping the sender or calling [`Sweeper::stop`]
/// ends it.
pub(super) struct Sweeper {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    /// Spawn the sweep thread. It sweeps once per `interval`, the first time
    /// one interval after starting, until stopped.
    pub(super) fn spawn(shared: Arc<Shared>, interval: Duration) -> Result<Self, TimerError> {
        let (shutdown, signal) = crossbeam_channel::bounded(1);

        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || run(shared, interval, signal))
            .map_err(|err| TimerError::SweeperSpawn(err.to_string()))?;

        info!(
            event = "Sweeper",
            phase = "Started",
            interval_secs = interval.as_secs_f64()
        );

        Ok(Self { shutdown, handle })
    }

    pub(super) fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Signal the thread and wait for it to exit.
    pub(super) fn stop(self) {
        // A full or disconnected channel means the thread is already on its way out.
        let _ = self.shutdown.try_send(());
        if self.handle.join().is_err() {
            warn!(event = "Sweeper", phase = "Join", "sweep thread panicked");
        }
        info!(event = "Sweeper", phase = "Stopped");
    }
}

fn run(shared: Arc<Shared>, interval: Duration, signal: Receiver<()>) {
    loop {
        match signal.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        if panic::catch_unwind(AssertUnwindSafe(|| shared.evict_stale())).is_err() {
            warn!(event = "Sweep", phase = "Panicked", "sweep aborted, retrying next interval");
        }
    }
}
