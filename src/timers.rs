//! Start/stop timestamps for a single named phase.
//!
//! A [`PhaseTimer`] records at most one start and one stop. Later calls are
//! ignored, so the first start and the first stop always win.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::time::{Duration, Instant};

use crate::models::PhaseState;

pub const NOT_STARTED: &str = "<Timer was not started.>";
pub const NOT_STOPPED: &str = "<Timer was not stopped.>";

/// Timestamps for one phase.
///
/// # Example
///
/// ```rust
/// use phasewatch::PhaseTimer;
/// use std::time::{Duration, Instant};
///
/// let mut timer = PhaseTimer::new();
/// let t0 = Instant::now();
/// timer.start(t0);
/// timer.stop(t0 + Duration::from_millis(42));
/// assert_eq!(timer.render_duration(), "42 ms");
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTimer {
    started_at: Option<Instant>,
    stopped_at: Option<Instant>,
}

impl PhaseTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `now` as the start time unless one is already set.
    pub fn start(&mut self, now: Instant) {
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
    }

    /// Record `now` as the stop time unless one is already set.
    ///
    /// Stopping a timer that was never started is allowed; it still renders as
    /// not started. Returns `true` when this call recorded the stop time.
    pub fn stop(&mut self, now: Instant) -> bool {
        if self.stopped_at.is_some() {
            return false;
        }
        self.stopped_at = Some(now);
        true
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn stopped_at(&self) -> Option<Instant> {
        self.stopped_at
    }

    pub fn state(&self) -> PhaseState {
        match (self.started_at, self.stopped_at) {
            (None, _) => PhaseState::NotStarted,
            (Some(_), None) => PhaseState::Running,
            (Some(_), Some(_)) => PhaseState::Stopped,
        }
    }

    /// Time between start and stop, if both were recorded.
    pub fn elapsed(&self) -> Option<Duration> {
        match (self.started_at, self.stopped_at) {
            (Some(start), Some(stop)) => Some(stop.saturating_duration_since(start)),
            _ => None,
        }
    }

    /// Human readable duration in whole milliseconds, or a marker string when
    /// the timer was not started or not stopped.
    pub fn render_duration(&self) -> String {
        match self.state() {
            PhaseState::NotStarted => NOT_STARTED.to_string(),
            PhaseState::Running => NOT_STOPPED.to_string(),
            PhaseState::Stopped => {
                let millis = self.elapsed().unwrap_or_default().as_millis();
                format!("{millis} ms")
            }
        }
    }
}

impl Display for PhaseTimer {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.render_duration())
    }
}
