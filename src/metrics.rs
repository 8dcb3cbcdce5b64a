//! Pluggable sink for timing and eviction events.
//!
//! The registry reports every completed phase and every sweep to a
//! [`MetricsSink`]. The default sink drops everything, so nothing is paid for
//! unless a sink is installed through [`TimerRegistryBuilder::sink`].
//!
//! [`TimerRegistryBuilder::sink`]: crate::TimerRegistryBuilder::sink
//!
//! ```ignore
//! use phasewatch::{MetricsSink, PhaseStats, SweepStats, TimerRegistry};
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use std::sync::Arc;
//!
//! #[derive(Default)]
//! struct CountingSink {
//!     phases: AtomicU64,
//! }
//!
//! impl MetricsSink for CountingSink {
//!     fn on_phase_stopped(&self, stats: &PhaseStats) {
//!         self.phases.fetch_add(1, Ordering::Relaxed);
//!         eprintln!("{}/{} took {:?}", stats.instance, stats.phase, stats.elapsed);
//!     }
//!
//!     fn on_sweep(&self, _stats: &SweepStats) {}
//! }
//!
//! let registry = TimerRegistry::builder()
//!     .sink(Arc::new(CountingSink::default()))
//!     .build();
//! ```

use serde::Serialize;
use std::time::Duration;

/// A phase that was stopped after having been started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseStats {
    /// Name of the owning instance
    pub instance: String,
    /// Name of the phase
    pub phase: String,
    /// Time between start and stop
    pub elapsed: Duration,
}

/// Outcome of one eviction sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepStats {
    /// Instances inspected
    pub scanned: usize,
    /// Instances removed as stale
    pub evicted: usize,
    /// Instances that could not be inspected and were skipped
    pub failed: usize,
    /// Wall time spent in the sweep
    pub duration: Duration,
}

/// Consumer of registry events.
///
/// Called synchronously from the thread that stopped the phase or ran the
/// sweep, so implementations must be thread-safe and should return quickly.
pub trait MetricsSink: Send + Sync {
    /// Called the first time a started phase is stopped.
    fn on_phase_stopped(&self, stats: &PhaseStats);

    /// Called after every sweep, including sweeps that evicted nothing.
    fn on_sweep(&self, stats: &SweepStats);
}

/// No-op sink; events are silently dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpSink;

impl MetricsSink for NoOpSink {
    fn on_phase_stopped(&self, _stats: &PhaseStats) {}
    fn on_sweep(&self, _stats: &SweepStats) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_stats_serialization() {
        let stats = PhaseStats {
            instance: "request-1".to_string(),
            phase: "parse".to_string(),
            elapsed: Duration::from_millis(42),
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["instance"], "request-1");
        assert_eq!(json["phase"], "parse");
        assert_eq!(json["elapsed"]["nanos"], 42_000_000);
    }

    #[test]
    fn test_sweep_stats_default_is_empty() {
        let stats = SweepStats::default();
        assert_eq!(stats.scanned, 0);
        assert_eq!(stats.evicted, 0);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.duration, Duration::ZERO);
    }

    #[test]
    fn test_noop_sink_impl() {
        let sink = NoOpSink;
        sink.on_phase_stopped(&PhaseStats {
            instance: "a".to_string(),
            phase: "b".to_string(),
            elapsed: Duration::from_micros(1),
        });
        sink.on_sweep(&SweepStats::default());
    }
}
