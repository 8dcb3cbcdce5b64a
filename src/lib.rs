//! Named phase timers grouped into instances, with background eviction of
//! instances that have not been used for a while.
//!
//! ```rust
//! use phasewatch::TimerRegistry;
//!
//! let registry = TimerRegistry::default();
//! let job = registry.get_or_create_instance("nightly-import");
//! job.start("download");
//! job.stop("download");
//! job.start("parse");
//!
//! let report = job.render_report();
//! assert!(report.contains("parse   \t<Timer was not stopped.>\n"));
//! registry.shutdown();
//! ```
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::RegistryConfig;
pub use error::TimerError;
pub use instance::{InstanceHandle, InstanceTimerSet, PhaseGuard};
pub use metrics::{MetricsSink, NoOpSink, PhaseStats, SweepStats};
pub use models::{InstanceSnapshot, PhaseSnapshot, PhaseState};
pub use registry::{TimerRegistry, TimerRegistryBuilder};
pub use timers::PhaseTimer;

use once_cell::sync::Lazy;

mod clock;
pub mod config;
mod error;
mod instance;
pub mod metrics;
mod models;
mod registry;
pub mod timers;

static GLOBAL: Lazy<TimerRegistry> = Lazy::new(TimerRegistry::default);

/// A process-wide registry with the default configuration, created on first
/// access. Prefer passing an owned [`TimerRegistry`] where practical.
pub fn global() -> &'static TimerRegistry {
    &GLOBAL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_is_a_single_registry() {
        let name = "lib::tests::global";
        let first = global().get_or_create_instance(name);
        first.start("phase");
        let second = global().get_or_create_instance(name);
        assert!(first.same_instance(&second));
        global().clear_instance(name);
        assert!(!global().contains(name));
    }
}
