//! Serializable views of timer state.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Where a single phase timer is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PhaseState {
    NotStarted,
    Running,
    Stopped,
}

/// One phase as seen at snapshot time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSnapshot {
    pub name: String,
    pub state: PhaseState,
    /// Set only when the phase was both started and stopped.
    pub elapsed: Option<Duration>,
}

/// Structured counterpart of the text report, phases in first-start order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSnapshot {
    pub name: String,
    pub phases: Vec<PhaseSnapshot>,
}

impl InstanceSnapshot {
    pub fn phase(&self, name: &str) -> Option<&PhaseSnapshot> {
        self.phases.iter().find(|p| p.name == name)
    }
}
