use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum TimerError {
    #[error("the instance name '{0}' is already registered")]
    DuplicateInstance(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("failed to spawn eviction sweeper: {0}")]
    SweeperSpawn(String),
}
