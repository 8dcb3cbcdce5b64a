//! Registry configuration: how often the eviction sweep runs and how long an
//! instance may sit idle before the sweep removes it.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TimerError;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

pub const DEFAULT_EVICTION_INTERVAL_DAYS: u32 = 3;
pub const DEFAULT_STALE_AFTER_DAYS: u32 = 3;

/// Eviction settings for a [`TimerRegistry`](crate::TimerRegistry).
///
/// Both values are plain [`Duration`]s so the struct can be embedded in a host
/// application's own configuration file. [`RegistryConfig::from_days`] is the
/// usual constructor; the `with_*` methods allow sub-day values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Time between two eviction sweeps.
    pub eviction_interval: Duration,
    /// Idle time after which an instance is considered stale.
    pub stale_after: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            eviction_interval: days(DEFAULT_EVICTION_INTERVAL_DAYS),
            stale_after: days(DEFAULT_STALE_AFTER_DAYS),
        }
    }
}

impl RegistryConfig {
    /// Build a configuration from whole days. Both values must be at least one.
    pub fn from_days(eviction_interval_days: u32, stale_after_days: u32) -> Result<Self, TimerError> {
        if eviction_interval_days < 1 {
            return Err(TimerError::InvalidConfiguration(format!(
                "eviction interval must be at least one day, got {eviction_interval_days}"
            )));
        }
        if stale_after_days < 1 {
            return Err(TimerError::InvalidConfiguration(format!(
                "stale threshold must be at least one day, got {stale_after_days}"
            )));
        }

        Ok(Self {
            eviction_interval: days(eviction_interval_days),
            stale_after: days(stale_after_days),
        })
    }

    pub fn with_eviction_interval(mut self, interval: Duration) -> Self {
        self.eviction_interval = interval;
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Check the configuration can drive a sweep.
    ///
    /// A zero staleness threshold is accepted: every idle instance is stale.
    pub fn validate(&self) -> Result<(), TimerError> {
        if self.eviction_interval.is_zero() {
            return Err(TimerError::InvalidConfiguration(
                "eviction interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn eviction_interval_days(&self) -> f64 {
        as_days(self.eviction_interval)
    }

    pub fn stale_after_days(&self) -> f64 {
        as_days(self.stale_after)
    }
}

/// Renders one `key=value` line per setting.
impl Display for RegistryConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        writeln!(f, "eviction_interval_days={}", self.eviction_interval_days())?;
        writeln!(f, "stale_after_days={}", self.stale_after_days())
    }
}

fn days(n: u32) -> Duration {
    Duration::from_secs(u64::from(n) * SECONDS_PER_DAY)
}

fn as_days(d: Duration) -> f64 {
    d.as_secs_f64() / SECONDS_PER_DAY as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_json_snapshot;
    use yare::parameterized;

    #[test]
    fn test_default_is_three_days_each() {
        let config = RegistryConfig::default();
        assert_eq!(config.eviction_interval, Duration::from_secs(3 * 86_400));
        assert_eq!(config.stale_after, Duration::from_secs(3 * 86_400));
        assert!(config.validate().is_ok());
    }

    #[parameterized(
        one_one = { 1, 1 },
        defaults = { 3, 3 },
        week_month = { 7, 30 },
    )]
    fn test_from_days_accepts_positive(interval: u32, stale: u32) {
        let config = RegistryConfig::from_days(interval, stale).unwrap();
        assert_eq!(config.eviction_interval_days(), f64::from(interval));
        assert_eq!(config.stale_after_days(), f64::from(stale));
    }

    #[parameterized(
        zero_interval = { 0, 3 },
        zero_stale = { 3, 0 },
        both_zero = { 0, 0 },
    )]
    fn test_from_days_rejects_zero(interval: u32, stale: u32) {
        let result = RegistryConfig::from_days(interval, stale);
        assert!(matches!(result, Err(TimerError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_zero_interval_fails_validation() {
        let config = RegistryConfig::default().with_eviction_interval(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_stale_after_is_valid() {
        let config = RegistryConfig::default().with_stale_after(Duration::ZERO);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_display_lists_key_value_lines() {
        let config = RegistryConfig::from_days(1, 5).unwrap();
        assert_eq!(
            config.to_string(),
            "eviction_interval_days=1\nstale_after_days=5\n"
        );
    }

    #[test]
    fn test_display_fractional_days() {
        let config = RegistryConfig::default().with_stale_after(Duration::from_secs(12 * 3600));
        assert!(config.to_string().contains("stale_after_days=0.5\n"));
    }

    #[test]
    fn test_serialized_form() {
        let config = RegistryConfig::from_days(1, 2).unwrap();
        assert_json_snapshot!(config, @r#"
        {
          "eviction_interval": {
            "secs": 86400,
            "nanos": 0
          },
          "stale_after": {
            "secs": 172800,
            "nanos": 0
          }
        }
        "#);
    }

    #[test]
    fn test_deserialize_roundtrip_from_json() {
        let json = r#"{"eviction_interval":{"secs":60,"nanos":0},"stale_after":{"secs":120,"nanos":0}}"#;
        let config: RegistryConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.eviction_interval, Duration::from_secs(60));
        assert_eq!(config.stale_after, Duration::from_secs(120));
    }
}
