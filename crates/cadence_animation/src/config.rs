//! Scheduler configuration

use cadence_platform::{Result, TimingError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default tick period in milliseconds
pub const TICK_INTERVAL_MS: u64 = 20;

/// Default tick period
///
/// Hosts advancing a simulated clock step by this to produce exactly one tick
/// of an interval-driven registry.
pub const TICK_INTERVAL: Duration = Duration::from_millis(TICK_INTERVAL_MS);

/// Configuration for an animation registry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Period of the interval tick source (ms)
    pub tick_interval_ms: u64,
    /// Tick before each repaint when a timing environment is bound.
    /// When false, a bound environment only supplies the clock.
    pub prefer_paint_sync: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl SchedulerConfig {
    /// Standard configuration, 20ms interval
    pub fn standard() -> Self {
        Self {
            tick_interval_ms: TICK_INTERVAL_MS,
            prefer_paint_sync: true,
        }
    }

    /// ~60fps interval for hosts without paint notifications
    pub fn smooth() -> Self {
        Self {
            tick_interval_ms: 16,
            prefer_paint_sync: true,
        }
    }

    /// Interval-only ticking, independent of any bound environment
    pub fn testing() -> Self {
        Self {
            tick_interval_ms: TICK_INTERVAL_MS,
            prefer_paint_sync: false,
        }
    }

    /// Set the interval period
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Interval period as a `Duration`
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(TimingError::InvalidConfig(
                "tick_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
