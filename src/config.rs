//! Tuning values for thread promotion and the work-cycle loop
//!
//! The defaults are the empirically chosen audio values: a 75% guaranteed and
//! 85% maximum duty cycle, importance 63, non-preemptible, and a 20ms I/O
//! interval for workgroup cycles. A TOML file may override any subset.
//!
//! ```toml
//! guaranteed_duty_cycle = 0.5
//! max_duty_cycle = 0.75
//! io_interval_secs = 0.010
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::policy::{AUDIO_THREAD_IMPORTANCE, GUARANTEED_AUDIO_DUTY_CYCLE, MAX_AUDIO_DUTY_CYCLE};

/// Default I/O interval time for workgroup cycles, in seconds
pub const DEFAULT_IO_INTERVAL_SECS: f64 = 0.020;

/// Real-time scheduling configuration
///
/// # Example
/// ```
/// use machrt::config::RealtimeConfig;
///
/// let config = RealtimeConfig::default();
/// assert_eq!(config.guaranteed_duty_cycle, 0.75);
/// assert_eq!(config.importance, 63);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RealtimeConfig {
    /// Fraction of each quantum guaranteed to the thread (0, 1]
    pub guaranteed_duty_cycle: f64,

    /// Largest fraction of each quantum the thread may use (0, 1]
    ///
    /// Must not be below `guaranteed_duty_cycle`.
    pub max_duty_cycle: f64,

    /// `THREAD_PRECEDENCE_POLICY` importance
    pub importance: i32,

    /// Whether the time-constraint computation may be interrupted
    pub preemptible: bool,

    /// Length of one workgroup interval, in seconds
    pub io_interval_secs: f64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            guaranteed_duty_cycle: GUARANTEED_AUDIO_DUTY_CYCLE,
            max_duty_cycle: MAX_AUDIO_DUTY_CYCLE,
            importance: AUDIO_THREAD_IMPORTANCE,
            preemptible: false,
            io_interval_secs: DEFAULT_IO_INTERVAL_SECS,
        }
    }
}

impl RealtimeConfig {
    /// Half-period computation budget, preemptible
    ///
    /// Leaves more headroom for other real-time threads at the cost of less
    /// guaranteed audio time.
    pub fn conservative() -> Self {
        Self {
            guaranteed_duty_cycle: 0.5,
            max_duty_cycle: 0.75,
            preemptible: true,
            ..Self::default()
        }
    }

    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        match self.problem() {
            None => Ok(()),
            Some(problem) => {
                tracing::warn!(%problem, "invalid real-time configuration");
                Err(Error::InvalidConfig(problem))
            }
        }
    }

    fn problem(&self) -> Option<String> {
        let duty = self.guaranteed_duty_cycle;
        if !(duty > 0.0 && duty <= 1.0) {
            return Some(format!(
                "guaranteed_duty_cycle must be in (0, 1], got {}",
                duty
            ));
        }

        if !(self.max_duty_cycle >= duty && self.max_duty_cycle <= 1.0) {
            return Some(format!(
                "max_duty_cycle must be in [guaranteed_duty_cycle, 1], got {}",
                self.max_duty_cycle
            ));
        }

        if !self.io_interval_secs.is_finite() || self.io_interval_secs <= 0.0 {
            return Some(format!(
                "io_interval_secs must be positive, got {}",
                self.io_interval_secs
            ));
        }

        None
    }
}
