//! Mach thread scheduling policies for audio work cycles
//!
//! A real-time audio thread is promoted in three steps, each a separate
//! `thread_policy_set` call:
//!
//! 1. `THREAD_EXTENDED_POLICY` with `timeshare = false` (fixed priority)
//! 2. `THREAD_PRECEDENCE_POLICY` with a high, non-maximum importance
//! 3. `THREAD_TIME_CONSTRAINT_POLICY` derived from the buffer's work period
//!
//! The time-constraint fields come from a millisecond [`CycleBudget`]: the
//! whole period is the quantum, the guaranteed and maximum computation times are
//! fixed duty-cycle fractions of it.
//!
//! # Example
//! ```
//! use machrt::config::RealtimeConfig;
//! use machrt::policy::TimeConstraintPolicy;
//! use machrt::timebase::Timebase;
//!
//! // 128 frames @ 44.1kHz on a nanosecond timebase
//! let policy = TimeConstraintPolicy::from_work_period(
//!     0.0029,
//!     Timebase::NANOSECONDS,
//!     &RealtimeConfig::default(),
//! )
//! .unwrap();
//! assert_eq!(policy.period, 2_900_000);
//! assert!(policy.computation <= policy.constraint);
//! assert!(!policy.preemptible);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::RealtimeConfig;
use crate::error::{Error, Result};
use crate::timebase::Timebase;

/// Share of each quantum the scheduler guarantees to the audio thread
pub const GUARANTEED_AUDIO_DUTY_CYCLE: f64 = 0.75;

/// Largest share of each quantum the audio thread may use
pub const MAX_AUDIO_DUTY_CYCLE: f64 = 0.85;

/// Precedence importance for promoted threads (high, below the maximum)
pub const AUDIO_THREAD_IMPORTANCE: i32 = 63;

/// Millisecond time budget for one work cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CycleBudget {
    /// Length of one work cycle
    pub quantum_ms: f64,
    /// Computation time guaranteed each quantum
    pub guaranteed_ms: f64,
    /// Maximum computation time allowed each quantum
    pub max_ms: f64,
}

impl CycleBudget {
    pub fn new(work_period_secs: f64, guaranteed_duty_cycle: f64, max_duty_cycle: f64) -> Self {
        let quantum_ms = work_period_secs * 1000.0;
        Self {
            quantum_ms,
            guaranteed_ms: guaranteed_duty_cycle * quantum_ms,
            max_ms: max_duty_cycle * quantum_ms,
        }
    }

    /// Budget using the configured duty cycles
    pub fn from_config(work_period_secs: f64, config: &RealtimeConfig) -> Self {
        Self::new(
            work_period_secs,
            config.guaranteed_duty_cycle,
            config.max_duty_cycle,
        )
    }
}

/// `thread_time_constraint_policy` in Mach absolute-time ticks
///
/// Invariant: `0 < period` and `computation <= constraint <= period`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeConstraintPolicy {
    pub period: u32,
    pub computation: u32,
    pub constraint: u32,
    pub preemptible: bool,
}

impl TimeConstraintPolicy {
    /// Derive the policy for a work period given in seconds
    ///
    /// Rejects periods that are not finite and positive, round down to zero
    /// ticks, or exceed the `u32` tick range of the kernel structure.
    pub fn from_work_period(
        work_period_secs: f64,
        timebase: Timebase,
        config: &RealtimeConfig,
    ) -> Result<Self> {
        if !work_period_secs.is_finite() || work_period_secs <= 0.0 {
            tracing::warn!(work_period_secs, "work period must be finite and positive");
            return Err(Error::InvalidWorkPeriod(work_period_secs));
        }

        let budget = CycleBudget::from_config(work_period_secs, config);
        let period_ticks = timebase.ms_to_ticks(budget.quantum_ms);
        if period_ticks < 1.0 || period_ticks > f64::from(u32::MAX) {
            tracing::warn!(
                work_period_secs,
                period_ticks,
                "work period does not fit the u32 tick range"
            );
            return Err(Error::InvalidWorkPeriod(work_period_secs));
        }

        let policy = Self {
            period: period_ticks as u32,
            computation: timebase.ms_to_ticks(budget.guaranteed_ms) as u32,
            constraint: timebase.ms_to_ticks(budget.max_ms) as u32,
            preemptible: config.preemptible,
        };
        tracing::debug!(
            quantum_ms = budget.quantum_ms,
            guaranteed_ms = budget.guaranteed_ms,
            max_ms = budget.max_ms,
            ticks_per_ms = timebase.ticks_per_ms(),
            ?policy,
            "derived time-constraint policy"
        );
        policy.validate()?;
        Ok(policy)
    }

    /// Build a preemptible policy from raw tick values
    pub fn from_ticks(period: u32, computation: u32, constraint: u32) -> Result<Self> {
        let policy = Self {
            period,
            computation,
            constraint,
            preemptible: true,
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<()> {
        let problem = if self.period == 0 {
            "period must be non-zero".to_string()
        } else if self.computation > self.constraint {
            format!(
                "computation {} exceeds constraint {}",
                self.computation, self.constraint
            )
        } else if self.constraint > self.period {
            format!("constraint {} exceeds period {}", self.constraint, self.period)
        } else {
            return Ok(());
        };
        tracing::warn!(policy = ?self, %problem, "invalid time-constraint policy");
        Err(Error::InvalidPolicy(problem))
    }

    /// Convert back to a millisecond budget (lossy by tick truncation)
    pub fn budget(&self, timebase: Timebase) -> CycleBudget {
        CycleBudget {
            quantum_ms: timebase.ticks_to_ms(f64::from(self.period)),
            guaranteed_ms: timebase.ticks_to_ms(f64::from(self.computation)),
            max_ms: timebase.ticks_to_ms(f64::from(self.constraint)),
        }
    }
}

/// Which `thread_policy_set` flavor a promotion step uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PolicyStage {
    Extended,
    Precedence,
    TimeConstraint,
}

impl PolicyStage {
    /// Flavor name as spelled in `<mach/thread_policy.h>`
    pub fn flavor_name(&self) -> &'static str {
        match self {
            PolicyStage::Extended => "THREAD_EXTENDED_POLICY",
            PolicyStage::Precedence => "THREAD_PRECEDENCE_POLICY",
            PolicyStage::TimeConstraint => "THREAD_TIME_CONSTRAINT_POLICY",
        }
    }
}

impl fmt::Display for PolicyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.flavor_name())
    }
}

/// One `thread_policy_set` request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadPolicy {
    Extended { timeshare: bool },
    Precedence { importance: i32 },
    TimeConstraint(TimeConstraintPolicy),
}

impl ThreadPolicy {
    pub fn stage(&self) -> PolicyStage {
        match self {
            ThreadPolicy::Extended { .. } => PolicyStage::Extended,
            ThreadPolicy::Precedence { .. } => PolicyStage::Precedence,
            ThreadPolicy::TimeConstraint(_) => PolicyStage::TimeConstraint,
        }
    }
}

/// The full three-step promotion, in application order
pub fn promotion_plan(policy: TimeConstraintPolicy, importance: i32) -> [ThreadPolicy; 3] {
    [
        ThreadPolicy::Extended { timeshare: false },
        ThreadPolicy::Precedence { importance },
        ThreadPolicy::TimeConstraint(policy),
    ]
}

/// Work period of one audio buffer: `frames / sample_rate` seconds
pub fn work_period_for(frames: u32, sample_rate: f64) -> f64 {
    f64::from(frames) / sample_rate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_for_128_frames() {
        let budget = CycleBudget::new(0.0029, 0.75, 0.85);
        assert!((budget.quantum_ms - 2.9).abs() < 1e-9);
        assert!((budget.guaranteed_ms - 2.175).abs() < 1e-9);
        assert!((budget.max_ms - 2.465).abs() < 1e-9);
    }

    #[test]
    fn test_policy_on_apple_silicon_timebase() {
        let policy = TimeConstraintPolicy::from_work_period(
            0.0029,
            Timebase::APPLE_SILICON,
            &RealtimeConfig::default(),
        )
        .unwrap();
        assert_eq!(policy.period, 69_600);
        assert!((52_199..=52_200).contains(&policy.computation));
        assert_eq!(policy.constraint, 59_160);
        assert!(!policy.preemptible);
    }

    #[test]
    fn test_rejects_non_positive_period() {
        let config = RealtimeConfig::default();
        for bad in [0.0, -0.001, f64::NAN, f64::INFINITY] {
            let result = TimeConstraintPolicy::from_work_period(bad, Timebase::NANOSECONDS, &config);
            assert!(matches!(result, Err(Error::InvalidWorkPeriod(_))));
        }
    }

    #[test]
    fn test_rejects_period_beyond_u32_ticks() {
        // 5s is 5e9 nanosecond ticks
        let result = TimeConstraintPolicy::from_work_period(
            5.0,
            Timebase::NANOSECONDS,
            &RealtimeConfig::default(),
        );
        assert!(matches!(result, Err(Error::InvalidWorkPeriod(_))));
    }

    #[test]
    fn test_rejects_sub_tick_period() {
        let result = TimeConstraintPolicy::from_work_period(
            1e-12,
            Timebase::NANOSECONDS,
            &RealtimeConfig::default(),
        );
        assert!(matches!(result, Err(Error::InvalidWorkPeriod(_))));
    }

    #[test]
    fn test_from_ticks_is_preemptible() {
        let policy = TimeConstraintPolicy::from_ticks(100_000, 50_000, 75_000).unwrap();
        assert!(policy.preemptible);
    }

    #[test]
    fn test_from_ticks_rejects_computation_above_constraint() {
        let err = TimeConstraintPolicy::from_ticks(100_000, 100_000, 50_000).unwrap_err();
        assert!(err.to_string().contains("computation"));
    }

    #[test]
    fn test_from_ticks_rejects_constraint_above_period() {
        let err = TimeConstraintPolicy::from_ticks(10, 5, 20).unwrap_err();
        assert!(err.to_string().contains("constraint"));
    }

    #[test]
    fn test_from_ticks_rejects_zero_period() {
        assert!(TimeConstraintPolicy::from_ticks(0, 0, 0).is_err());
    }

    #[test]
    fn test_promotion_plan_order() {
        let policy = TimeConstraintPolicy::from_ticks(10, 5, 8).unwrap();
        let stages: Vec<_> = promotion_plan(policy, 63).iter().map(|p| p.stage()).collect();
        assert_eq!(
            stages,
            vec![
                PolicyStage::Extended,
                PolicyStage::Precedence,
                PolicyStage::TimeConstraint
            ]
        );
    }

    #[test]
    fn test_work_period_for_buffer() {
        let period = work_period_for(128, 44_100.0);
        assert!((period - 0.002_902_494).abs() < 1e-9);
    }

    #[test]
    fn test_budget_round_trip_through_ticks() {
        let timebase = Timebase::NANOSECONDS;
        let policy =
            TimeConstraintPolicy::from_work_period(0.010, timebase, &RealtimeConfig::default())
                .unwrap();
        let budget = policy.budget(timebase);
        assert!((budget.quantum_ms - 10.0).abs() < 1e-6);
        assert!((budget.guaranteed_ms - 7.5).abs() < 1e-6);
        assert!((budget.max_ms - 8.5).abs() < 1e-6);
    }
}
