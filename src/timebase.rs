//! Monotonic clock timebase and tick conversions
//!
//! Mach absolute time counts CPU-specific ticks. `mach_timebase_info` reports
//! the length of one tick as the nanosecond ratio `numer / denom`, so one
//! millisecond spans `(denom / numer) * 1_000_000` ticks. On Intel Macs the
//! ratio is 1/1; Apple Silicon reports 125/3 (24 MHz).
//!
//! Hosts without Mach time fall back to `CLOCK_MONOTONIC` in nanoseconds with a
//! 1/1 timebase, so the cycle loop and conversions behave the same everywhere.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Nanoseconds in one millisecond
pub const NANOS_PER_MILLI: f64 = 1_000_000.0;

/// Tick duration as a nanosecond ratio (`numer / denom` ns per tick)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timebase {
    pub numer: u32,
    pub denom: u32,
}

impl Timebase {
    /// One tick per nanosecond (Intel Macs, and the non-Mach fallback)
    pub const NANOSECONDS: Timebase = Timebase { numer: 1, denom: 1 };

    /// Apple Silicon's 24 MHz timebase
    pub const APPLE_SILICON: Timebase = Timebase {
        numer: 125,
        denom: 3,
    };

    /// Build a timebase, rejecting a zero numerator or denominator
    pub fn new(numer: u32, denom: u32) -> Option<Self> {
        if numer == 0 || denom == 0 {
            None
        } else {
            Some(Self { numer, denom })
        }
    }

    /// Conversion factor from milliseconds to ticks
    pub fn ticks_per_ms(&self) -> f64 {
        (f64::from(self.denom) / f64::from(self.numer)) * NANOS_PER_MILLI
    }

    pub fn ms_to_ticks(&self, ms: f64) -> f64 {
        ms * self.ticks_per_ms()
    }

    pub fn ticks_to_ms(&self, ticks: f64) -> f64 {
        ticks / self.ticks_per_ms()
    }

    /// Convert seconds to whole ticks, truncating; saturates at `u64::MAX`
    pub fn secs_to_ticks(&self, secs: f64) -> u64 {
        self.ms_to_ticks(secs * 1000.0) as u64
    }

    /// Exact integer conversion of a tick count to wall-clock time
    pub fn ticks_to_duration(&self, ticks: u64) -> Duration {
        let nanos = u128::from(ticks) * u128::from(self.numer) / u128::from(self.denom);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

impl Default for Timebase {
    fn default() -> Self {
        Self::NANOSECONDS
    }
}

/// Source of monotonic timestamps in timebase ticks
pub trait Clock {
    /// Tick/nanosecond ratio for values returned by [`Clock::now`]
    fn timebase(&self) -> Timebase;

    /// Current monotonic time in ticks
    fn now(&self) -> u64;
}

/// The host's monotonic clock (`mach_absolute_time` on macOS)
#[derive(Debug, Clone, Copy, Default)]
pub struct HostClock;

#[cfg(target_os = "macos")]
impl Clock for HostClock {
    fn timebase(&self) -> Timebase {
        let mut info = crate::sys::mach_timebase_info_data_t::default();
        // SAFETY: `info` is a valid, writable mach_timebase_info_data_t.
        let result = unsafe { crate::sys::mach_timebase_info(&mut info) };
        if result != crate::sys::KERN_SUCCESS {
            tracing::warn!(
                result,
                "mach_timebase_info failed, assuming nanosecond ticks"
            );
            return Timebase::NANOSECONDS;
        }
        Timebase::new(info.numer, info.denom).unwrap_or_else(|| {
            tracing::warn!(
                numer = info.numer,
                denom = info.denom,
                "mach_timebase_info returned a zero ratio, assuming nanosecond ticks"
            );
            Timebase::NANOSECONDS
        })
    }

    fn now(&self) -> u64 {
        // SAFETY: mach_absolute_time has no preconditions.
        unsafe { crate::sys::mach_absolute_time() }
    }
}

#[cfg(not(target_os = "macos"))]
impl Clock for HostClock {
    fn timebase(&self) -> Timebase {
        Timebase::NANOSECONDS
    }

    fn now(&self) -> u64 {
        use nix::time::{clock_gettime, ClockId};

        match clock_gettime(ClockId::CLOCK_MONOTONIC) {
            Ok(ts) => (ts.tv_sec() as u64)
                .saturating_mul(1_000_000_000)
                .saturating_add(ts.tv_nsec() as u64),
            Err(e) => {
                tracing::warn!(error = %e, "clock_gettime(CLOCK_MONOTONIC) failed");
                0
            }
        }
    }
}
