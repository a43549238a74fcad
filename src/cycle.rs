//! Deadline-bracketed work cycles
//!
//! Each cycle reads the clock, announces `[now, now + interval]` to the
//! workgroup, runs the caller's work, and reports completion. Start and finish
//! failures are counted in the [`CycleReport`] and never end the loop; only the
//! stop signal, the work closure, or the optional cycle limit do.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::realtime::Promoted;
use crate::timebase::{Clock, Timebase};
use crate::workgroup::{join_workgroup, JoinGuard, WorkgroupBackend};

/// Interval start/finish notifications around each cycle
pub trait CycleBracket {
    fn start(&self, start: u64, deadline: u64) -> std::result::Result<(), i32>;
    fn finish(&self) -> std::result::Result<(), i32>;
}

impl<W> CycleBracket for JoinGuard<'_, W>
where
    W: WorkgroupBackend + ?Sized,
{
    fn start(&self, start: u64, deadline: u64) -> std::result::Result<(), i32> {
        self.interval_start(start, deadline)
    }

    fn finish(&self) -> std::result::Result<(), i32> {
        self.interval_finish()
    }
}

/// Cycles that belong to no workgroup
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbracketed;

impl CycleBracket for Unbracketed {
    fn start(&self, _start: u64, _deadline: u64) -> std::result::Result<(), i32> {
        Ok(())
    }

    fn finish(&self) -> std::result::Result<(), i32> {
        Ok(())
    }
}

/// Shared cancellation flag, checked once per cycle
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// What the work closure sees for one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleContext {
    /// Zero-based cycle number
    pub index: u64,
    /// Cycle start, in clock ticks
    pub start: u64,
    /// Latest acceptable finish, in clock ticks
    pub deadline: u64,
}

/// Returned by the work closure to keep going or end the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleControl {
    Continue,
    Stop,
}

/// Counters for one run of the cycle loop
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub cycles: u64,
    pub interval_ticks: u64,
    pub start_failures: u64,
    pub finish_failures: u64,
    pub last_start_error: Option<i32>,
    pub last_finish_error: Option<i32>,
    /// Cycles that finished after their deadline
    pub deadline_misses: u64,
    pub min_cycle_ticks: Option<u64>,
    pub max_cycle_ticks: Option<u64>,
    pub total_cycle_ticks: u64,
    pub timebase: Timebase,
}

impl CycleReport {
    fn new(interval_ticks: u64, timebase: Timebase) -> Self {
        Self {
            cycles: 0,
            interval_ticks,
            start_failures: 0,
            finish_failures: 0,
            last_start_error: None,
            last_finish_error: None,
            deadline_misses: 0,
            min_cycle_ticks: None,
            max_cycle_ticks: None,
            total_cycle_ticks: 0,
            timebase,
        }
    }

    fn record_cycle(&mut self, ticks: u64, missed_deadline: bool) {
        self.cycles += 1;
        self.total_cycle_ticks = self.total_cycle_ticks.saturating_add(ticks);
        self.min_cycle_ticks = Some(self.min_cycle_ticks.map_or(ticks, |m| m.min(ticks)));
        self.max_cycle_ticks = Some(self.max_cycle_ticks.map_or(ticks, |m| m.max(ticks)));
        if missed_deadline {
            self.deadline_misses += 1;
        }
    }

    pub fn mean_cycle_ticks(&self) -> Option<f64> {
        if self.cycles == 0 {
            None
        } else {
            Some(self.total_cycle_ticks as f64 / self.cycles as f64)
        }
    }

    fn ms(&self, ticks: f64) -> f64 {
        self.timebase.ticks_to_ms(ticks)
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "cycles completed: {}", self.cycles)?;
        writeln!(
            f,
            "interval: {:.3} ms ({} ticks)",
            self.ms(self.interval_ticks as f64),
            self.interval_ticks
        )?;
        if let (Some(min), Some(max), Some(mean)) = (
            self.min_cycle_ticks,
            self.max_cycle_ticks,
            self.mean_cycle_ticks(),
        ) {
            writeln!(
                f,
                "cycle time: min {:.3} ms, mean {:.3} ms, max {:.3} ms",
                self.ms(min as f64),
                self.ms(mean),
                self.ms(max as f64)
            )?;
        }
        writeln!(f, "deadline misses: {}", self.deadline_misses)?;
        write!(
            f,
            "interval start failures: {}, finish failures: {}",
            self.start_failures, self.finish_failures
        )?;
        if let Some(code) = self.last_start_error {
            write!(f, " (last start error {})", code)?;
        }
        if let Some(code) = self.last_finish_error {
            write!(f, " (last finish error {})", code)?;
        }
        Ok(())
    }
}

/// Work-cycle loop with a fixed interval length
#[derive(Debug, Clone)]
pub struct CycleLoop<C: Clock> {
    clock: C,
    timebase: Timebase,
    interval_ticks: u64,
    max_cycles: Option<u64>,
}

impl<C: Clock> CycleLoop<C> {
    /// Loop whose deadlines sit `interval_secs` after each cycle start
    ///
    /// The interval is converted to ticks once, with the clock's timebase.
    pub fn new(clock: C, interval_secs: f64) -> Result<Self> {
        if !interval_secs.is_finite() || interval_secs <= 0.0 {
            tracing::warn!(interval_secs, "cycle interval must be finite and positive");
            return Err(Error::InvalidConfig(format!(
                "interval must be positive, got {} s",
                interval_secs
            )));
        }
        let timebase = clock.timebase();
        let interval_ticks = timebase.secs_to_ticks(interval_secs);
        if interval_ticks == 0 {
            tracing::warn!(interval_secs, "cycle interval is shorter than one clock tick");
            return Err(Error::InvalidConfig(format!(
                "interval {} s is shorter than one clock tick",
                interval_secs
            )));
        }
        Ok(Self {
            clock,
            timebase,
            interval_ticks,
            max_cycles: None,
        })
    }

    /// Stop after `cycles` iterations (`0` means no limit)
    pub fn with_max_cycles(mut self, cycles: u64) -> Self {
        self.max_cycles = if cycles == 0 { None } else { Some(cycles) };
        self
    }

    pub fn interval_ticks(&self) -> u64 {
        self.interval_ticks
    }

    pub fn timebase(&self) -> Timebase {
        self.timebase
    }

    /// Run cycles until stopped
    pub fn run<B, F>(&self, bracket: &B, stop: &StopSignal, mut work: F) -> CycleReport
    where
        B: CycleBracket + ?Sized,
        F: FnMut(&CycleContext) -> CycleControl,
    {
        let mut report = CycleReport::new(self.interval_ticks, self.timebase);

        while !stop.is_stopped() && self.max_cycles.map_or(true, |max| report.cycles < max) {
            let start = self.clock.now();
            let deadline = start.saturating_add(self.interval_ticks);

            if let Err(code) = bracket.start(start, deadline) {
                tracing::trace!(code, cycle = report.cycles, "os_workgroup_interval_start failed");
                report.start_failures += 1;
                report.last_start_error = Some(code);
            }

            let ctx = CycleContext {
                index: report.cycles,
                start,
                deadline,
            };
            let control = work(&ctx);

            if let Err(code) = bracket.finish() {
                tracing::trace!(code, cycle = report.cycles, "os_workgroup_interval_finish failed");
                report.finish_failures += 1;
                report.last_finish_error = Some(code);
            }

            let end = self.clock.now();
            report.record_cycle(end.saturating_sub(start), end > deadline);

            if control == CycleControl::Stop {
                break;
            }
        }

        if report.start_failures > 0 || report.finish_failures > 0 {
            tracing::warn!(
                start_failures = report.start_failures,
                finish_failures = report.finish_failures,
                "workgroup interval calls failed during cycle loop"
            );
        }
        report
    }
}

/// Join `workgroup`, run the cycle loop inside it, and leave
///
/// The workgroup is left on every exit path, including a panic in `work`.
pub fn run_joined<W, C, F>(
    promoted: &Promoted,
    workgroup: &W,
    cycles: &CycleLoop<C>,
    stop: &StopSignal,
    work: F,
) -> Result<CycleReport>
where
    W: WorkgroupBackend + ?Sized,
    C: Clock,
    F: FnMut(&CycleContext) -> CycleControl,
{
    let guard = join_workgroup(promoted, workgroup)?;
    let report = cycles.run(&guard, stop, work);
    guard.leave();
    Ok(report)
}
