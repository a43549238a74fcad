// Shared test doubles for the Mach policy, clock, and workgroup seams
//
// Each integration test file pulls in only what it needs.
#![allow(dead_code)]

use machrt::config::RealtimeConfig;
use machrt::policy::{PolicyStage, ThreadPolicy};
use machrt::realtime::{set_realtime_with, PolicyTarget, Promoted};
use machrt::timebase::{Clock, Timebase};
use machrt::workgroup::WorkgroupBackend;
use machrt::KernReturn;
use std::cell::{Cell, RefCell};

/// Records every policy it accepts; rejects the configured stage
#[derive(Debug, Default)]
pub struct RecordingTarget {
    pub calls: Vec<PolicyStage>,
    pub accepted: Vec<ThreadPolicy>,
    pub reject: Option<(PolicyStage, KernReturn)>,
}

impl RecordingTarget {
    pub fn accepting() -> Self {
        Self::default()
    }

    pub fn rejecting(stage: PolicyStage, code: KernReturn) -> Self {
        Self {
            reject: Some((stage, code)),
            ..Self::default()
        }
    }
}

impl PolicyTarget for RecordingTarget {
    fn apply(&mut self, policy: &ThreadPolicy) -> Result<(), KernReturn> {
        self.calls.push(policy.stage());
        match self.reject {
            Some((stage, code)) if stage == policy.stage() => Err(code),
            _ => {
                self.accepted.push(*policy);
                Ok(())
            }
        }
    }
}

/// Clock that advances `step` ticks on every read
pub struct SteppingClock {
    pub timebase: Timebase,
    now: Cell<u64>,
    step: u64,
}

impl SteppingClock {
    pub fn new(timebase: Timebase, step: u64) -> Self {
        Self {
            timebase,
            now: Cell::new(0),
            step,
        }
    }
}

impl Clock for SteppingClock {
    fn timebase(&self) -> Timebase {
        self.timebase
    }

    fn now(&self) -> u64 {
        let now = self.now.get();
        self.now.set(now + self.step);
        now
    }
}

/// One interval call as seen by the workgroup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalCall {
    Start { start: u64, deadline: u64 },
    Finish,
}

/// Workgroup whose calls return scripted errno values
#[derive(Debug, Default)]
pub struct ScriptedWorkgroup {
    pub join_code: i32,
    /// Cycle indices (0-based) whose start call fails, with the code
    pub failing_starts: Vec<(usize, i32)>,
    pub failing_finishes: Vec<(usize, i32)>,
    pub joins: Cell<u32>,
    pub leaves: Cell<u32>,
    pub calls: RefCell<Vec<IntervalCall>>,
    pub starts: Cell<usize>,
    pub finishes: Cell<usize>,
}

impl ScriptedWorkgroup {
    pub fn accepting() -> Self {
        Self::default()
    }

    pub fn rejecting(join_code: i32) -> Self {
        Self {
            join_code,
            ..Self::default()
        }
    }
}

#[derive(Debug)]
pub struct Token(pub u64);

impl WorkgroupBackend for ScriptedWorkgroup {
    type Token = Token;

    fn join(&self) -> Result<Token, i32> {
        self.joins.set(self.joins.get() + 1);
        if self.join_code == 0 {
            Ok(Token(u64::from(self.joins.get())))
        } else {
            Err(self.join_code)
        }
    }

    fn leave(&self, _token: Token) {
        self.leaves.set(self.leaves.get() + 1);
    }

    fn interval_start(&self, start: u64, deadline: u64) -> Result<(), i32> {
        let index = self.starts.get();
        self.starts.set(index + 1);
        self.calls.borrow_mut().push(IntervalCall::Start { start, deadline });
        match self.failing_starts.iter().find(|(i, _)| *i == index) {
            Some((_, code)) => Err(*code),
            None => Ok(()),
        }
    }

    fn interval_finish(&self) -> Result<(), i32> {
        let index = self.finishes.get();
        self.finishes.set(index + 1);
        self.calls.borrow_mut().push(IntervalCall::Finish);
        match self.failing_finishes.iter().find(|(i, _)| *i == index) {
            Some((_, code)) => Err(*code),
            None => Ok(()),
        }
    }
}

/// A promotion obtained through an accepting mock target
pub fn promoted() -> Promoted {
    let mut target = RecordingTarget::accepting();
    let clock = SteppingClock::new(Timebase::NANOSECONDS, 1);
    set_realtime_with(&mut target, &clock, 0.0029, &RealtimeConfig::default())
        .expect("accepting target promotes")
}
