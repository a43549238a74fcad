//! Promoting the calling thread to real-time scheduling
//!
//! [`promote`] applies a sequence of [`ThreadPolicy`] requests to a
//! [`PolicyTarget`] and stops at the first rejection. Stages applied before the
//! rejection are not rolled back, so a failed promotion can leave the thread
//! fixed-priority without a time constraint. Callers are expected to carry on
//! with ordinary scheduling in that case.
//!
//! On macOS the target is [`MachThread`], the calling thread's Mach port. The
//! generic entry points ([`set_realtime_with`], [`set_realtime_ticks_with`])
//! take any target and clock so the sequencing can be driven without a kernel.

use std::marker::PhantomData;

use crate::config::RealtimeConfig;
use crate::error::{Error, KernReturn, Result};
use crate::policy::{promotion_plan, ThreadPolicy, TimeConstraintPolicy};
use crate::timebase::Clock;

/// Something that accepts `thread_policy_set` requests
pub trait PolicyTarget {
    fn apply(&mut self, policy: &ThreadPolicy) -> std::result::Result<(), KernReturn>;
}

/// Proof that the current thread holds a time-constraint policy
///
/// Required by [`crate::workgroup::join_workgroup`]: the OS rejects workgroup
/// joins from threads that are not real-time. Not `Send`, since the promotion
/// applies to the thread that performed it.
#[derive(Debug)]
pub struct Promoted {
    policy: TimeConstraintPolicy,
    _thread: PhantomData<*const ()>,
}

impl Promoted {
    pub(crate) fn new(policy: TimeConstraintPolicy) -> Self {
        Self {
            policy,
            _thread: PhantomData,
        }
    }

    /// The time-constraint policy the kernel accepted
    pub fn policy(&self) -> &TimeConstraintPolicy {
        &self.policy
    }
}

/// Apply each policy in order, stopping at the first rejection
pub fn promote<T>(target: &mut T, plan: &[ThreadPolicy]) -> Result<()>
where
    T: PolicyTarget + ?Sized,
{
    for policy in plan {
        let stage = policy.stage();
        if let Err(code) = target.apply(policy) {
            tracing::warn!(%stage, %code, "set_realtime thread_policy_set rejected");
            return Err(Error::PolicyRejected { stage, code });
        }
        tracing::debug!(%stage, "thread policy applied");
    }
    Ok(())
}

/// Promote `target` for a work period given in seconds
///
/// Reads the timebase from `clock`, derives the time-constraint policy, then
/// applies the extended, precedence and time-constraint policies in turn.
/// Invalid input is rejected before any policy reaches the target.
pub fn set_realtime_with<T, C>(
    target: &mut T,
    clock: &C,
    work_period_secs: f64,
    config: &RealtimeConfig,
) -> Result<Promoted>
where
    T: PolicyTarget + ?Sized,
    C: Clock + ?Sized,
{
    config.validate()?;
    let timebase = clock.timebase();
    let policy = TimeConstraintPolicy::from_work_period(work_period_secs, timebase, config)?;
    promote(target, &promotion_plan(policy, config.importance))?;
    Ok(Promoted::new(policy))
}

/// Apply a preemptible time-constraint policy from raw tick values
///
/// Only the time-constraint stage is applied; the thread's timeshare and
/// precedence settings are left as they are.
pub fn set_realtime_ticks_with<T>(
    target: &mut T,
    period: u32,
    computation: u32,
    constraint: u32,
) -> Result<Promoted>
where
    T: PolicyTarget + ?Sized,
{
    let policy = TimeConstraintPolicy::from_ticks(period, computation, constraint)?;
    promote(target, &[ThreadPolicy::TimeConstraint(policy)])?;
    Ok(Promoted::new(policy))
}

/// Promote the calling thread for `work_period_secs` with default tuning
///
/// `work_period_secs` is the playout time of one audio buffer,
/// e.g. `128.0 / 44_100.0`.
pub fn set_realtime(work_period_secs: f64) -> Result<Promoted> {
    set_realtime_configured(work_period_secs, &RealtimeConfig::default())
}

/// Promote the calling thread for `work_period_secs`
pub fn set_realtime_configured(work_period_secs: f64, config: &RealtimeConfig) -> Result<Promoted> {
    #[cfg(target_os = "macos")]
    {
        let mut thread = MachThread::current();
        set_realtime_with(&mut thread, &crate::timebase::HostClock, work_period_secs, config)
    }

    #[cfg(not(target_os = "macos"))]
    {
        // Bad input is reported as such on every host
        config.validate()?;
        let timebase = crate::timebase::HostClock.timebase();
        TimeConstraintPolicy::from_work_period(work_period_secs, timebase, config)?;
        tracing::warn!("Mach time-constraint policies are unavailable on this platform");
        Err(Error::Unsupported("Mach time-constraint scheduling"))
    }
}

/// Apply raw time-constraint ticks to the calling thread
pub fn set_realtime_ticks(period: u32, computation: u32, constraint: u32) -> Result<Promoted> {
    #[cfg(target_os = "macos")]
    {
        let mut thread = MachThread::current();
        set_realtime_ticks_with(&mut thread, period, computation, constraint)
    }

    #[cfg(not(target_os = "macos"))]
    {
        TimeConstraintPolicy::from_ticks(period, computation, constraint)?;
        tracing::warn!("Mach time-constraint policies are unavailable on this platform");
        Err(Error::Unsupported("Mach time-constraint scheduling"))
    }
}

/// The calling thread's Mach port
#[cfg(target_os = "macos")]
#[derive(Debug)]
pub struct MachThread {
    port: crate::sys::thread_act_t,
    _thread: PhantomData<*const ()>,
}

#[cfg(target_os = "macos")]
impl MachThread {
    pub fn current() -> Self {
        // SAFETY: pthread_self is always a live thread; the returned port is
        // owned by the pthread and needs no deallocation.
        let port = unsafe { crate::sys::pthread_mach_thread_np(libc::pthread_self()) };
        Self {
            port,
            _thread: PhantomData,
        }
    }
}

#[cfg(target_os = "macos")]
impl PolicyTarget for MachThread {
    fn apply(&mut self, policy: &ThreadPolicy) -> std::result::Result<(), KernReturn> {
        use crate::sys;

        let result = match *policy {
            ThreadPolicy::Extended { timeshare } => {
                let mut data = sys::thread_extended_policy_data_t {
                    timeshare: sys::boolean_t::from(timeshare),
                };
                // SAFETY: flavor and struct layout match <mach/thread_policy.h>.
                unsafe { set_policy(self.port, sys::THREAD_EXTENDED_POLICY, &mut data) }
            }
            ThreadPolicy::Precedence { importance } => {
                let mut data = sys::thread_precedence_policy_data_t { importance };
                // SAFETY: flavor and struct layout match <mach/thread_policy.h>.
                unsafe { set_policy(self.port, sys::THREAD_PRECEDENCE_POLICY, &mut data) }
            }
            ThreadPolicy::TimeConstraint(tc) => {
                let mut data = sys::thread_time_constraint_policy_data_t {
                    period: tc.period,
                    computation: tc.computation,
                    constraint: tc.constraint,
                    preemptible: sys::boolean_t::from(tc.preemptible),
                };
                // SAFETY: flavor and struct layout match <mach/thread_policy.h>.
                unsafe { set_policy(self.port, sys::THREAD_TIME_CONSTRAINT_POLICY, &mut data) }
            }
        };

        if result == sys::KERN_SUCCESS {
            Ok(())
        } else {
            Err(KernReturn(result))
        }
    }
}

/// # Safety
///
/// `P` must be the policy struct that `flavor` expects.
#[cfg(target_os = "macos")]
unsafe fn set_policy<P>(
    port: crate::sys::thread_act_t,
    flavor: crate::sys::thread_policy_flavor_t,
    data: &mut P,
) -> crate::sys::kern_return_t {
    use crate::sys;

    let count = (std::mem::size_of::<P>() / std::mem::size_of::<sys::integer_t>())
        as sys::mach_msg_type_number_t;
    // SAFETY: `data` is a live, writable policy struct of `count` words.
    unsafe { sys::thread_policy_set(port, flavor, (data as *mut P).cast(), count) }
}
