//! machrt - real-time audio thread scheduling for macOS
//!
//! This library promotes the calling thread to a Mach time-constraint policy
//! sized from an audio buffer's work period, and joins promoted threads to
//! `os_workgroup` intervals with guaranteed leave-on-exit.
//!
//! ```no_run
//! use machrt::cycle::{run_joined, CycleControl, CycleLoop, StopSignal};
//! use machrt::timebase::HostClock;
//! use machrt::workgroup::{Workgroup, WorkgroupSource};
//!
//! let promoted = machrt::set_realtime(128.0 / 44_100.0)?;
//! let workgroup = Workgroup::resolve(&WorkgroupSource::DefaultOutputDevice)?;
//! let cycles = CycleLoop::new(HostClock, 0.020)?.with_max_cycles(100);
//! let report = run_joined(&promoted, &workgroup, &cycles, &StopSignal::new(), |_| {
//!     // render one buffer
//!     CycleControl::Continue
//! })?;
//! println!("{}", report);
//! # Ok::<(), machrt::Error>(())
//! ```

pub mod cli;
pub mod config;
pub mod cycle;
pub mod error;
pub mod ffi;
pub mod policy;
pub mod realtime;
#[cfg(target_os = "macos")]
mod sys;
pub mod thread;
pub mod timebase;
pub mod workgroup;

pub use error::{Error, JoinRejection, KernReturn, Result};
pub use policy::{work_period_for, TimeConstraintPolicy};
pub use realtime::{set_realtime, set_realtime_ticks, Promoted};
pub use workgroup::join_workgroup;
