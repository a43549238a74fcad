//! Error types for thread promotion and workgroup membership
//!
//! Every failure is reported to the immediate caller as a value. Nothing in
//! this crate retries, asserts, or aborts: callers are expected to fall back to
//! ordinary (non-real-time) scheduling when promotion is refused.

use nix::errno::Errno;
use std::fmt;
use thiserror::Error;

use crate::policy::PolicyStage;

/// Errors for real-time scheduling operations
#[derive(Error, Debug)]
pub enum Error {
    /// The kernel refused a scheduling-policy change (typically under load)
    #[error("thread_policy_set {stage} rejected: {code}")]
    PolicyRejected { stage: PolicyStage, code: KernReturn },

    /// `os_workgroup_join` refused the calling thread
    #[error("os_workgroup_join rejected: {0}")]
    JoinRejected(JoinRejection),

    /// A Core Audio property query failed or returned nothing
    #[error("audio object {object} property query failed (OSStatus {status})")]
    PropertyQueryFailed { object: u32, status: i32 },

    /// The system has no default output device
    #[error("no default audio output device")]
    NoDefaultOutputDevice,

    /// `AudioWorkIntervalCreate` returned no interval
    #[error("failed to create work interval {name:?}")]
    IntervalCreateFailed { name: String },

    #[error("invalid work period {0} s: must be finite, positive, and representable in Mach ticks")]
    InvalidWorkPeriod(f64),

    #[error("invalid time-constraint policy: {0}")]
    InvalidPolicy(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation needs Mach or os_workgroup APIs the host lacks
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Classified `os_workgroup_join` failure
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinRejection {
    /// The thread already belongs to a workgroup that cannot nest in this one
    #[error("thread is already in a workgroup that cannot nest in this one (EALREADY)")]
    AlreadyInIncompatibleGroup,

    /// The workgroup was canceled, or the thread was never promoted to real-time
    #[error("workgroup canceled or thread not real-time (EINVAL)")]
    CanceledOrNotRealtime,

    #[error("unexpected error code {0}")]
    Other(i32),
}

impl JoinRejection {
    /// Classify a raw errno returned by `os_workgroup_join`
    pub fn from_code(code: i32) -> Self {
        match Errno::from_raw(code) {
            Errno::EALREADY => JoinRejection::AlreadyInIncompatibleGroup,
            Errno::EINVAL => JoinRejection::CanceledOrNotRealtime,
            _ => JoinRejection::Other(code),
        }
    }

    /// The errno this rejection corresponds to
    pub fn code(&self) -> i32 {
        match self {
            JoinRejection::AlreadyInIncompatibleGroup => Errno::EALREADY as i32,
            JoinRejection::CanceledOrNotRealtime => Errno::EINVAL as i32,
            JoinRejection::Other(code) => *code,
        }
    }
}

/// Mach `kern_return_t` result code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernReturn(pub i32);

impl KernReturn {
    pub const SUCCESS: KernReturn = KernReturn(0);
    pub const INVALID_ARGUMENT: KernReturn = KernReturn(4);
    pub const FAILURE: KernReturn = KernReturn(5);
    pub const RESOURCE_SHORTAGE: KernReturn = KernReturn(6);

    pub fn is_success(&self) -> bool {
        self.0 == 0
    }

    /// Symbolic name from `<mach/kern_return.h>`, if known
    pub fn name(&self) -> Option<&'static str> {
        let name = match self.0 {
            0 => "KERN_SUCCESS",
            1 => "KERN_INVALID_ADDRESS",
            2 => "KERN_PROTECTION_FAILURE",
            3 => "KERN_NO_SPACE",
            4 => "KERN_INVALID_ARGUMENT",
            5 => "KERN_FAILURE",
            6 => "KERN_RESOURCE_SHORTAGE",
            7 => "KERN_NOT_RECEIVER",
            8 => "KERN_NO_ACCESS",
            9 => "KERN_MEMORY_FAILURE",
            10 => "KERN_MEMORY_ERROR",
            14 => "KERN_ABORTED",
            15 => "KERN_INVALID_NAME",
            16 => "KERN_INVALID_TASK",
            18 => "KERN_INVALID_VALUE",
            46 => "KERN_NOT_SUPPORTED",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for KernReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", name, self.0),
            None => write!(f, "kern_return {}", self.0),
        }
    }
}
