//! C ABI for Swift and C callers
//!
//! Both functions promote the calling thread and return `1` on success, `0` on
//! any failure. A C host has no tracing subscriber of its own, so the first call
//! installs one that writes warnings to stderr (honouring `RUST_LOG`). If the
//! host already set a global subscriber, that one is kept.
//!
//! `set_realtime` is exported under its bare name as well, so an existing
//! bridging header declaring `extern int set_realtime(double work_period);`
//! links unchanged.

use libc::c_int;
use std::sync::Once;
use tracing_subscriber::EnvFilter;

use crate::realtime::{set_realtime, set_realtime_ticks};

static INIT_LOGGING: Once = Once::new();

/// Route diagnostics to stderr unless the host installed a subscriber
fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        // An existing global subscriber wins
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .try_init();
    });
}

/// Promote the calling thread for a work period in seconds
#[no_mangle]
pub extern "C" fn machrt_set_realtime(work_period: f64) -> c_int {
    init_logging();
    match set_realtime(work_period) {
        Ok(_) => 1,
        Err(e) => {
            tracing::warn!(error = %e, work_period, "machrt_set_realtime failed");
            0
        }
    }
}

/// Same as [`machrt_set_realtime`], under the unprefixed C name
#[export_name = "set_realtime"]
pub extern "C" fn set_realtime_unprefixed(work_period: f64) -> c_int {
    machrt_set_realtime(work_period)
}

/// Apply raw time-constraint ticks to the calling thread
#[no_mangle]
pub extern "C" fn machrt_set_realtime_ticks(period: u32, computation: u32, constraint: u32) -> c_int {
    init_logging();
    match set_realtime_ticks(period, computation, constraint) {
        Ok(_) => 1,
        Err(e) => {
            tracing::warn!(error = %e, period, computation, constraint, "machrt_set_realtime_ticks failed");
            0
        }
    }
}
