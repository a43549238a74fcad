//! C ABI diagnostics without a host-installed subscriber
//!
//! The parent test re-runs this test binary, selecting only
//! `test_ffi_calls_in_fresh_process`, and inspects the child's stderr.

use machrt::ffi::{machrt_set_realtime, machrt_set_realtime_ticks};
use predicates::prelude::*;

const CHILD_ENV: &str = "MACHRT_FFI_CHILD";

/// Runs only inside the re-executed child
#[test]
fn test_ffi_calls_in_fresh_process() {
    if std::env::var_os(CHILD_ENV).is_none() {
        return;
    }
    assert_eq!(machrt_set_realtime(0.0), 0);
    assert_eq!(machrt_set_realtime_ticks(100_000, 100_000, 50_000), 0);
}

#[test]
fn test_ffi_failures_reach_stderr() {
    let exe = std::env::current_exe().unwrap();
    assert_cmd::Command::new(exe)
        .args(["--exact", "test_ffi_calls_in_fresh_process", "--nocapture", "--test-threads", "1"])
        .env(CHILD_ENV, "1")
        .env_remove("RUST_LOG")
        .assert()
        .success()
        .stderr(predicate::str::contains("machrt_set_realtime failed"))
        .stderr(predicate::str::contains("invalid work period"))
        .stderr(predicate::str::contains("work period must be finite and positive"))
        .stderr(predicate::str::contains("invalid time-constraint policy"))
        .stderr(predicate::str::contains("machrt_set_realtime_ticks failed"))
        .stderr(predicate::str::contains("computation 100000 exceeds constraint 50000"));
}
