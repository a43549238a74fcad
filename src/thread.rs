//! Spawning threads that promote themselves before running
//!
//! Promotion only affects the calling thread, so it has to run first thing on
//! the new thread. A refused promotion is logged and the body still runs, with
//! `None` in place of the [`Promoted`] proof.

use std::io;
use std::thread::{self, JoinHandle};

use crate::config::RealtimeConfig;
use crate::realtime::{set_realtime_configured, Promoted};

/// Spawn a named thread promoted for `work_period_secs`
///
/// # Example
/// ```
/// use machrt::config::RealtimeConfig;
/// use machrt::thread::spawn_realtime;
///
/// let handle = spawn_realtime("audio-io", 128.0 / 48_000.0, RealtimeConfig::default(), |promoted| {
///     // promoted is None where the kernel refused, or off macOS
///     promoted.map(|p| p.policy().period)
/// })
/// .unwrap();
/// let _period = handle.join().unwrap();
/// ```
pub fn spawn_realtime<F, T>(
    name: impl Into<String>,
    work_period_secs: f64,
    config: RealtimeConfig,
    body: F,
) -> io::Result<JoinHandle<T>>
where
    F: FnOnce(Option<Promoted>) -> T + Send + 'static,
    T: Send + 'static,
{
    thread::Builder::new().name(name.into()).spawn(move || {
        let promoted = match set_realtime_configured(work_period_secs, &config) {
            Ok(promoted) => {
                tracing::debug!(policy = ?promoted.policy(), "thread promoted to real-time");
                Some(promoted)
            }
            Err(e) => {
                tracing::warn!(error = %e, "continuing without real-time scheduling");
                None
            }
        };
        body(promoted)
    })
}
