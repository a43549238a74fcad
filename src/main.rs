use anyhow::{anyhow, Context, Result};
use clap::Parser;
use machrt::cli::{Cli, OutputFormat};
use machrt::config::RealtimeConfig;
use machrt::cycle::{run_joined, CycleContext, CycleControl, CycleLoop, CycleReport, StopSignal, Unbracketed};
use machrt::policy::TimeConstraintPolicy;
use machrt::thread::spawn_realtime;
use machrt::timebase::HostClock;
use machrt::workgroup::Workgroup;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

const SIGNAL_POLL: Duration = Duration::from_millis(10);

extern "C" fn on_sigint(_: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Initialize tracing subscriber; library warnings always reach stderr
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Stop the cycle loop on Ctrl-C instead of killing the process mid-cycle
fn install_sigint_handler() -> Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(on_sigint),
        SaFlags::empty(),
        SigSet::empty(),
    );
    // SAFETY: the handler only stores to an atomic.
    unsafe { sigaction(Signal::SIGINT, &action) }.context("Failed to install SIGINT handler")?;
    Ok(())
}

/// What the worker thread did
#[derive(Debug, Serialize)]
struct RunSummary {
    work_period_secs: f64,
    realtime: bool,
    policy: Option<TimeConstraintPolicy>,
    workgroup: bool,
    report: CycleReport,
}

fn print_summary(summary: &RunSummary, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(summary).context("Failed to serialize report")?;
            println!("{}", json);
        }
        OutputFormat::Text => {
            println!(
                "work period: {:.3} ms (real-time: {})",
                summary.work_period_secs * 1000.0,
                if summary.realtime { "yes" } else { "no" }
            );
            if let Some(policy) = &summary.policy {
                println!(
                    "time constraint: period={} computation={} constraint={} ticks",
                    policy.period, policy.computation, policy.constraint
                );
            }
            println!("workgroup joined: {}", if summary.workgroup { "yes" } else { "no" });
            println!("{}", summary.report);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug);

    let mut config = match &args.config {
        Some(path) => RealtimeConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => RealtimeConfig::default(),
    };
    if let Some(interval) = args.interval {
        config.io_interval_secs = interval;
    }
    config.validate().context("Invalid real-time configuration")?;

    let work_period = args.work_period();
    let source = args.workgroup_source().map_err(|e| anyhow!(e))?;
    let max_cycles = args.cycles;
    let work = Duration::from_millis(args.work_ms);

    install_sigint_handler()?;

    let interval_secs = config.io_interval_secs;
    let stop = StopSignal::new();
    let worker_stop = stop.clone();
    let handle = spawn_realtime("machrt-worker", work_period, config, move |promoted| -> Result<RunSummary> {
        let cycles = CycleLoop::new(HostClock, interval_secs)?.with_max_cycles(max_cycles);
        let stop = worker_stop;
        let body = |_: &CycleContext| {
            // Stand-in for rendering one audio buffer
            std::thread::sleep(work);
            CycleControl::Continue
        };

        let (report, joined) = match (&source, &promoted) {
            (Some(source), Some(promoted)) => {
                let workgroup = Workgroup::resolve(source).context("Failed to resolve workgroup")?;
                let report = run_joined(promoted, &workgroup, &cycles, &stop, body)
                    .context("Failed to join workgroup")?;
                (report, true)
            }
            (Some(_), None) => {
                anyhow::bail!("Cannot join a workgroup: the worker thread is not real-time");
            }
            (None, _) => (cycles.run(&Unbracketed, &stop, body), false),
        };

        Ok(RunSummary {
            work_period_secs: work_period,
            realtime: promoted.is_some(),
            policy: promoted.as_ref().map(|p| *p.policy()),
            workgroup: joined,
            report,
        })
    })
    .context("Failed to spawn worker thread")?;

    // The signal handler can only set a flag; forward it to the cycle loop
    while !handle.is_finished() {
        if INTERRUPTED.load(Ordering::SeqCst) && !stop.is_stopped() {
            tracing::debug!("SIGINT received, stopping cycle loop");
            stop.stop();
        }
        std::thread::sleep(SIGNAL_POLL);
    }

    let summary = handle
        .join()
        .map_err(|_| anyhow!("Worker thread panicked"))??;

    print_summary(&summary, args.format)
}
