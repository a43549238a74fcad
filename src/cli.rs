//! CLI argument parsing for machrt

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::policy::work_period_for;
use crate::workgroup::WorkgroupSource;

/// Output format for the cycle report
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "machrt")]
#[command(version)]
#[command(
    about = "Promote a worker thread to real-time audio scheduling and run workgroup cycles",
    long_about = None
)]
pub struct Cli {
    /// Work period in seconds (overrides --frames/--sample-rate)
    #[arg(long, value_name = "SECS")]
    pub period: Option<f64>,

    /// Audio buffer size in frames
    #[arg(long, value_name = "N", default_value = "128")]
    pub frames: u32,

    /// Sample rate in Hz
    #[arg(long = "sample-rate", value_name = "HZ", default_value = "44100")]
    pub sample_rate: f64,

    /// I/O interval time per cycle in seconds (overrides the config file)
    #[arg(long, value_name = "SECS")]
    pub interval: Option<f64>,

    /// Join the I/O workgroup of an audio device (numeric ID or "default")
    #[arg(long, value_name = "ID", conflicts_with = "named_interval")]
    pub device: Option<String>,

    /// Join a work interval created under this name
    #[arg(long = "named-interval", value_name = "NAME")]
    pub named_interval: Option<String>,

    /// Number of cycles to run (0 runs until interrupted)
    #[arg(long, value_name = "N", default_value = "100")]
    pub cycles: u64,

    /// Simulated work per cycle in milliseconds
    #[arg(long = "work-ms", value_name = "MS", default_value = "10")]
    pub work_ms: u64,

    /// TOML file with real-time tuning values
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Enable trace-level logging
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Work period in seconds from --period, or from the buffer size
    pub fn work_period(&self) -> f64 {
        self.period
            .unwrap_or_else(|| work_period_for(self.frames, self.sample_rate))
    }

    /// Which workgroup to join, if any
    pub fn workgroup_source(&self) -> Result<Option<WorkgroupSource>, String> {
        if let Some(name) = &self.named_interval {
            return Ok(Some(WorkgroupSource::NamedInterval(name.clone())));
        }
        match self.device.as_deref() {
            None => Ok(None),
            Some("default") => Ok(Some(WorkgroupSource::DefaultOutputDevice)),
            Some(id) => id
                .parse()
                .map(|id| Some(WorkgroupSource::Device(id)))
                .map_err(|_| format!("Invalid --device value: {} (expected a number or \"default\")", id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["machrt"]);
        assert_eq!(cli.frames, 128);
        assert_eq!(cli.sample_rate, 44100.0);
        assert_eq!(cli.cycles, 100);
        assert_eq!(cli.work_ms, 10);
        assert!(cli.interval.is_none());
        assert!(!cli.debug);
    }

    #[test]
    fn test_cli_work_period_from_buffer() {
        let cli = Cli::parse_from(["machrt", "--frames", "256", "--sample-rate", "48000"]);
        assert!((cli.work_period() - 256.0 / 48000.0).abs() < 1e-12);
    }

    #[test]
    fn test_cli_period_overrides_buffer() {
        let cli = Cli::parse_from(["machrt", "--period", "0.005", "--frames", "64"]);
        assert_eq!(cli.work_period(), 0.005);
    }

    #[test]
    fn test_cli_device_default() {
        let cli = Cli::parse_from(["machrt", "--device", "default"]);
        assert_eq!(
            cli.workgroup_source().unwrap(),
            Some(WorkgroupSource::DefaultOutputDevice)
        );
    }

    #[test]
    fn test_cli_device_numeric() {
        let cli = Cli::parse_from(["machrt", "--device", "73"]);
        assert_eq!(cli.workgroup_source().unwrap(), Some(WorkgroupSource::Device(73)));
    }

    #[test]
    fn test_cli_device_invalid() {
        let cli = Cli::parse_from(["machrt", "--device", "speakers"]);
        assert!(cli.workgroup_source().unwrap_err().contains("speakers"));
    }

    #[test]
    fn test_cli_named_interval() {
        let cli = Cli::parse_from(["machrt", "--named-interval", "My Work Interval"]);
        assert_eq!(
            cli.workgroup_source().unwrap(),
            Some(WorkgroupSource::NamedInterval("My Work Interval".to_string()))
        );
    }

    #[test]
    fn test_cli_device_conflicts_with_named_interval() {
        let result = Cli::try_parse_from(["machrt", "--device", "1", "--named-interval", "x"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_no_workgroup_by_default() {
        let cli = Cli::parse_from(["machrt"]);
        assert_eq!(cli.workgroup_source().unwrap(), None);
    }
}
