use crate::config::MonitorConfig;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    /// Resolve against whether stdout is a terminal
    pub fn enabled(self) -> bool {
        match self {
            ColorMode::Auto => atty::is(atty::Stream::Stdout),
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "hostwatch", about = "Host change-detection agent for folders and registry keys")]
pub struct Args {
    /// JSON configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Seconds between poll cycles
    #[arg(long, global = true)]
    pub interval: Option<u64>,

    /// Log file path
    #[arg(long, global = true)]
    pub log: Option<PathBuf>,

    /// Report file path
    #[arg(long, global = true)]
    pub report: Option<PathBuf>,

    /// Do not show popups or beep on alerts
    #[arg(long, global = true, default_value_t = false)]
    pub no_popups: bool,

    /// Debug-level diagnostics
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Console banner colouring
    #[arg(long, global = true, value_enum, default_value = "auto")]
    pub color: ColorMode,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Monitor until Ctrl+C
    Run,
    /// Baseline, one poll cycle, then exit
    Once,
    /// Show discovered folders and watched registry values
    Targets,
    /// Print the version
    Version,
}

impl Args {
    /// Command to execute; `run` when none is given
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Run)
    }

    /// Apply command-line overrides on top of `config`
    pub fn apply(&self, config: &mut MonitorConfig) {
        if let Some(interval) = self.interval {
            config.interval_secs = interval;
        }
        if let Some(log) = &self.log {
            config.log_path = log.clone();
        }
        if let Some(report) = &self.report {
            config.report_path = report.clone();
        }
        if self.no_popups {
            config.popups = false;
        }
    }
}

pub fn parse_args() -> Args {
    Args::parse()
}
