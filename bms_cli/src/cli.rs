//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "bms", version, about = "Solar multi-battery manager")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/bms.toml")]
    pub config: PathBuf,

    /// Log as JSON lines and print results as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); falls back to [logging].level
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Battery chemistry as accepted on the command line.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ChemistryArg {
    Wet,
    Gel,
    Agm,
}

impl From<ChemistryArg> for bms_core::Chemistry {
    fn from(c: ChemistryArg) -> Self {
        match c {
            ChemistryArg::Wet => Self::Wet,
            ChemistryArg::Gel => Self::Gel,
            ChemistryArg::Agm => Self::Agm,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the supervised control loop against the simulated plant
    Run {
        /// Stop after this many control cycles (runs until Ctrl-C otherwise)
        #[arg(long, value_name = "N")]
        cycles: Option<u64>,
        /// Calibrate current offsets before the first control cycle
        #[arg(long, action = ArgAction::SetTrue)]
        calibrate: bool,
        /// Drive the switches from the allocation (overrides [tracking].auto_track)
        #[arg(long, action = ArgAction::SetTrue)]
        auto_track: bool,
    },
    /// Run one calibration, persist and print the derived offsets
    Calibrate,
    /// Evaluate the SoC model for a rested battery
    Soc {
        /// Terminal voltage (volts)
        #[arg(long, value_name = "VOLTS")]
        voltage: f32,
        /// Ambient temperature (°C)
        #[arg(long, value_name = "CELSIUS", default_value_t = 25.0)]
        temperature: f32,
        #[arg(long, value_enum, default_value = "wet")]
        chemistry: ChemistryArg,
    },
    /// Validate config and check that the hardware answers
    SelfCheck,
}

impl Commands {
    /// Whether the command reads the config file.
    pub const fn needs_config(&self) -> bool {
        !matches!(self, Self::Soc { .. })
    }
}
