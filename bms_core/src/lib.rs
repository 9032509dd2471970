#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core battery management logic (hardware-agnostic).
//!
//! This crate provides the multi-battery allocation and state-of-charge
//! engine. All hardware interactions go through the `bms_traits` capability
//! traits (`SwitchBank`, `Sensors`, `ChargerPhases`, `Reporter`, `OffsetStore`).
//!
//! ## Architecture
//!
//! - **SoC model**: OCV and temperature to state of charge (`soc` module)
//! - **Integration**: Coulomb counting, fill/health derivation, idle resyncs (`integrator`)
//! - **Calibration**: current offset derivation and quiescent current (`calibration`)
//! - **Allocation**: ranked rule tables choosing charge and load targets (`allocation`)
//! - **Tracking**: operational state and isolation timers (`tracker`)
//! - **Engine**: the control cycle tying it together (`engine`)
//! - **Supervision**: engine thread plus watchdog restarts (`supervisor`)
//! - **Status**: shared board, request queue and handle (`shared`)
//!
//! ## Fixed-Point Arithmetic
//!
//! Voltages, temperatures, SoC and charge are integers scaled by 256
//! (`fixed_point::SCALE`); the OCV temperature correction uses ×65536. Human
//! units are converted once, in `conversions`.

// Module declarations
pub mod allocation;
pub mod atomic;
pub mod battery;
pub mod builder;
pub mod calibration;
pub mod config;
pub mod conversions;
pub mod decision;
pub mod engine;
pub mod error;
pub mod fixed_point;
pub mod hw_error;
pub mod integrator;
pub mod mocks;
pub mod offsets;
pub mod ranking;
pub mod report;
pub mod shared;
pub mod snapshot;
pub mod soc;
pub mod status;
pub mod supervisor;
pub mod tracker;
pub mod util;

pub use allocation::AllocationState;
pub use battery::{BatteryRecord, FillState, HealthState, OpState};
pub use builder::{EngineBuilder, Missing, Set};
pub use calibration::{CalibrationReport, CalibrationState};
pub use config::{BatteryCfg, EngineCfg, Strategy, Thresholds, Timing};
pub use decision::DecisionStatus;
pub use engine::{Engine, Hardware};
pub use error::{BmsError, BuildError, Result};
pub use fixed_point::Soc;
pub use offsets::{CsvOffsetStore, CurrentOffsets};
pub use report::TracingReporter;
pub use shared::{EngineHandle, EngineLink, Request};
pub use soc::{Chemistry, compute_soc};
pub use status::CycleStatus;
pub use supervisor::{Supervisor, SupervisorStats};
