//! Simulated plant assembly.
//!
//! The plant starts with every battery rested and full. Environment variables
//! move it into other states so runs and tests can exercise specific cases:
//!
//! - `BMS_SIM_VOLTAGES`: comma-separated terminal voltages, volts, battery order
//! - `BMS_SIM_PANEL_V`: panel voltage, volts (default 18.0)
//! - `BMS_SIM_MISSING`: comma-separated one-based numbers of absent batteries
//! - `BMS_SIM_FAIL_READS`: any value makes every sensor read fail

use bms_core::error::{BmsError, Result};
use bms_core::fixed_point::to_fixed;
use bms_hardware::SimulatedPlant;
use bms_traits::BatteryId;

const DEFAULT_PANEL_V: f32 = 18.0;
/// Sensor units drawn by each load.
const LOAD_DEMAND: i16 = 40;
const LOAD_V: f32 = 12.2;

fn config_error(msg: String) -> eyre::Report {
    eyre::Report::new(BmsError::Config(msg))
}

fn parse_list<T: std::str::FromStr>(var: &str, raw: &str) -> Result<Vec<T>>
where
    T::Err: std::fmt::Display,
{
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<T>()
                .map_err(|e| config_error(format!("{var}: invalid entry {s:?}: {e}")))
        })
        .collect()
}

pub fn plant(batteries: usize) -> Result<SimulatedPlant> {
    let plant = SimulatedPlant::new(batteries);
    for load in 0..bms_traits::NUM_LOADS {
        plant.set_load(load, LOAD_DEMAND, to_fixed(LOAD_V));
    }

    if let Ok(raw) = std::env::var("BMS_SIM_VOLTAGES") {
        let volts: Vec<f32> = parse_list("BMS_SIM_VOLTAGES", &raw)?;
        if volts.len() > batteries {
            return Err(config_error(format!(
                "BMS_SIM_VOLTAGES lists {} voltages for {batteries} batteries",
                volts.len()
            )));
        }
        let fixed: Vec<i32> = volts.into_iter().map(to_fixed).collect();
        plant.set_voltages(&fixed);
    }

    let panel_v = match std::env::var("BMS_SIM_PANEL_V") {
        Ok(raw) => raw
            .trim()
            .parse::<f32>()
            .map_err(|e| config_error(format!("BMS_SIM_PANEL_V: {e}")))?,
        Err(_) => DEFAULT_PANEL_V,
    };
    plant.set_panel(0, to_fixed(panel_v));

    if let Ok(raw) = std::env::var("BMS_SIM_MISSING") {
        for n in parse_list::<usize>("BMS_SIM_MISSING", &raw)? {
            if n == 0 || n > batteries {
                return Err(config_error(format!("BMS_SIM_MISSING: no battery {n}")));
            }
            plant.set_present(BatteryId::new((n - 1) as u8), false);
        }
    }

    if std::env::var_os("BMS_SIM_FAIL_READS").is_some() {
        plant.set_fail_reads(true);
    }

    tracing::debug!(batteries, panel_v, "simulated plant ready");
    Ok(plant)
}
