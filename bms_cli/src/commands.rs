//! Command implementations: config loading, engine assembly, supervised runs,
//! calibration and the SoC calculator.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bms_config::Config;
use bms_core::error::{BmsError, Result};
use bms_core::fixed_point::to_fixed;
use bms_core::{
    CalibrationReport, CsvOffsetStore, Engine, EngineCfg, EngineHandle, EngineLink, Supervisor,
    SupervisorStats, compute_soc,
};
use bms_hardware::SimulatedPlant;
use bms_traits::BatteryId;
use eyre::WrapErr;
use serde_json::json;

use crate::cli::ChemistryArg;
use crate::sim;

pub fn load_config(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        eyre::Report::new(BmsError::Io(format!("read config {}: {e}", path.display())))
    })?;
    let cfg = bms_config::load_toml(&text)
        .map_err(eyre::Report::new)
        .wrap_err_with(|| format!("parse config {}", path.display()))?;
    cfg.validate()
        .map_err(|e| eyre::Report::new(BmsError::Config(e.to_string())))?;
    Ok(cfg)
}

/// Offsets from the offsets file when it exists, else the inline list.
fn persisted_offsets(cfg: &Config) -> Result<Option<Vec<i16>>> {
    if let Some(path) = &cfg.calibration.offsets_file {
        if let Some(offsets) = CsvOffsetStore::new(path).load()? {
            return Ok(Some(offsets));
        }
    }
    Ok(cfg.calibration.offsets.clone())
}

fn build_engine(
    cfg: &Config,
    engine_cfg: EngineCfg,
    plant: &SimulatedPlant,
    link: Option<EngineLink>,
) -> Result<Engine> {
    let mut builder = Engine::builder()
        .with_hardware(plant.clone())
        .with_charger(plant.clone())
        .with_config(engine_cfg);
    if let Some(offsets) = persisted_offsets(cfg)? {
        builder = builder.with_offsets(offsets);
    }
    if let Some(path) = &cfg.calibration.offsets_file {
        builder = builder.with_offset_store(CsvOffsetStore::new(path));
    }
    if let Some(link) = link {
        builder = builder.with_link(link);
    }
    builder.build()
}

pub fn run(cfg: Config, cycles: Option<u64>, calibrate: bool, auto_track: bool, json: bool) -> Result<()> {
    let mut engine_cfg = EngineCfg::from(&cfg);
    engine_cfg.auto_track |= auto_track;
    let batteries = cfg.batteries.len();
    let plant = sim::plant(batteries)?;

    // Fail fast on anything the factory would trip over on every restart.
    build_engine(&cfg, engine_cfg.clone(), &plant, None)?;

    let link = EngineLink::new(batteries);
    let handle = link.handle();
    if calibrate {
        handle.request_calibration()?;
    }

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed)).map_err(|e| {
            eyre::Report::new(BmsError::Io(format!("install Ctrl-C handler: {e}")))
        })?;
    }

    let timing = engine_cfg.timing.clone();
    let cfg = Arc::new(cfg);
    let supervisor = Supervisor::new(link, &timing, move |link| {
        build_engine(&cfg, engine_cfg.clone(), &plant, Some(link))
    });
    tracing::info!(batteries, ?cycles, calibrate, "run start");
    let stats = supervisor.run_until(&stop, cycles)?;
    print_status(&handle, stats, json);
    Ok(())
}

fn target(id: Option<BatteryId>) -> String {
    id.map_or_else(|| "none".to_owned(), |b| b.to_string())
}

fn print_status(h: &EngineHandle, stats: SupervisorStats, json: bool) {
    let batteries: Vec<BatteryId> = (0..h.battery_count())
        .map(|i| BatteryId::new(i as u8))
        .collect();
    if json {
        let rows: Vec<_> = batteries
            .iter()
            .map(|&b| {
                json!({
                    "battery": b.index() + 1,
                    "soc_pct": h.battery_soc(b).map(|s| s.percent()),
                    "fill": h.battery_fill(b).map(|f| format!("{f:?}")),
                    "health": h.battery_health(b).map(|s| format!("{s:?}")),
                    "op": h.battery_op_state(b).map(|s| format!("{s:?}")),
                })
            })
            .collect();
        let obj = json!({
            "cycles": stats.cycles,
            "restarts": stats.restarts,
            "decision": h.decision_status().bits(),
            "charger_off": h.charger_off(),
            "under_charge": h.battery_under_charge().map(|b| b.index() + 1),
            "under_load": h.battery_under_load().map(|b| b.index() + 1),
            "batteries": rows,
        });
        println!("{obj}");
        return;
    }

    println!("cycles: {}  restarts: {}", stats.cycles, stats.restarts);
    println!(
        "decision: {}  charge: {}  load: {}{}",
        h.decision_status(),
        target(h.battery_under_charge()),
        target(h.battery_under_load()),
        if h.charger_off() { "  (charger off)" } else { "" }
    );
    for b in batteries {
        println!(
            "{b}: soc {}  fill {:?}  health {:?}  op {:?}",
            h.battery_soc(b).map_or_else(|| "-".to_owned(), |s| s.to_string()),
            h.battery_fill(b).unwrap_or_default(),
            h.battery_health(b).unwrap_or_default(),
            h.battery_op_state(b).unwrap_or_default(),
        );
    }
}

pub fn calibrate(cfg: &Config, json: bool) -> Result<()> {
    let plant = sim::plant(cfg.batteries.len())?;
    let mut engine = build_engine(cfg, EngineCfg::from(cfg), &plant, None)?;
    engine.initialize()?;
    let report = engine.calibrate()?;
    print_calibration(&report, cfg.calibration.offsets_file.as_deref(), json);
    Ok(())
}

fn print_calibration(report: &CalibrationReport, saved_to: Option<&str>, json: bool) {
    if json {
        let obj = json!({
            "offsets": report.offsets,
            "quiescent": report.quiescent,
            "missing": report.missing.iter().map(|b| b.index() + 1).collect::<Vec<_>>(),
            "saved_to": saved_to,
        });
        println!("{obj}");
        return;
    }
    println!("Calibration complete.");
    println!("offsets: {:?}", report.offsets);
    match report.quiescent {
        Some(q) => println!("quiescent current: {q}"),
        None => println!("quiescent current: no valid sample"),
    }
    for b in &report.missing {
        println!("{b}: missing");
    }
    if let Some(path) = saved_to {
        println!("saved to {path}");
    }
}

pub fn soc(voltage: f32, temperature: f32, chemistry: ChemistryArg, json: bool) -> Result<()> {
    if !voltage.is_finite() || !(0.0..=60.0).contains(&voltage) {
        return Err(eyre::Report::new(BmsError::Config(format!(
            "voltage {voltage} V outside [0, 60]"
        ))));
    }
    if !temperature.is_finite() || !(-40.0..=100.0).contains(&temperature) {
        return Err(eyre::Report::new(BmsError::Config(format!(
            "temperature {temperature} °C outside [-40, 100]"
        ))));
    }
    let soc = compute_soc(to_fixed(voltage), to_fixed(temperature), chemistry.into());
    if json {
        let obj = json!({
            "voltage_v": voltage,
            "temperature_c": temperature,
            "chemistry": format!("{chemistry:?}").to_lowercase(),
            "soc_pct": soc.percent(),
            "soc_raw": soc.raw(),
        });
        println!("{obj}");
    } else {
        println!("SoC: {soc}");
    }
    Ok(())
}

/// Build an engine and run one cycle against the plant.
pub fn self_check(cfg: &Config, json: bool) -> Result<()> {
    let plant = sim::plant(cfg.batteries.len())?;
    let mut engine = build_engine(cfg, EngineCfg::from(cfg), &plant, None)?;
    engine.initialize().wrap_err("self-check: initial readings")?;
    engine.step().wrap_err("self-check: control cycle")?;
    let batteries = engine.records().len();
    if json {
        println!("{}", json!({ "ok": true, "batteries": batteries }));
    } else {
        println!("OK: config valid, {batteries} batteries answering");
    }
    Ok(())
}
