#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and current-offset persistence for the battery manager.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Current offsets derived by calibration are stored as a two-column CSV
//!   (`interface,offset`) so they survive restarts and can be inspected by hand.
use serde::Deserialize;
use serde::de::Deserializer;

/// Largest installation the switch matrix can address.
pub const MAX_BATTERIES: usize = 8;

/// Largest capacity whose charge in coulombs ×256 still fits an `i32`.
pub const MAX_CAPACITY_AH: u32 = 2330;

/// Offsets CSV schema.
///
/// Expected headers:
/// interface,offset
///
/// Example:
/// interface,offset
/// 0,12
/// 1,-3
#[derive(Debug, Deserialize, serde::Serialize, Clone, Copy, PartialEq, Eq)]
pub struct OffsetRow {
    pub interface: usize,
    pub offset: i16,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Chemistry {
    #[default]
    Wet,
    Gel,
    Agm,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BatteryCfg {
    /// Rated capacity in ampere-hours.
    pub capacity_ah: u32,
    #[serde(default)]
    pub chemistry: Chemistry,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Terminal voltage below which a battery is "low" (volts).
    pub low_voltage_v: f32,
    /// Terminal voltage below which a battery is "critical" (volts).
    pub critical_voltage_v: f32,
    /// Absolute dropout voltage that marks a battery weak (volts).
    pub weak_voltage_v: f32,
    pub low_soc_pct: f32,
    pub critical_soc_pct: f32,
    /// A battery in float phase drops back to bulk below this SoC.
    pub float_bulk_soc_pct: f32,
    /// Panel must exceed a battery voltage by this much for charging (volts).
    pub panel_margin_v: f32,
    /// Charger switch is withheld above this ambient temperature (°C).
    pub temperature_limit_c: f32,
    /// Battery current magnitude below which the battery counts as idle (sensor units).
    pub steady_current: i16,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            low_voltage_v: 11.5,
            critical_voltage_v: 11.2,
            weak_voltage_v: 10.5,
            low_soc_pct: 60.0,
            critical_soc_pct: 45.0,
            float_bulk_soc_pct: 95.0,
            panel_margin_v: 0.5,
            temperature_limit_c: 40.0,
            steady_current: 30,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StrategyCfg {
    /// Keep the loads off the battery under charge.
    pub separate_load: bool,
    /// Keep the longest-isolated battery out of service for OCV readings.
    pub preserve_isolation: bool,
    /// Raw strategy byte; when present it takes precedence over the booleans.
    #[serde(default, deserialize_with = "de_strategy_bits")]
    pub bits: Option<u8>,
}

impl Default for StrategyCfg {
    fn default() -> Self {
        Self {
            separate_load: true,
            preserve_isolation: true,
            bits: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// Control cycle period.
    pub monitor_ms: u64,
    /// Watchdog check period.
    pub watchdog_ms: u64,
    /// Settling time per calibration switch configuration.
    pub calibration_delay_ms: u64,
    /// Delay before the first control cycle so measurements can settle.
    pub startup_delay_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            monitor_ms: 1000,
            watchdog_ms: 500,
            calibration_delay_ms: 1000,
            startup_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Tracking {
    /// Drive the switches from the allocation result.
    pub auto_track: bool,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct CalibrationCfg {
    /// CSV file holding the persisted current offsets.
    pub offsets_file: Option<String>,
    /// Inline offsets; used when no offsets file exists yet.
    pub offsets: Option<Vec<i16>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(rename = "battery")]
    pub batteries: Vec<BatteryCfg>,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub strategy: StrategyCfg,
    #[serde(default)]
    pub timing: Timing,
    #[serde(default)]
    pub tracking: Tracking,
    #[serde(default)]
    pub calibration: CalibrationCfg,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Accepts either an integer (`bits = 3`) or a binary/hex string (`bits = "0b11"`).
fn de_strategy_bits<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BitsToml {
        Int(u8),
        Text(String),
    }

    let opt: Option<BitsToml> = Option::deserialize(deserializer)?;
    match opt {
        None => Ok(None),
        Some(BitsToml::Int(v)) => Ok(Some(v)),
        Some(BitsToml::Text(s)) => {
            let t = s.trim();
            let parsed = if let Some(b) = t.strip_prefix("0b") {
                u8::from_str_radix(b, 2)
            } else if let Some(h) = t.strip_prefix("0x") {
                u8::from_str_radix(h, 16)
            } else {
                t.parse::<u8>()
            };
            parsed
                .map(Some)
                .map_err(|e| serde::de::Error::custom(format!("invalid strategy bits {s:?}: {e}")))
        }
    }
}

impl Config {
    /// Number of current interfaces: batteries, two loads, one panel.
    pub fn interface_count(&self) -> usize {
        self.batteries.len() + 3
    }

    pub fn validate(&self) -> eyre::Result<()> {
        // Batteries
        if self.batteries.is_empty() {
            eyre::bail!("at least one [[battery]] must be configured");
        }
        if self.batteries.len() > MAX_BATTERIES {
            eyre::bail!(
                "too many batteries: {} (max {MAX_BATTERIES})",
                self.batteries.len()
            );
        }
        for (i, b) in self.batteries.iter().enumerate() {
            if b.capacity_ah == 0 {
                eyre::bail!("battery[{i}].capacity_ah must be > 0");
            }
            if b.capacity_ah > MAX_CAPACITY_AH {
                eyre::bail!("battery[{i}].capacity_ah must be <= {MAX_CAPACITY_AH}");
            }
        }

        // Thresholds
        let t = &self.thresholds;
        for (name, v) in [
            ("low_voltage_v", t.low_voltage_v),
            ("critical_voltage_v", t.critical_voltage_v),
            ("weak_voltage_v", t.weak_voltage_v),
        ] {
            if !(0.0..=60.0).contains(&v) {
                eyre::bail!("thresholds.{name} must be in [0.0, 60.0]");
            }
        }
        if t.critical_voltage_v > t.low_voltage_v {
            eyre::bail!("thresholds.critical_voltage_v must be <= low_voltage_v");
        }
        if t.weak_voltage_v > t.critical_voltage_v {
            eyre::bail!("thresholds.weak_voltage_v must be <= critical_voltage_v");
        }
        for (name, v) in [
            ("low_soc_pct", t.low_soc_pct),
            ("critical_soc_pct", t.critical_soc_pct),
            ("float_bulk_soc_pct", t.float_bulk_soc_pct),
        ] {
            if !(0.0..=100.0).contains(&v) {
                eyre::bail!("thresholds.{name} must be in [0.0, 100.0]");
            }
        }
        if t.critical_soc_pct > t.low_soc_pct {
            eyre::bail!("thresholds.critical_soc_pct must be <= low_soc_pct");
        }
        if !(0.0..=5.0).contains(&t.panel_margin_v) {
            eyre::bail!("thresholds.panel_margin_v must be in [0.0, 5.0]");
        }
        if !(-40.0..=100.0).contains(&t.temperature_limit_c) {
            eyre::bail!("thresholds.temperature_limit_c must be in [-40.0, 100.0]");
        }
        if t.steady_current <= 0 {
            eyre::bail!("thresholds.steady_current must be > 0");
        }

        // Timing
        if self.timing.monitor_ms == 0 {
            eyre::bail!("timing.monitor_ms must be >= 1");
        }
        if self.timing.monitor_ms > 60 * 60 * 1000 {
            eyre::bail!("timing.monitor_ms is unreasonably large (>1h)");
        }
        if self.timing.watchdog_ms == 0 {
            eyre::bail!("timing.watchdog_ms must be >= 1");
        }
        if self.timing.calibration_delay_ms > 60 * 1000 {
            eyre::bail!("timing.calibration_delay_ms is unreasonably large (>60s)");
        }

        // Persisted offsets
        if let Some(offsets) = &self.calibration.offsets {
            if offsets.len() != self.interface_count() {
                eyre::bail!(
                    "calibration.offsets has {} entries, expected {}",
                    offsets.len(),
                    self.interface_count()
                );
            }
        }

        // Logging
        if let Some(r) = self.logging.rotation.as_deref() {
            if !matches!(r, "never" | "daily" | "hourly") {
                eyre::bail!("logging.rotation must be one of never|daily|hourly, got {r:?}");
            }
        }

        Ok(())
    }
}

/// Load persisted offsets. Rows may come in any order but must cover
/// interfaces `0..n` exactly once.
pub fn load_offsets_csv(path: &std::path::Path) -> eyre::Result<Vec<i16>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open offsets CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["interface", "offset"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "offsets CSV must have headers 'interface,offset', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<OffsetRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }
    offsets_from_rows(&rows)
}

/// Arrange rows into an offsets vector indexed by interface.
pub fn offsets_from_rows(rows: &[OffsetRow]) -> eyre::Result<Vec<i16>> {
    let mut out: Vec<Option<i16>> = vec![None; rows.len()];
    for row in rows {
        let Some(slot) = out.get_mut(row.interface) else {
            eyre::bail!(
                "offset row for interface {} out of range (0..{})",
                row.interface,
                rows.len()
            );
        };
        if slot.is_some() {
            eyre::bail!("duplicate offset row for interface {}", row.interface);
        }
        *slot = Some(row.offset);
    }
    Ok(out.into_iter().map(|o| o.unwrap_or(0)).collect())
}

/// Serialize offsets to CSV bytes with the `interface,offset` header.
pub fn offsets_to_csv(offsets: &[i16]) -> eyre::Result<Vec<u8>> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(true)
        .from_writer(Vec::new());
    for (interface, &offset) in offsets.iter().enumerate() {
        wtr.serialize(OffsetRow { interface, offset })
            .map_err(|e| eyre::eyre!("serialize offset row {interface}: {e}"))?;
    }
    wtr.into_inner()
        .map_err(|e| eyre::eyre!("flush offsets CSV: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_bits_accepts_text_forms() {
        let cfg = load_toml(
            r#"
[[battery]]
capacity_ah = 100

[strategy]
bits = "0b10"
"#,
        )
        .expect("parse");
        assert_eq!(cfg.strategy.bits, Some(2));
    }

    #[test]
    fn offsets_from_rows_reorders_by_interface() {
        let rows = [
            OffsetRow {
                interface: 1,
                offset: -4,
            },
            OffsetRow {
                interface: 0,
                offset: 7,
            },
        ];
        assert_eq!(offsets_from_rows(&rows).unwrap(), vec![7, -4]);
    }

    #[test]
    fn offsets_from_rows_rejects_duplicates() {
        let rows = [
            OffsetRow {
                interface: 0,
                offset: 1,
            },
            OffsetRow {
                interface: 0,
                offset: 2,
            },
        ];
        let err = offsets_from_rows(&rows).expect_err("duplicate");
        assert!(err.to_string().contains("duplicate"));
    }
}
