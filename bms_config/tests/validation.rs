use bms_config::{Chemistry, load_toml};
use rstest::rstest;

const MINIMAL: &str = r#"
[[battery]]
capacity_ah = 100
chemistry = "wet"

[[battery]]
capacity_ah = 200
chemistry = "agm"

[[battery]]
capacity_ah = 100
"#;

#[test]
fn minimal_config_uses_defaults() {
    let cfg = load_toml(MINIMAL).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.batteries.len(), 3);
    assert_eq!(cfg.batteries[1].chemistry, Chemistry::Agm);
    assert_eq!(cfg.batteries[2].chemistry, Chemistry::Wet);
    assert_eq!(cfg.interface_count(), 6);
    assert!(cfg.strategy.separate_load);
    assert!(cfg.strategy.preserve_isolation);
    assert_eq!(cfg.timing.monitor_ms, 1000);
    assert_eq!(cfg.thresholds.steady_current, 30);
    assert!(!cfg.tracking.auto_track);
}

#[test]
fn rejects_empty_battery_list() {
    let cfg = load_toml("battery = []\n").expect("parse TOML");
    let err = cfg.validate().expect_err("no batteries");
    assert!(
        format!("{err}")
            .to_lowercase()
            .contains("at least one [[battery]]")
    );
}

#[rstest]
#[case("capacity_ah = 0", "capacity_ah must be > 0")]
#[case("capacity_ah = 5000", "capacity_ah must be <=")]
fn rejects_bad_capacity(#[case] line: &str, #[case] needle: &str) {
    let toml = format!("[[battery]]\n{line}\n");
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("bad capacity");
    assert!(format!("{err}").contains(needle), "got: {err}");
}

#[rstest]
#[case("low_voltage_v = 11.0\ncritical_voltage_v = 11.5", "critical_voltage_v must be <=")]
#[case("low_soc_pct = 40.0\ncritical_soc_pct = 50.0", "critical_soc_pct must be <=")]
#[case("low_soc_pct = 140.0", "low_soc_pct must be in")]
#[case("weak_voltage_v = 11.3", "weak_voltage_v must be <=")]
#[case("steady_current = 0", "steady_current must be > 0")]
fn rejects_inconsistent_thresholds(#[case] body: &str, #[case] needle: &str) {
    let toml = format!("{MINIMAL}\n[thresholds]\n{body}\n");
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("bad thresholds");
    assert!(format!("{err}").contains(needle), "got: {err}");
}

#[test]
fn rejects_zero_monitor_period() {
    let toml = format!("{MINIMAL}\n[timing]\nmonitor_ms = 0\n");
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("monitor_ms = 0");
    assert!(format!("{err}").contains("monitor_ms must be >= 1"));
}

#[test]
fn rejects_inline_offsets_of_wrong_length() {
    let toml = format!("{MINIMAL}\n[calibration]\noffsets = [1, 2, 3]\n");
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("wrong offsets length");
    assert!(format!("{err}").contains("expected 6"));
}

#[test]
fn rejects_unknown_rotation() {
    let toml = format!("{MINIMAL}\n[logging]\nrotation = \"weekly\"\n");
    let cfg = load_toml(&toml).expect("parse TOML");
    assert!(cfg.validate().is_err());
}

#[test]
fn unknown_chemistry_fails_to_parse() {
    let toml = "[[battery]]\ncapacity_ah = 100\nchemistry = \"lithium\"\n";
    assert!(load_toml(toml).is_err());
}
