use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::tempdir;

// Fast timing so supervised runs finish in milliseconds
fn write_config(dir: &Path, extra: &str) -> PathBuf {
    let toml = format!(
        r#"
[[battery]]
capacity_ah = 100

[[battery]]
capacity_ah = 100

[[battery]]
capacity_ah = 100

[timing]
monitor_ms = 10
watchdog_ms = 5
calibration_delay_ms = 1
startup_delay_ms = 0
{extra}
"#
    );
    let path = dir.join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn bms(cfg: &Path) -> Command {
    let mut cmd = Command::cargo_bin("bms").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd.arg("--config").arg(cfg);
    cmd
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["run", "--cycles", "3"], 0, "cycles:", "stdout")]
#[case(&["self-check"], 0, "OK", "stdout")]
#[case(&["soc", "--voltage", "12.5"], 0, "SoC:", "stdout")]
#[case(&["soc"], 2, "required", "stderr")]
#[case(&["soc", "--voltage", "75"], 3, "What happened", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_config(dir.path(), "");
    let mut cmd = bms(&cfg);
    for a in args {
        cmd.arg(a);
    }
    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[rstest]
fn run_reports_allocation_as_json() {
    let dir = tempdir().unwrap();
    let cfg = write_config(dir.path(), "[tracking]\nauto_track = true\n");
    let out = bms(&cfg)
        .env("BMS_SIM_VOLTAGES", "12.66,12.5,12.2")
        .args(["--json", "--log-level", "error", "run", "--cycles", "3"])
        .output()
        .unwrap();
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let stdout = String::from_utf8(out.stdout).unwrap();
    let line = stdout.lines().last().expect("status line");
    let v: serde_json::Value = serde_json::from_str(line).unwrap();
    assert!(v["cycles"].as_u64().unwrap() >= 3);
    assert_eq!(v["batteries"].as_array().unwrap().len(), 3);
    // Lowest battery takes the charger, fullest the load
    assert_eq!(v["under_charge"], 3);
    assert_eq!(v["under_load"], 1);
    assert_eq!(v["charger_off"], false);
}

#[rstest]
fn calibrate_writes_offsets_file() {
    let dir = tempdir().unwrap();
    let offsets = dir.path().join("offsets.csv");
    let extra = format!(
        "[calibration]\noffsets_file = {:?}\n",
        offsets.to_string_lossy()
    );
    let cfg = write_config(dir.path(), &extra);

    bms(&cfg)
        .arg("calibrate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Calibration complete"));

    let csv = fs::read_to_string(&offsets).unwrap();
    assert!(csv.starts_with("interface,offset"));
    // 3 batteries + 2 loads + 1 panel, plus the header
    assert_eq!(csv.lines().count(), 7);

    // The next run picks the file up
    bms(&cfg)
        .args(["run", "--cycles", "1"])
        .assert()
        .success();
}

#[rstest]
fn missing_battery_is_reported_by_calibration() {
    let dir = tempdir().unwrap();
    let cfg = write_config(dir.path(), "");
    let out = bms(&cfg)
        .env("BMS_SIM_MISSING", "2")
        .args(["--json", "--log-level", "error", "calibrate"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let v: serde_json::Value =
        serde_json::from_str(String::from_utf8(out.stdout).unwrap().trim()).unwrap();
    assert_eq!(v["missing"], serde_json::json!([2]));
}

#[rstest]
fn hardware_failure_exits_with_hardware_code() {
    let dir = tempdir().unwrap();
    let cfg = write_config(dir.path(), "");
    bms(&cfg)
        .env("BMS_SIM_FAIL_READS", "1")
        .arg("self-check")
        .assert()
        .code(4)
        .stderr(predicate::str::contains("Hardware error"));
}

#[rstest]
#[case::no_batteries("[timing]\nmonitor_ms = 10\n")]
#[case::bad_threshold_order(
    "[[battery]]\ncapacity_ah = 100\n[thresholds]\ncritical_soc_pct = 70.0\nlow_soc_pct = 60.0\n"
)]
#[case::not_toml("[[battery]\ncapacity_ah = ")]
fn invalid_config_exits_with_config_code(#[case] toml: &str) {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("bad.toml");
    fs::write(&cfg, toml).unwrap();
    bms(&cfg)
        .arg("self-check")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("What happened"));
}

#[rstest]
fn json_errors_are_structured() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("missing.toml");
    let out = bms(&cfg).args(["--json", "self-check"]).output().unwrap();
    assert_eq!(out.status.code(), Some(5));
    let stderr = String::from_utf8(out.stderr).unwrap();
    let line = stderr.lines().last().expect("error line");
    let v: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(v["reason"], "Io");
    assert_eq!(v["exit_code"], 5);
}

#[rstest]
fn soc_json_rises_with_voltage() {
    let soc_at = |volts: &str| -> f64 {
        let out = Command::cargo_bin("bms")
            .unwrap()
            .args(["--json", "soc", "--voltage", volts, "--temperature", "25"])
            .output()
            .unwrap();
        assert!(out.status.success());
        let v: serde_json::Value =
            serde_json::from_str(String::from_utf8(out.stdout).unwrap().trim()).unwrap();
        v["soc_pct"].as_f64().unwrap()
    };
    let low = soc_at("12.0");
    let high = soc_at("12.6");
    assert!(low < high);
    assert!((0.0..=100.0).contains(&low) && (0.0..=100.0).contains(&high));
}
