//! Human-readable error descriptions and structured JSON error formatting.

use bms_core::error::{BmsError, BuildError};

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingHardware => {
                "What happened: No switch/sensor backend was provided to the engine.\nLikely causes: The plant failed to initialize or was not wired into the builder.\nHow to fix: Ensure the hardware is created successfully and passed via with_hardware(...).".to_string()
            }
            BuildError::MissingCharger => {
                "What happened: No charger was provided to the engine.\nLikely causes: The charger interface failed to initialize or was not wired into the builder.\nHow to fix: Ensure the charger is created successfully and passed via with_charger(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Battery list, timing or persisted offsets do not fit together.\nHow to fix: Edit the config (or delete a stale offsets file), then rerun."
            ),
        };
    }

    if let Some(te) = err.downcast_ref::<toml::de::Error>() {
        return format!(
            "What happened: The config file is not valid TOML for this program ({}).\nLikely causes: A typo, a value of the wrong type, or a missing [[battery]] table.\nHow to fix: Compare with etc/bms.toml and fix the reported line.",
            te.message()
        );
    }

    if let Some(be) = err.downcast_ref::<BmsError>() {
        return match be {
            BmsError::Config(msg) => format!(
                "What happened: Configuration rejected: {msg}.\nLikely causes: A missing or out-of-range value.\nHow to fix: Edit the TOML config and try again."
            ),
            BmsError::Timeout => "What happened: A hardware read timed out.\nLikely causes: The sensor bus is hung or unpowered.\nHow to fix: Check wiring and power; the supervisor restarts a hung engine automatically during `run`.".to_string(),
            BmsError::Hardware(msg) | BmsError::HardwareFault(msg) => format!(
                "What happened: Hardware error: {msg}.\nLikely causes: A sensor or switch did not respond.\nHow to fix: Run `bms self-check`, verify wiring, then retry."
            ),
            BmsError::Io(msg) => format!(
                "What happened: I/O error: {msg}.\nLikely causes: Wrong path or missing permissions.\nHow to fix: Check the file paths in the command line and config."
            ),
            // Fallback to generic for other domain errors
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();
    if lower.contains("offsets csv must have headers") {
        return "Invalid headers in offsets CSV. Expected 'interface,offset'.".to_string();
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 3 configuration, 4 hardware, 5 I/O, 1 anything else.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<BuildError>().is_some() || err.downcast_ref::<toml::de::Error>().is_some() {
        return 3;
    }
    match err.downcast_ref::<BmsError>() {
        Some(BmsError::Config(_)) => 3,
        Some(BmsError::Hardware(_) | BmsError::HardwareFault(_) | BmsError::Timeout) => 4,
        Some(BmsError::Io(_)) => 5,
        _ => 1,
    }
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingHardware => "MissingHardware",
            BuildError::MissingCharger => "MissingCharger",
            BuildError::InvalidConfig(_) => "InvalidConfig",
        };
    }
    if err.downcast_ref::<toml::de::Error>().is_some() {
        return "ConfigSyntax";
    }
    match err.downcast_ref::<BmsError>() {
        Some(BmsError::Config(_)) => "Config",
        Some(BmsError::Hardware(_)) => "Hardware",
        Some(BmsError::HardwareFault(_)) => "HardwareFault",
        Some(BmsError::Timeout) => "Timeout",
        Some(BmsError::Io(_)) => "Io",
        Some(BmsError::State(_)) => "State",
        Some(BmsError::Stopped) => "Stopped",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
        "detail": format!("{err:#}"),
    })
    .to_string()
}
