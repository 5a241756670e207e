//! Human-readable error descriptions and structured JSON error formatting.

use stock_core::error::{BuildError, StartupError, StockError};

/// Exit code for a calibration that could not tare or verify.
pub const EXIT_CALIBRATION: i32 = 3;
/// Exit code for a scale that could not be opened; the supervisor restarts us.
pub const EXIT_HARDWARE_INIT: i32 = 4;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(se) = err.downcast_ref::<StartupError>() {
        return match se {
            StartupError::CalibrationFailure { mean_g, tolerance_g } => format!(
                "What happened: Calibration failed (residual {mean_g:.1} g, tolerance {tolerance_g:.1} g).\nLikely causes: Something was on the platform during tare, the scale factor is wrong, or the reading is drifting.\nHow to fix: Clear the platform, check calibration.scale_factor in the config, then restart."
            ),
            StartupError::NoTareSamples => {
                "What happened: Calibration failed: no tare sample could be read.\nLikely causes: HX711 not wired correctly, no power/ground, or timeout too low.\nHow to fix: Verify DT/SCK pins and power, and consider increasing hardware.sensor_read_timeout_ms in the config.".to_string()
            }
            StartupError::HardwareInit(msg) => format!(
                "What happened: Failed to initialize the scale ({msg}).\nLikely causes: Incorrect pin numbers or insufficient GPIO permissions.\nHow to fix: Fix the [pins] values in the config; ensure the process has permission to access GPIO."
            ),
        };
    }

    if let Some(be) = err.downcast_ref::<BuildError>() {
        return format!(
            "What happened: Invalid configuration ({be}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
        );
    }

    if let Some(se) = err.downcast_ref::<StockError>() {
        if matches!(se, StockError::AcquisitionTimeout) {
            return "What happened: Scale read timed out.\nLikely causes: HX711 not wired correctly, no power/ground, or timeout too low.\nHow to fix: Verify DT/SCK pins and power, and consider increasing hardware.sensor_read_timeout_ms in the config.".to_string();
        }
        return format!(
            "What happened: {se}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
        );
    }

    // Config loading wraps its cause
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();
    if lower.starts_with("load config") {
        let cause = err.root_cause();
        return format!(
            "What happened: Configuration is invalid or unreadable ({cause}).\nLikely causes: Wrong --config path, TOML syntax error, or out-of-range values.\nHow to fix: Edit the TOML config and try again."
        );
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

/// Stable exit codes: 3 for calibration, 4 for hardware init, 1 otherwise.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<StartupError>() {
        Some(StartupError::CalibrationFailure { .. } | StartupError::NoTareSamples) => {
            EXIT_CALIBRATION
        }
        Some(StartupError::HardwareInit(_)) => EXIT_HARDWARE_INIT,
        None => 1,
    }
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if let Some(se) = err.downcast_ref::<StartupError>() {
        return match se {
            StartupError::CalibrationFailure { .. } => "CalibrationFailure",
            StartupError::NoTareSamples => "NoTareSamples",
            StartupError::HardwareInit(_) => "HardwareInit",
        };
    }
    match err.downcast_ref::<StockError>() {
        Some(StockError::AcquisitionTimeout) => "AcquisitionTimeout",
        Some(StockError::Hardware(_)) => "Hardware",
        Some(StockError::Transport(_)) => "Transport",
        Some(StockError::Protocol(_)) => "Protocol",
        Some(StockError::Config(_)) => "Config",
        None if err.downcast_ref::<BuildError>().is_some() => "Config",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let mut obj = json!({
        "reason": reason_name(err),
        "code": exit_code_for_error(err),
        "message": humanize(err),
    });
    if let Some(StartupError::CalibrationFailure { mean_g, tolerance_g }) =
        err.downcast_ref::<StartupError>()
    {
        obj["details"] = json!({ "residual_g": mean_g, "tolerance_g": tolerance_g });
    }
    obj.to_string()
}
