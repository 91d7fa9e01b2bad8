//! Human-readable error descriptions and structured JSON error formatting.

use shelf_core::error::{BuildError, CalibrationError, NodeError};

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingRanger => {
                "What happened: No ranger was provided to the node.\nLikely causes: GPIO rangers failed to initialize or were not wired into the builder.\nHow to fix: Build with --features hardware on the Pi, or rerun with --sim.".to_string()
            }
            BuildError::MissingRadio | BuildError::MissingTransport | BuildError::MissingResolver => format!(
                "What happened: Node assembly is incomplete ({be}).\nLikely causes: A peripheral was not passed to the builder.\nHow to fix: Rerun with --sim to check the rest of the setup, then report the missing peripheral."
            ),
            BuildError::MissingStore => {
                "What happened: No storage was provided to the node.\nLikely causes: The state file could not be opened.\nHow to fix: Check storage.path in the config and its directory permissions.".to_string()
            }
            BuildError::MissingIdentity => {
                "What happened: The device identity could not be determined.\nLikely causes: /etc/machine-id is missing and device.id is not set.\nHow to fix: Set device.id in the [device] section of the config.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/shelf_node.toml for a sample."
            ),
        };
    }

    if let Some(ce) = err.downcast_ref::<CalibrationError>() {
        return match ce {
            CalibrationError::UnknownSlot(id) => format!(
                "What happened: There is no slot named {id}.\nLikely causes: Typo, or the slot is not listed under [[slots]].\nHow to fix: Run `shelf_cli slots` to list the configured ids (they are case-sensitive)."
            ),
            CalibrationError::InsufficientSamples { valid, required } => format!(
                "What happened: Calibration failed: only {valid} of the samples were in range ({required} required).\nLikely causes: Slot not empty, sensor unplugged, or reflections from a soft surface.\nHow to fix: Empty the slot, check the sensor wiring, then calibrate again. The previous reference length was kept."
            ),
            CalibrationError::Persist(msg) => format!(
                "What happened: Calibration succeeded but could not be saved ({msg}).\nLikely causes: Storage path not writable or disk full.\nHow to fix: Check storage.path in the config, then calibrate again."
            ),
        };
    }

    if let Some(ne) = err.downcast_ref::<NodeError>() {
        return match ne {
            NodeError::UnknownSlot(id) => format!(
                "What happened: There is no slot named {id}.\nLikely causes: Typo, or the slot is not listed under [[slots]].\nHow to fix: Run `shelf_cli slots` to list the configured ids."
            ),
            NodeError::Storage(msg) => format!(
                "What happened: Persisted state could not be read or written ({msg}).\nLikely causes: Storage path not writable, or the state file was edited by hand.\nHow to fix: Check storage.path; `shelf_cli reset` starts over with defaults."
            ),
            NodeError::Timeout => "What happened: A sensor read timed out.\nLikely causes: Ultrasonic sensor not wired or not powered.\nHow to fix: Verify the sensor's signal pin against [[slots]] gpio and its 5V/GND, then rerun.".to_string(),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("read config") {
        return format!(
            "What happened: The config file could not be read.\nLikely causes: Wrong --config path or missing permissions.\nHow to fix: Pass --config pointing at your TOML (default etc/shelf_node.toml). Original: {msg}"
        );
    }

    if lower.contains("gpio") {
        return "What happened: Failed to initialize GPIO pins.\nLikely causes: Incorrect pin numbers or insufficient GPIO permissions.\nHow to fix: Fix the [[slots]] gpio values; ensure the process may access /dev/gpiomem.".to_string();
    }

    if lower.contains("invalid configuration")
        || lower.contains("must ")
        || lower.contains("missing field")
    {
        return format!(
            "What happened: Configuration is invalid or incomplete.\nLikely causes: Missing [wifi] networks or [[slots]], or out-of-range values.\nHow to fix: Edit the TOML config and try again. Original: {msg}"
        );
    }

    if lower.contains("hardware support") {
        return format!(
            "What happened: {msg}.\nLikely causes: This binary was built without the `hardware` feature.\nHow to fix: Rebuild with --features hardware, or rerun with --sim."
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

/// Stable exit codes: 3 for a failed calibration, 4 for an unknown slot, 1 otherwise.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(ce) = err.downcast_ref::<CalibrationError>() {
        return match ce {
            CalibrationError::UnknownSlot(_) => 4,
            CalibrationError::InsufficientSamples { .. } | CalibrationError::Persist(_) => 3,
        };
    }
    if let Some(NodeError::UnknownSlot(_)) = err.downcast_ref::<NodeError>() {
        return 4;
    }
    1
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if let Some(ce) = err.downcast_ref::<CalibrationError>() {
        return match ce {
            CalibrationError::UnknownSlot(_) => "UnknownSlot",
            CalibrationError::InsufficientSamples { .. } => "InsufficientSamples",
            CalibrationError::Persist(_) => "PersistFailed",
        };
    }
    match err.downcast_ref::<NodeError>() {
        Some(NodeError::UnknownSlot(_)) => "UnknownSlot",
        Some(NodeError::Storage(_)) => "Storage",
        _ if err.downcast_ref::<BuildError>().is_some() => "Build",
        _ => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    if let Some(CalibrationError::InsufficientSamples { valid, required }) =
        err.downcast_ref::<CalibrationError>()
    {
        return json!({
            "reason": reason_name(err),
            "details": { "valid": valid, "required": required },
            "message": humanize(err),
        })
        .to_string();
    }

    json!({ "reason": reason_name(err), "message": humanize(err) }).to_string()
}
