//! Human-readable error descriptions and structured JSON error formatting.

use glyco_core::error::{BuildError, EngineError};

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(ee) = err.downcast_ref::<EngineError>() {
        return match ee {
            EngineError::InvalidInput(msg) => format!(
                "What happened: History input was rejected ({msg}).\nLikely causes: Out-of-order rows, negative amounts, non-finite values, or records after --now.\nHow to fix: Sort the CSV by time, fix the offending row, or move --now past the last record."
            ),
            EngineError::InsufficientData(msg) => format!(
                "What happened: Not enough data to continue ({msg}).\nLikely causes: Stale glucose, an empty glucose CSV, or dose history that does not cover the insulin action duration.\nHow to fix: Provide recent readings, or a dose CSV (with --doses-complete-since) reaching back one action duration."
            ),
            EngineError::ParameterOutOfRange(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun `glyco check-config`."
            ),
            EngineError::InternalInconsistency(msg) => format!(
                "What happened: History is contradictory ({msg}).\nLikely causes: Two basal deliveries (temp basal, suspend, scheduled) overlap in the dose CSV.\nHow to fix: Truncate the earlier delivery at the start of the later one."
            ),
            EngineError::Provider(msg) => format!(
                "What happened: History could not be read ({msg}).\nLikely causes: The history source is unavailable.\nHow to fix: Check the input files and rerun with --log-level=debug."
            ),
        };
    }

    if let Some(be) = err.downcast_ref::<BuildError>() {
        return format!(
            "What happened: Snapshot could not be built ({be}).\nLikely causes: A required input was not wired into the builder.\nHow to fix: Re-run with --log-level=debug and report the issue."
        );
    }

    // String-based heuristics for errors coming from config or CSV loading
    let msg = format!("{err:#}");
    let lower = msg.to_ascii_lowercase();

    if lower.contains("must have headers") {
        return format!(
            "Invalid headers in history CSV.\nExpected: glucose 'date,mg_dl[,source]', doses 'type,start,end,units', carbs 'date,grams,absorption_min,partially_absorbed'.\nDetails: {msg}"
        );
    }

    if lower.contains("invalid csv row") {
        return format!(
            "What happened: A history CSV row could not be parsed.\nLikely causes: A date that is not RFC 3339, a non-numeric amount, or an unknown dose type.\nHow to fix: Fix the row named below.\nDetails: {msg}"
        );
    }

    if lower.contains("parse config") || lower.contains("read config") {
        return format!(
            "What happened: The config file could not be loaded.\nLikely causes: Wrong --config path, TOML syntax error, or a missing [patient]/[target]/[limits] section.\nHow to fix: Fix the file and rerun `glyco check-config`.\nDetails: {msg}"
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

/// Stable exit codes per engine error kind; everything else returns 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<EngineError>() {
        Some(EngineError::InvalidInput(_)) => 3,
        Some(EngineError::InsufficientData(_)) => 4,
        Some(EngineError::ParameterOutOfRange(_)) => 5,
        Some(EngineError::InternalInconsistency(_)) => 6,
        Some(EngineError::Provider(_)) => 7,
        None => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let reason = err
        .downcast_ref::<EngineError>()
        .map_or("error", EngineError::kind);
    json!({
        "reason": reason,
        "exit_code": exit_code_for_error(err),
        "error": format!("{err:#}"),
        "message": humanize(err),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(EngineError::InvalidInput("x".into()), 3, "invalid_input")]
    #[case(EngineError::InsufficientData("x".into()), 4, "insufficient_data")]
    #[case(EngineError::ParameterOutOfRange("x".into()), 5, "parameter_out_of_range")]
    #[case(EngineError::InternalInconsistency("x".into()), 6, "internal_inconsistency")]
    #[case(EngineError::Provider("x".into()), 7, "provider")]
    fn engine_errors_map_to_stable_codes(
        #[case] e: EngineError,
        #[case] code: i32,
        #[case] reason: &str,
    ) {
        let report = eyre::Report::new(e).wrap_err("fetch glucose history");
        assert_eq!(exit_code_for_error(&report), code);
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&report)).unwrap();
        assert_eq!(v["reason"], reason);
        assert_eq!(v["exit_code"], code);
    }

    #[test]
    fn untyped_errors_fall_back() {
        let report = eyre::eyre!("something odd");
        assert_eq!(exit_code_for_error(&report), 1);
        assert!(humanize(&report).starts_with("Something went wrong."));
    }
}
