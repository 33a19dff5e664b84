//! Human-readable error descriptions and structured JSON error formatting.

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use pool_core::error::{BuildError, SettingError};

    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the config file, then run `poolctl check-config`."
            ),
            other => format!(
                "What happened: A state machine could not be built ({other}).\nLikely causes: Internal wiring error.\nHow to fix: Re-run with --log-level=debug and report the output."
            ),
        };
    }

    if let Some(se) = err.downcast_ref::<SettingError>() {
        return match se {
            SettingError::UnknownTopic(topic) => format!(
                "What happened: Unknown settings topic {topic}.\nHow to fix: Run `poolctl topics` for the accepted list."
            ),
            SettingError::Parse { topic, payload } | SettingError::OutOfRange { topic, payload } => {
                format!(
                    "What happened: {topic} rejected {payload:?}.\nHow to fix: Run `poolctl topics` for the accepted values."
                )
            }
        };
    }

    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("reading config") {
        return format!(
            "What happened: The config file could not be read ({msg}).\nHow to fix: Check the --config path and its permissions."
        );
    }

    if lower.contains("parsing config") {
        let cause = err.source().map(|s| format!(" Cause: {s}")).unwrap_or_default();
        return format!(
            "What happened: The config file is not valid TOML.{cause}\nHow to fix: Fix the syntax, then run `poolctl check-config`."
        );
    }

    if lower.contains("must be") {
        return format!(
            "What happened: Configuration is invalid: {msg}.\nHow to fix: Edit the TOML config and try again."
        );
    }

    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 2 for configuration problems, 3 for rejected settings, 1 otherwise.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    use pool_core::error::{BuildError, SettingError};
    if err.downcast_ref::<SettingError>().is_some() {
        return 3;
    }
    let msg = err.to_string();
    if err.downcast_ref::<BuildError>().is_some()
        || msg.contains("config")
        || msg.contains("must be")
    {
        return 2;
    }
    1
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let reason = match exit_code_for_error(err) {
        2 => "Config",
        3 => "Setting",
        _ => "Error",
    };
    json!({ "reason": reason, "message": humanize(err) }).to_string()
}
