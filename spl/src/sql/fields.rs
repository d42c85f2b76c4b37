//! Field-name aliases and syslog severity coercion.

use crate::query::Value;

/// Canonical timestamp column.
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Canonical severity column.
pub const SEVERITY_FIELD: &str = "severity";

/// Columns selected when no stage replaces the select list.
pub const DEFAULT_FIELDS: [&str; 5] = [TIMESTAMP_FIELD, "hostname", "app_name", SEVERITY_FIELD, "message"];

/// User-facing field names and the column each one resolves to.
const FIELD_ALIASES: &[(&str, &str)] = &[
    ("host", "hostname"),
    ("hostname", "hostname"),
    ("app", "app_name"),
    ("app_name", "app_name"),
    ("program", "app_name"),
    ("sourcetype", "app_name"),
    ("level", SEVERITY_FIELD),
    ("priority", SEVERITY_FIELD),
    ("severity", SEVERITY_FIELD),
    ("msg", "message"),
    ("message", "message"),
    ("_raw", "raw"),
    ("_time", TIMESTAMP_FIELD),
    ("time", TIMESTAMP_FIELD),
    ("timestamp", TIMESTAMP_FIELD),
    ("index", "index_name"),
];

/// Syslog severity names (RFC 5424) and their numeric levels.
const SEVERITY_LEVELS: &[(&str, i64)] = &[
    ("emergency", 0),
    ("emerg", 0),
    ("panic", 0),
    ("alert", 1),
    ("critical", 2),
    ("crit", 2),
    ("error", 3),
    ("err", 3),
    ("warning", 4),
    ("warn", 4),
    ("notice", 5),
    ("info", 6),
    ("informational", 6),
    ("debug", 7),
];

/// Level used for severity names that are neither known nor numeric.
pub const DEFAULT_SEVERITY: i64 = 6;

/// Resolves a user-facing field name to its column. Unknown names pass through unchanged.
#[must_use]
pub fn map_field(name: &str) -> &str {
    FIELD_ALIASES
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(name))
        .map_or(name, |(_, column)| *column)
}

/// Numeric level of a severity name or number.
#[must_use]
pub fn severity_level(text: &str) -> i64 {
    let lower = text.trim().to_lowercase();
    SEVERITY_LEVELS
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|(_, level)| *level)
        .or_else(|| lower.parse::<i64>().ok())
        .unwrap_or(DEFAULT_SEVERITY)
}

/// Coerces a comparison value against the severity column to its numeric level.
#[must_use]
pub fn coerce_severity(value: &Value) -> Value {
    match value {
        Value::String(s) => {
            #[allow(clippy::cast_precision_loss)]
            let level = severity_level(s) as f64;
            Value::Number(level)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_field_aliases() {
        assert_eq!(map_field("host"), "hostname");
        assert_eq!(map_field("HOST"), "hostname");
        assert_eq!(map_field("sourcetype"), "app_name");
        assert_eq!(map_field("level"), "severity");
        assert_eq!(map_field("_raw"), "raw");
        assert_eq!(map_field("_time"), "timestamp");
        assert_eq!(map_field("index"), "index_name");
    }

    #[test]
    fn test_map_field_unknown_passthrough() {
        assert_eq!(map_field("latency_ms"), "latency_ms");
        assert_eq!(map_field("Custom"), "Custom");
    }

    #[test]
    fn test_severity_level() {
        assert_eq!(severity_level("warning"), 4);
        assert_eq!(severity_level("ERR"), 3);
        assert_eq!(severity_level("emerg"), 0);
        assert_eq!(severity_level("5"), 5);
        assert_eq!(severity_level("unknown_word"), DEFAULT_SEVERITY);
    }

    #[test]
    fn test_coerce_severity() {
        assert_eq!(
            coerce_severity(&Value::String("debug".to_string())),
            Value::Number(7.0)
        );
        assert_eq!(coerce_severity(&Value::Number(2.0)), Value::Number(2.0));
        assert_eq!(coerce_severity(&Value::Null), Value::Null);
    }
}
