use chrono::Duration;
use thiserror::Error;

/// Parse a boolean flag from a string value, or return the given default value otherwise.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let value = match value {
        Some(v) => v,
        None => return default,
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid duration '{0}'. Expected a whole number followed by an optional unit (s, m, h, d, w).")]
pub struct DurationParseError(pub String);

/// Parses durations in the compact form used by the config table, e.g. `90s`, `15m`, `24h`, `14d`, `2w`.
///
/// A bare number is read as seconds. Negative values are rejected.
pub fn parse_duration(value: &str) -> Result<Duration, DurationParseError> {
    let trimmed = value.trim().to_ascii_lowercase();
    let split = trimmed.find(|c: char| !c.is_ascii_digit()).unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);
    let n = digits.parse::<i64>().map_err(|_| DurationParseError(value.to_string()))?;
    let duration = match unit.trim() {
        "" | "s" => Duration::try_seconds(n),
        "m" => Duration::try_minutes(n),
        "h" => Duration::try_hours(n),
        "d" => Duration::try_days(n),
        "w" => Duration::try_weeks(n),
        _ => None,
    };
    duration.ok_or_else(|| DurationParseError(value.to_string()))
}

/// The inverse of [`parse_duration`], using the largest unit that represents the value exactly.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.num_seconds();
    const UNITS: [(i64, &str); 4] = [(604_800, "w"), (86_400, "d"), (3_600, "h"), (60, "m")];
    for (size, unit) in UNITS {
        if secs != 0 && secs % size == 0 {
            return format!("{}{unit}", secs / size);
        }
    }
    format!("{secs}s")
}
