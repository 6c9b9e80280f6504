//! Parsing helpers for raw environment values.

use std::net::IpAddr;

use crate::error::{ConfigError, ConfigResult};
use crate::model::LogFormatSetting;

/// Parse an unsigned integer that must be at least `min`.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] when the value is not a number or is
/// below `min`.
pub fn parse_u64(field: &'static str, raw: &str, min: u64) -> ConfigResult<u64> {
    let value = raw
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::invalid(field, "not_a_number", raw))?;
    if value < min {
        return Err(ConfigError::invalid(field, "below_minimum", raw));
    }
    Ok(value)
}

/// Parse a TCP port in `1..=65535`.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] for non-numeric, zero, or out of range
/// values.
pub fn parse_port(field: &'static str, raw: &str) -> ConfigResult<u16> {
    let value = parse_u64(field, raw, 1)?;
    u16::try_from(value).map_err(|_| ConfigError::invalid(field, "out_of_range", raw))
}

/// Parse an IP address.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] when the value is not an IP address.
pub fn parse_ip(field: &'static str, raw: &str) -> ConfigResult<IpAddr> {
    raw.trim()
        .parse::<IpAddr>()
        .map_err(|_| ConfigError::invalid(field, "not_an_ip_address", raw))
}

/// Parse a boolean flag (`1`, `true`, `yes`, `on` and their negatives).
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] for unrecognised spellings.
pub fn parse_flag(field: &'static str, raw: &str) -> ConfigResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(field, "not_a_flag", raw)),
    }
}

/// Split a comma-separated allow-list into lower-cased, de-duplicated entries.
///
/// Leading dots are stripped so `.png` and `png` are equivalent.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] when the list has no entries.
pub fn parse_list(field: &'static str, raw: &str) -> ConfigResult<Vec<String>> {
    let mut entries: Vec<String> = Vec::new();
    for item in raw.split(',') {
        let entry = item.trim().trim_start_matches('.').to_ascii_lowercase();
        if !entry.is_empty() && !entries.contains(&entry) {
            entries.push(entry);
        }
    }
    if entries.is_empty() {
        return Err(ConfigError::invalid(field, "empty", raw));
    }
    Ok(entries)
}

/// Split whitespace-separated command arguments.
#[must_use]
pub fn parse_args(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

/// Require a non-blank value.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] when the value is blank.
pub fn parse_non_empty(field: &'static str, raw: &str) -> ConfigResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::invalid(field, "empty", raw));
    }
    Ok(trimmed.to_string())
}

/// Parse the log format selector.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] for anything other than `json` or
/// `pretty`.
pub fn parse_log_format(field: &'static str, raw: &str) -> ConfigResult<LogFormatSetting> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "json" => Ok(LogFormatSetting::Json),
        "pretty" => Ok(LogFormatSetting::Pretty),
        _ => Err(ConfigError::invalid(field, "unknown_log_format", raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason_of(err: &ConfigError) -> &'static str {
        let ConfigError::InvalidField { reason, .. } = err;
        reason
    }

    #[test]
    fn parse_port_rejects_zero_and_overflow() {
        assert_eq!(parse_port("PORT", "8080").ok(), Some(8080));
        let zero = parse_port("PORT", "0").err();
        assert_eq!(zero.as_ref().map(reason_of), Some("below_minimum"));
        let big = parse_port("PORT", "70000").err();
        assert_eq!(big.as_ref().map(reason_of), Some("out_of_range"));
        let text = parse_port("PORT", "http").err();
        assert_eq!(text.as_ref().map(reason_of), Some("not_a_number"));
    }

    #[test]
    fn parse_list_normalises_entries() -> ConfigResult<()> {
        let list = parse_list("EXT", " .PNG, jpg ,png,,TIFF ")?;
        assert_eq!(list, vec!["png", "jpg", "tiff"]);
        let empty = parse_list("EXT", " , ").err();
        assert_eq!(empty.as_ref().map(reason_of), Some("empty"));
        Ok(())
    }

    #[test]
    fn parse_flag_accepts_common_spellings() {
        assert_eq!(parse_flag("F", "TrUe").ok(), Some(true));
        assert_eq!(parse_flag("F", "off").ok(), Some(false));
        assert!(parse_flag("F", "maybe").is_err());
    }

    #[test]
    fn parse_args_splits_on_whitespace() {
        assert_eq!(
            parse_args("  analyze.py   --quiet "),
            vec!["analyze.py".to_string(), "--quiet".to_string()]
        );
        assert!(parse_args("   ").is_empty());
    }

    #[test]
    fn parse_log_format_is_strict() {
        assert_eq!(
            parse_log_format("FMT", "JSON").ok(),
            Some(LogFormatSetting::Json)
        );
        assert!(parse_log_format("FMT", "xml").is_err());
    }
}
