//! Error types for configuration operations.
//!
//! # Design
//! - Constant messages; the offending variable and value travel as fields.
//! - A single variant covers every parse/validation failure so callers only
//!   need to report `field` and `reason`.

use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration value failed parsing or validation.
    #[error("invalid configuration field")]
    InvalidField {
        /// Environment variable that failed validation.
        field: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: &'static str, value: &str) -> Self {
        Self::InvalidField {
            field,
            reason,
            value: Some(value.to_string()),
        }
    }
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_helper_captures_context() {
        let err = ConfigError::invalid("SCANLAB_HTTP_PORT", "not_a_number", "abc");
        assert_eq!(err.to_string(), "invalid configuration field");
        let ConfigError::InvalidField {
            field,
            reason,
            value,
        } = err;
        assert_eq!(field, "SCANLAB_HTTP_PORT");
        assert_eq!(reason, "not_a_number");
        assert_eq!(value.as_deref(), Some("abc"));
    }
}
