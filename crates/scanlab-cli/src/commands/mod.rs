//! Command handlers grouped by concern.

pub(crate) mod analyze;
pub(crate) mod config;
