#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Environment-backed configuration for the scanlab services.
//!
//! Layout: `model.rs` (typed configuration sections), `loader.rs` (environment
//! lookup and assembly), `validate.rs` (value parsing helpers), `defaults.rs`
//! (variable names and default values).

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use model::{
    AnalyzerConfig, IntakeConfig, LogFormatSetting, LoggingSettings, RetentionPolicy,
    ScanlabConfig, ServerConfig, StorageConfig,
};
