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

//! HTTP surface for the scan analysis pipeline.
//!
//! Layout: `http/router.rs` (server and middleware stack), `http/upload.rs`
//! (multipart intake), `http/health.rs` (health and metrics), `http/errors.rs`
//! (error payloads), `http/telemetry.rs` (request metrics), `state.rs`
//! (shared handler state), `models.rs` (response bodies), `error.rs` (server
//! errors).

pub mod error;
pub mod http;
pub mod models;
pub(crate) mod state;

pub use error::{ApiServerError, ApiServerResult};
pub use http::router::ApiServer;
