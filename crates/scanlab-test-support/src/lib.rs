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

//! Shared test helpers used across integration suites.
//! Layout: routines.rs (synthetic analysis routines), multipart.rs (request body builders).

pub mod multipart;
pub mod routines;

pub use multipart::MultipartBody;
pub use routines::{RoutineScript, SAMPLE_RESULT_JSON};
