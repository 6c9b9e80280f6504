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

//! Upload-to-result pipeline for medical scan analysis.
//!
//! Stages run strictly in order and any failure short-circuits to the response
//! mapper: `intake` (validate the declared upload), `storage` (persist under a
//! collision-resistant name), `invoker` (run the external analysis routine),
//! `decoder` (turn captured output into a [`ResultRecord`]), `response` (map
//! every outcome onto a [`PipelineResponse`]). `service` wires them together.

pub mod decoder;
pub mod error;
pub mod intake;
pub mod invoker;
pub mod model;
pub mod response;
pub mod service;
pub mod storage;

pub use decoder::decode;
pub use error::{ErrorKind, PipelineError, PipelineResult, ValidationReason};
pub use intake::{AcceptedUpload, DeclaredUpload, IntakePolicy};
pub use invoker::{AnalysisRoutine, ProcessRoutine};
pub use model::{
    AnalysisInvocation, AnalysisOutcome, Anomaly, ExitInfo, PipelineResponse, ResponseBody,
    ResultRecord, ScanMetrics, StoredFile, UploadRequest,
};
pub use response::{map_error, map_outcome};
pub use service::Pipeline;
pub use storage::{ReadableFile, StoragePlacement};
