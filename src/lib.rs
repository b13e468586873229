//! docpipe: staged document-ingestion pipeline server
//!
//! Documents move through a fixed six-stage pipeline (upload, ocr,
//! chunk, extract, embed, store) per file, with live progress over
//! Server-Sent Events. Job state is authoritative in memory and
//! mirrored best-effort to JSON snapshots and an optional SQLite
//! database. Completed pipelines register their target collection and
//! provision an API key for external processing requests.

pub mod chunking;
pub mod config;
pub mod error;
pub mod keys;
pub mod pipeline;
pub mod providers;
pub mod server;
pub mod storage;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use pipeline::{
    types::{JobStatus, PipelineConfig, PipelineJob, StageName, StageStatus},
    FileData, JobStore, PipelineRunner,
};
