//! Job orchestration: types, store, executor, stages, and runner

pub mod executor;
pub mod runner;
pub mod stages;
pub mod store;
pub mod types;

pub use runner::{FileData, PipelineRunner};
pub use store::JobStore;
