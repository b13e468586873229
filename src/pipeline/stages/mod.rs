//! Stage bodies for the six-stage document pipeline
//!
//! Each stage is a free async function over the job store plus its
//! inputs; the runner wires them together per file and the executor
//! wrapper owns the status transitions.

pub mod chunk;
pub mod embed;
pub mod extract;
pub mod ocr;
pub mod store;
pub mod upload;

pub use chunk::run_chunk;
pub use embed::{run_embed, EmbeddedChunk};
pub use extract::{run_extract, ExtractedChunk};
pub use ocr::run_ocr;
pub use store::run_store;
pub use upload::run_upload;

/// Log prefix tying a line to the file being processed
pub(crate) fn file_prefix(file_index: usize, total_files: usize) -> String {
    format!("[{}/{}]", file_index + 1, total_files)
}
