//! Upload stage: validate the file before the pipeline spends work on it

use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::pipeline::stages::file_prefix;
use crate::pipeline::store::JobStore;
use crate::pipeline::types::{LogLevel, StageName, FileInfo, MAX_FILE_SIZE, SUPPORTED_MEDIA_TYPES};

/// Extensions accepted when the browser sends a generic media type
const SUPPORTED_EXTENSIONS: [&str; 3] = ["pdf", "csv", "txt"];

fn is_supported(file: &FileInfo) -> bool {
    if SUPPORTED_MEDIA_TYPES.contains(&file.media_type.as_str())
        || file.media_type.starts_with("image/")
    {
        return true;
    }
    file.name
        .rsplit_once('.')
        .map(|(_, ext)| SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

pub async fn run_upload(
    store: &Arc<JobStore>,
    job_id: Uuid,
    file: &FileInfo,
    file_index: usize,
    total_files: usize,
) -> Result<()> {
    let prefix = file_prefix(file_index, total_files);
    store.add_log(
        job_id,
        StageName::Upload,
        LogLevel::Info,
        format!("{prefix} Validating {} ({} bytes)", file.name, file.size),
    )?;

    if !is_supported(file) {
        return Err(Error::validation(format!(
            "Unsupported file type: {} ({})",
            file.name, file.media_type
        )));
    }
    if file.size > MAX_FILE_SIZE {
        return Err(Error::validation(format!(
            "File too large: {} ({} bytes, limit {} bytes)",
            file.name, file.size, MAX_FILE_SIZE
        )));
    }

    store.add_log(
        job_id,
        StageName::Upload,
        LogLevel::Info,
        format!("{prefix} Accepted {}", file.name),
    )?;
    store.set_stage_output(
        job_id,
        StageName::Upload,
        json!({
            "fileName": file.name,
            "fileType": file.media_type,
            "fileSize": file.size,
        }),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str, media_type: &str, size: u64) -> FileInfo {
        FileInfo {
            name: name.into(),
            media_type: media_type.into(),
            size,
        }
    }

    #[test]
    fn supported_types_and_extension_fallback() {
        assert!(is_supported(&info("a.pdf", "application/pdf", 1)));
        assert!(is_supported(&info("a.csv", "text/csv", 1)));
        assert!(is_supported(&info("a.png", "image/png", 1)));
        assert!(is_supported(&info("a.txt", "application/octet-stream", 1)));
        assert!(!is_supported(&info("a.exe", "application/octet-stream", 1)));
        assert!(!is_supported(&info("noext", "application/octet-stream", 1)));
    }

    #[tokio::test]
    async fn rejects_oversized_file() {
        let store = Arc::new(JobStore::new(
            None,
            None,
            Arc::new(crate::keys::ApiKeyStore::new(None)),
        ));
        let file = info("big.pdf", "application/pdf", MAX_FILE_SIZE + 1);
        let job = store.create_job(vec![file.clone()], Default::default());
        let err = run_upload(&store, job.id, &file, 0, 1).await.unwrap_err();
        assert!(err.to_string().contains("File too large"));
    }
}
