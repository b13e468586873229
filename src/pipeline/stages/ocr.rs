//! OCR stage: turn the uploaded bytes into text

use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::pipeline::stages::file_prefix;
use crate::pipeline::store::JobStore;
use crate::pipeline::types::{FileInfo, LogLevel, StageName};
use crate::providers::OcrProvider;

fn needs_ocr(media_type: &str) -> bool {
    media_type == "application/pdf" || media_type.starts_with("image/")
}

pub async fn run_ocr(
    store: &Arc<JobStore>,
    job_id: Uuid,
    ocr: &Arc<dyn OcrProvider>,
    file: &FileInfo,
    data: &[u8],
    file_index: usize,
    total_files: usize,
) -> Result<String> {
    let prefix = file_prefix(file_index, total_files);

    let (text, method) = if needs_ocr(&file.media_type) {
        store.add_log(
            job_id,
            StageName::Ocr,
            LogLevel::Info,
            format!("{prefix} Sending {} to OCR backend", file.name),
        )?;
        let text = ocr.extract_text(&file.name, &file.media_type, data).await?;
        (text, "ocr")
    } else {
        store.add_log(
            job_id,
            StageName::Ocr,
            LogLevel::Info,
            format!("{prefix} Reading {} as text", file.name),
        )?;
        (String::from_utf8_lossy(data).into_owned(), "direct")
    };

    if text.trim().is_empty() {
        return Err(Error::ocr(format!("no text extracted from {}", file.name)));
    }

    store.add_log(
        job_id,
        StageName::Ocr,
        LogLevel::Info,
        format!("{prefix} Extracted {} characters", text.chars().count()),
    )?;
    store.set_stage_output(
        job_id,
        StageName::Ocr,
        json!({
            "method": method,
            "charCount": text.chars().count(),
        }),
    )?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::ApiKeyStore;
    use async_trait::async_trait;

    struct NoopOcr;

    #[async_trait]
    impl OcrProvider for NoopOcr {
        async fn extract_text(&self, _: &str, _: &str, _: &[u8]) -> Result<String> {
            panic!("plain text must not reach the ocr backend");
        }
    }

    #[tokio::test]
    async fn plain_text_bypasses_backend() {
        let store = Arc::new(JobStore::new(None, None, Arc::new(ApiKeyStore::new(None))));
        let file = FileInfo {
            name: "notes.txt".into(),
            media_type: "text/plain".into(),
            size: 11,
        };
        let job = store.create_job(vec![file.clone()], Default::default());
        let ocr: Arc<dyn OcrProvider> = Arc::new(NoopOcr);

        let text = run_ocr(&store, job.id, &ocr, &file, b"hello world", 0, 1)
            .await
            .unwrap();
        assert_eq!(text, "hello world");
    }

    #[tokio::test]
    async fn empty_extraction_fails() {
        let store = Arc::new(JobStore::new(None, None, Arc::new(ApiKeyStore::new(None))));
        let file = FileInfo {
            name: "blank.txt".into(),
            media_type: "text/plain".into(),
            size: 3,
        };
        let job = store.create_job(vec![file.clone()], Default::default());
        let ocr: Arc<dyn OcrProvider> = Arc::new(NoopOcr);

        let err = run_ocr(&store, job.id, &ocr, &file, b"  \n", 0, 1)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no text extracted"));
    }
}
