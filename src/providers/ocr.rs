//! OCR backend client
//!
//! PDFs and images go to an external OCR service over multipart HTTP.
//! Plain text and CSV never reach this provider.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{Error, Result};

#[async_trait]
pub trait OcrProvider: Send + Sync {
    /// Extract text from a binary document
    async fn extract_text(&self, filename: &str, media_type: &str, data: &[u8]) -> Result<String>;
}

/// Stands in when no OCR backend is configured; text and CSV files
/// never reach this, binary documents fail fast.
pub struct DisabledOcr;

#[async_trait]
impl OcrProvider for DisabledOcr {
    async fn extract_text(&self, filename: &str, _: &str, _: &[u8]) -> Result<String> {
        Err(Error::ocr(format!(
            "no OCR backend configured, cannot process {filename}"
        )))
    }
}

pub struct OcrBackendClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Deserialize)]
struct OcrResponse {
    text: String,
}

impl OcrBackendClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl OcrProvider for OcrBackendClient {
    async fn extract_text(&self, filename: &str, media_type: &str, data: &[u8]) -> Result<String> {
        let part = reqwest::multipart::Part::bytes(data.to_vec())
            .file_name(filename.to_string())
            .mime_str(media_type)
            .map_err(|e| Error::ocr(format!("invalid media type {media_type}: {e}")))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(format!(
                "{}/v1/ocr?model={}&task_type=structure",
                self.base_url, self.model
            ))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ocr(format!("ocr backend returned {status}: {body}")));
        }

        let parsed: OcrResponse = response.json().await?;
        Ok(parsed.text)
    }
}
