//! Route handlers grouped by resource

pub mod collections;
pub mod pipelines;
pub mod process;

use axum::extract::multipart::Multipart;
use mime_guess::MimeGuess;

use crate::error::{Error, Result};
use crate::pipeline::runner::FileData;
use crate::pipeline::types::FileInfo;

/// Parsed multipart submission: uploaded files plus an optional JSON
/// `config` part
pub(crate) struct Submission {
    pub files: Vec<FileData>,
    pub config_json: Option<String>,
}

pub(crate) async fn read_submission(mut multipart: Multipart) -> Result<Submission> {
    let mut files = Vec::new();
    let mut config_json = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::validation(format!("malformed multipart body: {e}")))?
    {
        let part_name = field.name().map(str::to_string);
        match part_name.as_deref() {
            Some("files") | Some("file") => {
                let name = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| Error::validation("file part is missing a filename"))?;
                let media_type = field
                    .content_type()
                    .map(str::to_string)
                    .filter(|t| t != "application/octet-stream")
                    .unwrap_or_else(|| {
                        MimeGuess::from_path(&name)
                            .first_or_octet_stream()
                            .essence_str()
                            .to_string()
                    });
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| Error::validation(format!("failed to read {name}: {e}")))?;
                files.push(FileData {
                    info: FileInfo {
                        name,
                        media_type,
                        size: data.len() as u64,
                    },
                    data: data.to_vec(),
                });
            }
            Some("config") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| Error::validation(format!("failed to read config: {e}")))?;
                config_json = Some(text);
            }
            _ => {}
        }
    }

    if files.is_empty() {
        return Err(Error::validation("at least one file is required"));
    }
    Ok(Submission { files, config_json })
}
