//! Pipeline submission and inspection

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::sse::Event;
use axum::response::Sse;
use axum::Json;
use futures_util::Stream;
use serde_json::json;
use std::convert::Infallible;
use tracing::info;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::pipeline::types::{FileInfo, PipelineConfig, PipelineJob};
use crate::server::routes::read_submission;
use crate::server::state::AppState;
use crate::server::stream;

/// POST /api/pipelines
///
/// Multipart body: one or more `files` parts plus an optional JSON
/// `config` part. Returns immediately; the pipeline runs detached.
pub async fn create(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    let submission = read_submission(multipart).await?;

    let mut config: PipelineConfig = match submission.config_json.as_deref() {
        Some(text) => serde_json::from_str(text)
            .map_err(|e| Error::validation(format!("invalid config: {e}")))?,
        None => PipelineConfig {
            chunk_size: state.config().chunking.chunk_size,
            chunk_overlap: state.config().chunking.chunk_overlap,
            ..Default::default()
        },
    };
    config.normalize()?;

    let infos: Vec<FileInfo> = submission.files.iter().map(|f| f.info.clone()).collect();
    let job = state.store().create_job(infos, config);
    info!(job_id = %job.id, files = job.files.len(), collection = %job.config.collection_name, "pipeline submitted");

    state.runner().spawn(job.id, submission.files);

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "jobId": job.id,
            "status": job.status,
            "fileCount": job.files.len(),
            "collectionName": job.config.collection_name,
        })),
    ))
}

/// GET /api/pipelines
pub async fn list(State(state): State<AppState>) -> Json<Vec<PipelineJob>> {
    Json(state.store().list_jobs())
}

/// GET /api/pipelines/:id
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PipelineJob>> {
    match stream::lookup_job(&state, id).await {
        Some(job) => Ok(Json(job)),
        None => Err(Error::JobNotFound(id.to_string())),
    }
}

/// GET /api/pipelines/:id/stream
pub async fn get_stream(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    stream::stream_job(state, id).await
}
