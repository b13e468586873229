//! Key-authenticated document processing
//!
//! External integrations push documents into the collection their API
//! key is bound to, without choosing pipeline settings themselves.

use axum::extract::{Multipart, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::json;
use tracing::info;

use crate::error::{Error, Result};
use crate::pipeline::types::{FileInfo, PipelineConfig};
use crate::server::routes::read_submission;
use crate::server::state::AppState;

/// POST /api/process
pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    let presented = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::Unauthorized("missing x-api-key header".into()))?;
    let key = state
        .store()
        .keys()
        .validate(presented)
        .ok_or_else(|| Error::Forbidden("invalid api key".into()))?;

    let submission = read_submission(multipart).await?;

    // settings come from the key's collection, not the requester
    let mut config = PipelineConfig {
        collection_name: key.collection_name.clone(),
        system_prompt: key.system_prompt.clone().unwrap_or_default(),
        ..Default::default()
    };
    if let Some(info) = state.store().get_collection(&key.collection_name) {
        config.entity_types = info.entity_types.clone();
        config.embedding.model = info.embedding_model.clone();
    }
    config.normalize()?;

    let infos: Vec<FileInfo> = submission.files.iter().map(|f| f.info.clone()).collect();
    let job = state.store().create_job(infos, config);
    info!(job_id = %job.id, collection = %key.collection_name, "external processing request accepted");

    state.runner().spawn(job.id, submission.files);

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "jobId": job.id,
            "status": job.status,
            "collectionName": key.collection_name,
            "streamUrl": format!("/api/pipelines/{}/stream", job.id),
        })),
    ))
}
