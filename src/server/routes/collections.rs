//! Collection inspection

use axum::extract::{Path, State};
use axum::Json;
use serde_json::json;

use crate::error::{Error, Result};
use crate::pipeline::types::CollectionInfo;
use crate::server::state::AppState;

/// GET /api/collections
pub async fn list(State(state): State<AppState>) -> Json<Vec<CollectionInfo>> {
    Json(state.store().list_collections())
}

/// GET /api/collections/:name
pub async fn get(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let info = state
        .store()
        .get_collection(&name)
        .ok_or_else(|| Error::CollectionNotFound(name.clone()))?;

    let jobs: Vec<_> = state
        .store()
        .list_jobs()
        .into_iter()
        .filter(|job| job.config.collection_name == name)
        .collect();

    Ok(Json(json!({
        "collection": info,
        "jobs": jobs,
    })))
}
