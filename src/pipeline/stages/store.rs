//! Store stage: upsert embedded chunks into the vector database
//!
//! Runs in dry-run mode when no vector database is configured, so the
//! pipeline stays usable on a laptop without Qdrant.

use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;
use crate::pipeline::stages::{file_prefix, EmbeddedChunk};
use crate::pipeline::store::JobStore;
use crate::pipeline::types::{FileInfo, LogLevel, PipelineJob, StageName};
use crate::providers::{EmbeddingProvider, VectorPoint, VectorStoreProvider};

const UPSERT_BATCH_SIZE: usize = 100;

pub async fn run_store(
    store: &Arc<JobStore>,
    job: &PipelineJob,
    vectors: Option<&Arc<dyn VectorStoreProvider>>,
    embedder: &Arc<dyn EmbeddingProvider>,
    file: &FileInfo,
    chunks: Vec<EmbeddedChunk>,
    file_index: usize,
    total_files: usize,
) -> Result<()> {
    let job_id = job.id;
    let prefix = file_prefix(file_index, total_files);
    let collection = job.config.collection_name.as_str();

    if chunks.is_empty() {
        store.add_log(
            job_id,
            StageName::Store,
            LogLevel::Info,
            format!("{prefix} Nothing to store"),
        )?;
        store.set_stage_output(job_id, StageName::Store, json!({ "stored": 0 }))?;
        return Ok(());
    }

    let dimensions = chunks[0].vector.len();

    let Some(vectors) = vectors else {
        store.add_log(
            job_id,
            StageName::Store,
            LogLevel::Warn,
            format!(
                "{prefix} No vector database configured, discarding {} vectors",
                chunks.len()
            ),
        )?;
        store.set_stage_output(
            job_id,
            StageName::Store,
            json!({
                "stored": chunks.len(),
                "collection": collection,
                "dryRun": true,
            }),
        )?;
        // no vectors actually landed, so no collection or key yet
        return Ok(());
    };

    vectors.ensure_collection(collection, dimensions).await?;

    let points: Vec<VectorPoint> = chunks
        .iter()
        .map(|c| VectorPoint {
            id: Uuid::new_v4(),
            vector: c.vector.clone(),
            payload: json!({
                "text": c.chunk.chunk.text,
                "fileName": file.name,
                "chunkIndex": c.chunk.chunk.index,
                "startChar": c.chunk.chunk.start_char,
                "endChar": c.chunk.chunk.end_char,
                "entities": c.chunk.entities,
                "entityTags": c.chunk.entity_tags,
            }),
        })
        .collect();

    for batch in points.chunks(UPSERT_BATCH_SIZE) {
        vectors.upsert(collection, batch).await?;
    }

    store.add_log(
        job_id,
        StageName::Store,
        LogLevel::Info,
        format!(
            "{prefix} Stored {} vectors in {}",
            points.len(),
            collection
        ),
    )?;
    store.set_stage_output(
        job_id,
        StageName::Store,
        json!({
            "stored": points.len(),
            "collection": collection,
            "dimensions": dimensions,
        }),
    )?;
    store.register_collection(
        job,
        collection,
        dimensions,
        points.len() as u64,
        embedder.name(),
        embedder.model(),
    );
    Ok(())
}
