//! Extract stage: optional per-chunk entity extraction via the chat model
//!
//! The stage succeeds even when individual chunks fail extraction; a
//! chunk without entities simply carries none into the payload.

use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::chunking::TextChunk;
use crate::error::Result;
use crate::pipeline::stages::file_prefix;
use crate::pipeline::store::JobStore;
use crate::pipeline::types::{LogLevel, PipelineConfig, StageName};
use crate::providers::llm::{build_entity_tags, extract_entities};
use crate::providers::ChatProvider;

/// A chunk annotated with its extraction result
#[derive(Debug, Clone)]
pub struct ExtractedChunk {
    pub chunk: TextChunk,
    pub entities: Option<Value>,
    pub entity_tags: Vec<String>,
}

pub async fn run_extract(
    store: &Arc<JobStore>,
    job_id: Uuid,
    chat: &Arc<dyn ChatProvider>,
    config: &PipelineConfig,
    chunks: Vec<TextChunk>,
    file_index: usize,
    total_files: usize,
) -> Result<Vec<ExtractedChunk>> {
    let prefix = file_prefix(file_index, total_files);

    if config.entity_types.is_empty() {
        store.add_log(
            job_id,
            StageName::Extract,
            LogLevel::Info,
            format!("{prefix} No entity types configured, skipping extraction"),
        )?;
        store.set_stage_output(job_id, StageName::Extract, json!({ "skipped": true }))?;
        return Ok(chunks
            .into_iter()
            .map(|chunk| ExtractedChunk {
                chunk,
                entities: None,
                entity_tags: Vec::new(),
            })
            .collect());
    }

    store.add_log(
        job_id,
        StageName::Extract,
        LogLevel::Info,
        format!(
            "{prefix} Extracting {} from {} chunks",
            config.entity_types.join(", "),
            chunks.len()
        ),
    )?;

    let mut extracted = Vec::with_capacity(chunks.len());
    let mut failures = 0usize;
    for chunk in chunks {
        match extract_entities(chat.as_ref(), &chunk.text, &config.entity_types).await {
            Ok(entities) => {
                let entity_tags = entities.as_ref().map(build_entity_tags).unwrap_or_default();
                extracted.push(ExtractedChunk {
                    chunk,
                    entities,
                    entity_tags,
                });
            }
            Err(err) => {
                failures += 1;
                store.add_log(
                    job_id,
                    StageName::Extract,
                    LogLevel::Warn,
                    format!("{prefix} Extraction failed for chunk {}: {err}", chunk.index),
                )?;
                extracted.push(ExtractedChunk {
                    chunk,
                    entities: None,
                    entity_tags: Vec::new(),
                });
            }
        }
    }

    let with_entities = extracted.iter().filter(|c| c.entities.is_some()).count();
    store.add_log(
        job_id,
        StageName::Extract,
        LogLevel::Info,
        format!(
            "{prefix} Entities found in {}/{} chunks",
            with_entities,
            extracted.len()
        ),
    )?;
    store.set_stage_output(
        job_id,
        StageName::Extract,
        json!({
            "entityTypes": config.entity_types,
            "chunksWithEntities": with_entities,
            "failedChunks": failures,
        }),
    )?;
    Ok(extracted)
}
