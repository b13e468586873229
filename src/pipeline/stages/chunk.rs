//! Chunk stage: split extracted text per the job's chunking config

use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::chunking::{self, TextChunk};
use crate::error::{Error, Result};
use crate::pipeline::stages::file_prefix;
use crate::pipeline::store::JobStore;
use crate::pipeline::types::{LogLevel, PipelineConfig, StageName};

pub async fn run_chunk(
    store: &Arc<JobStore>,
    job_id: Uuid,
    config: &PipelineConfig,
    text: &str,
    file_index: usize,
    total_files: usize,
) -> Result<Vec<TextChunk>> {
    let prefix = file_prefix(file_index, total_files);
    store.add_log(
        job_id,
        StageName::Chunk,
        LogLevel::Info,
        format!(
            "{prefix} Splitting {} characters (strategy={:?}, size={}, overlap={})",
            text.chars().count(),
            config.chunking_strategy,
            config.chunk_size,
            config.chunk_overlap
        ),
    )?;

    let chunks = chunking::split(
        text,
        config.chunk_size,
        config.chunk_overlap,
        config.chunking_strategy,
    );
    if chunks.is_empty() {
        return Err(Error::validation("no chunks produced from input text"));
    }

    let avg = chunks.iter().map(|c| c.text.len()).sum::<usize>() / chunks.len();
    store.add_log(
        job_id,
        StageName::Chunk,
        LogLevel::Info,
        format!("{prefix} Produced {} chunks (avg {} bytes)", chunks.len(), avg),
    )?;
    store.set_stage_output(
        job_id,
        StageName::Chunk,
        json!({
            "chunkCount": chunks.len(),
            "strategy": config.chunking_strategy,
            "avgChunkSize": avg,
        }),
    )?;
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::ApiKeyStore;
    use crate::pipeline::types::FileInfo;

    #[tokio::test]
    async fn records_chunk_count_output() {
        let store = Arc::new(JobStore::new(None, None, Arc::new(ApiKeyStore::new(None))));
        let file = FileInfo {
            name: "a.txt".into(),
            media_type: "text/plain".into(),
            size: 100,
        };
        let config = PipelineConfig {
            chunk_size: 40,
            chunk_overlap: 10,
            ..Default::default()
        };
        let job = store.create_job(vec![file], config.clone());

        let text = "First sentence here. Second sentence follows. Third one closes it out.";
        let chunks = run_chunk(&store, job.id, &config, text, 0, 1).await.unwrap();
        assert!(chunks.len() > 1);

        let loaded = store.get_job(job.id).unwrap();
        let output = loaded.stage(StageName::Chunk).unwrap().output.clone().unwrap();
        assert_eq!(output["chunkCount"], json!(chunks.len()));
    }

    #[tokio::test]
    async fn empty_text_is_an_error() {
        let store = Arc::new(JobStore::new(None, None, Arc::new(ApiKeyStore::new(None))));
        let job = store.create_job(Vec::new(), PipelineConfig::default());
        let err = run_chunk(&store, job.id, &PipelineConfig::default(), "", 0, 1)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no chunks"));
    }
}
