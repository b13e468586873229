//! Embed stage: batch the chunks through the embedding provider

use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::pipeline::stages::{file_prefix, ExtractedChunk};
use crate::pipeline::store::JobStore;
use crate::pipeline::types::{LogLevel, StageName};
use crate::providers::EmbeddingProvider;

const EMBED_BATCH_SIZE: usize = 20;

/// A chunk with its embedding vector
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: ExtractedChunk,
    pub vector: Vec<f32>,
}

pub async fn run_embed(
    store: &Arc<JobStore>,
    job_id: Uuid,
    embedder: &Arc<dyn EmbeddingProvider>,
    chunks: Vec<ExtractedChunk>,
    file_index: usize,
    total_files: usize,
) -> Result<Vec<EmbeddedChunk>> {
    let prefix = file_prefix(file_index, total_files);
    store.add_log(
        job_id,
        StageName::Embed,
        LogLevel::Info,
        format!(
            "{prefix} Embedding {} chunks with {}/{}",
            chunks.len(),
            embedder.name(),
            embedder.model()
        ),
    )?;

    let mut embedded = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(EMBED_BATCH_SIZE) {
        let texts: Vec<String> = batch.iter().map(|c| c.chunk.text.clone()).collect();
        let vectors = embedder.embed_batch(&texts).await?;
        if vectors.len() != batch.len() {
            return Err(Error::embedding(format!(
                "provider returned {} vectors for {} inputs",
                vectors.len(),
                batch.len()
            )));
        }
        for (chunk, vector) in batch.iter().cloned().zip(vectors) {
            embedded.push(EmbeddedChunk { chunk, vector });
        }
    }

    let dimensions = embedded.first().map(|c| c.vector.len()).unwrap_or(0);
    store.add_log(
        job_id,
        StageName::Embed,
        LogLevel::Info,
        format!(
            "{prefix} Generated {} vectors ({} dimensions)",
            embedded.len(),
            dimensions
        ),
    )?;
    store.set_stage_output(
        job_id,
        StageName::Embed,
        json!({
            "vectorCount": embedded.len(),
            "dimensions": dimensions,
            "provider": embedder.name(),
            "model": embedder.model(),
        }),
    )?;
    Ok(embedded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::TextChunk;
    use crate::keys::ApiKeyStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        batches: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|_| vec![0.5f32; 4]).collect())
        }

        fn name(&self) -> &str {
            "stub"
        }

        fn model(&self) -> &str {
            "stub-model"
        }
    }

    fn extracted(n: usize) -> Vec<ExtractedChunk> {
        (0..n)
            .map(|index| ExtractedChunk {
                chunk: TextChunk {
                    index,
                    text: format!("chunk {index}"),
                    start_char: 0,
                    end_char: 7,
                },
                entities: None,
                entity_tags: Vec::new(),
            })
            .collect()
    }

    #[tokio::test]
    async fn batches_of_twenty() {
        let store = Arc::new(JobStore::new(None, None, Arc::new(ApiKeyStore::new(None))));
        let job = store.create_job(Vec::new(), Default::default());
        let embedder = Arc::new(CountingEmbedder {
            batches: AtomicUsize::new(0),
        });
        let dyn_embedder: Arc<dyn EmbeddingProvider> = embedder.clone();

        let out = run_embed(&store, job.id, &dyn_embedder, extracted(45), 0, 1)
            .await
            .unwrap();
        assert_eq!(out.len(), 45);
        assert_eq!(embedder.batches.load(Ordering::SeqCst), 3);
        assert_eq!(out[0].vector.len(), 4);

        let loaded = store.get_job(job.id).unwrap();
        let output = loaded.stage(StageName::Embed).unwrap().output.clone().unwrap();
        assert_eq!(output["vectorCount"], json!(45));
        assert_eq!(output["dimensions"], json!(4));
    }
}
