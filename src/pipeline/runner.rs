//! Pipeline runner: drives one job through all six stages per file
//!
//! Files run strictly in order. Between files, successful stages reset
//! to idle so the list reflects the file in flight, while logs keep
//! accumulating. The first stage failure fails the whole job and marks
//! every stage that never ran as skipped.

use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::Result;
use crate::pipeline::executor::run_stage;
use crate::pipeline::stages;
use crate::pipeline::store::JobStore;
use crate::pipeline::types::{FileInfo, JobStatus, StageName, StageStatus};
use crate::providers::{ChatProvider, EmbeddingProvider, OcrProvider, VectorStoreProvider};

/// One submitted file with its bytes
pub struct FileData {
    pub info: FileInfo,
    pub data: Vec<u8>,
}

pub struct PipelineRunner {
    store: Arc<JobStore>,
    ocr: Arc<dyn OcrProvider>,
    chat: Arc<dyn ChatProvider>,
    embedder: Arc<dyn EmbeddingProvider>,
    vectors: Option<Arc<dyn VectorStoreProvider>>,
}

impl PipelineRunner {
    pub fn new(
        store: Arc<JobStore>,
        ocr: Arc<dyn OcrProvider>,
        chat: Arc<dyn ChatProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
        vectors: Option<Arc<dyn VectorStoreProvider>>,
    ) -> Self {
        Self {
            store,
            ocr,
            chat,
            embedder,
            vectors,
        }
    }

    /// Detach the job onto the runtime and return immediately
    pub fn spawn(self: &Arc<Self>, job_id: Uuid, files: Vec<FileData>) {
        let runner = Arc::clone(self);
        tokio::spawn(async move {
            runner.run(job_id, files).await;
        });
    }

    /// Run the job to completion or first failure
    pub async fn run(&self, job_id: Uuid, files: Vec<FileData>) {
        info!(%job_id, file_count = files.len(), "pipeline started");
        if let Err(err) = self
            .store
            .update_job_status(job_id, JobStatus::Running, None)
        {
            error!(%job_id, error = %err, "failed to start pipeline");
            return;
        }

        let total = files.len();
        for (index, file) in files.into_iter().enumerate() {
            if self.store.set_current_file_index(job_id, index).is_err() {
                error!(%job_id, "job disappeared mid-run");
                return;
            }
            if index > 0 {
                self.reset_completed_stages(job_id);
            }

            if let Err(err) = self.process_file(job_id, &file, index, total).await {
                let message = err.to_string();
                info!(%job_id, file = %file.info.name, error = %message, "pipeline failed");
                let _ = self
                    .store
                    .update_job_status(job_id, JobStatus::Failed, Some(message));
                self.skip_pending_stages(job_id);
                return;
            }
        }

        let _ = self
            .store
            .update_job_status(job_id, JobStatus::Completed, None);
        info!(%job_id, "pipeline completed");
    }

    async fn process_file(
        &self,
        job_id: Uuid,
        file: &FileData,
        index: usize,
        total: usize,
    ) -> Result<()> {
        let job = self
            .store
            .get_job(job_id)
            .ok_or_else(|| crate::error::Error::JobNotFound(job_id.to_string()))?;
        let config = job.config.clone();

        run_stage(&self.store, job_id, StageName::Upload, async {
            stages::run_upload(&self.store, job_id, &file.info, index, total).await
        })
        .await?;

        let text = run_stage(&self.store, job_id, StageName::Ocr, async {
            stages::run_ocr(
                &self.store,
                job_id,
                &self.ocr,
                &file.info,
                &file.data,
                index,
                total,
            )
            .await
        })
        .await?;

        let chunks = run_stage(&self.store, job_id, StageName::Chunk, async {
            stages::run_chunk(&self.store, job_id, &config, &text, index, total).await
        })
        .await?;

        let extracted = run_stage(&self.store, job_id, StageName::Extract, async {
            stages::run_extract(
                &self.store,
                job_id,
                &self.chat,
                &config,
                chunks,
                index,
                total,
            )
            .await
        })
        .await?;

        let embedded = run_stage(&self.store, job_id, StageName::Embed, async {
            stages::run_embed(&self.store, job_id, &self.embedder, extracted, index, total).await
        })
        .await?;

        run_stage(&self.store, job_id, StageName::Store, async {
            stages::run_store(
                &self.store,
                &job,
                self.vectors.as_ref(),
                &self.embedder,
                &file.info,
                embedded,
                index,
                total,
            )
            .await
        })
        .await?;

        Ok(())
    }

    /// Between files, return last file's successes to idle
    fn reset_completed_stages(&self, job_id: Uuid) {
        if let Some(job) = self.store.get_job(job_id) {
            for stage in &job.stages {
                if stage.status == StageStatus::Success {
                    let _ = self.store.reset_stage(job_id, stage.name);
                }
            }
        }
    }

    /// After a failure, mark stages that never started as skipped
    fn skip_pending_stages(&self, job_id: Uuid) {
        if let Some(job) = self.store.get_job(job_id) {
            for stage in &job.stages {
                if stage.status == StageStatus::Idle {
                    let _ = self.store.skip_stage(job_id, stage.name);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::keys::ApiKeyStore;
    use crate::pipeline::types::{LogLevel, PipelineConfig};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingOcr {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl OcrProvider for CountingOcr {
        async fn extract_text(&self, _: &str, _: &str, data: &[u8]) -> crate::error::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(String::from_utf8_lossy(data).into_owned())
        }
    }

    struct NoChat;

    #[async_trait]
    impl ChatProvider for NoChat {
        async fn complete(&self, _: &str, _: &str) -> crate::error::Result<String> {
            Err(Error::llm("chat disabled in tests"))
        }
    }

    struct StubEmbedder {
        fail_on_call: Option<usize>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for StubEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> crate::error::Result<Vec<Vec<f32>>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if Some(call) == self.fail_on_call {
                return Err(Error::embedding("connection refused"));
            }
            Ok(texts.iter().map(|_| vec![0.1f32; 4]).collect())
        }
        fn name(&self) -> &str {
            "stub"
        }
        fn model(&self) -> &str {
            "stub-model"
        }
    }

    fn file(name: &str, body: &str) -> FileData {
        FileData {
            info: FileInfo {
                name: name.into(),
                media_type: "text/plain".into(),
                size: body.len() as u64,
            },
            data: body.as_bytes().to_vec(),
        }
    }

    // pdf media type routes the file through the ocr provider
    fn pdf(name: &str, body: &str) -> FileData {
        FileData {
            info: FileInfo {
                name: name.into(),
                media_type: "application/pdf".into(),
                size: body.len() as u64,
            },
            data: body.as_bytes().to_vec(),
        }
    }

    fn runner_with(
        embedder: Arc<StubEmbedder>,
        ocr: Arc<CountingOcr>,
    ) -> (Arc<JobStore>, PipelineRunner) {
        let store = Arc::new(JobStore::new(None, None, Arc::new(ApiKeyStore::new(None))));
        let runner = PipelineRunner::new(
            Arc::clone(&store),
            ocr,
            Arc::new(NoChat),
            embedder,
            None,
        );
        (store, runner)
    }

    #[tokio::test]
    async fn single_file_runs_to_completion() {
        let embedder = Arc::new(StubEmbedder {
            fail_on_call: None,
            calls: AtomicUsize::new(0),
        });
        let ocr = Arc::new(CountingOcr {
            calls: AtomicUsize::new(0),
        });
        let (store, runner) = runner_with(embedder, ocr);

        let files = vec![file("a.txt", "One sentence. Another sentence here.")];
        let infos: Vec<FileInfo> = files.iter().map(|f| f.info.clone()).collect();
        let job = store.create_job(infos, PipelineConfig::default());

        runner.run(job.id, files).await;

        let loaded = store.get_job(job.id).unwrap();
        assert_eq!(loaded.status, JobStatus::Completed);
        assert!(loaded.completed_at.is_some());
        assert!(loaded.error.is_none());
        assert!(loaded
            .stages
            .iter()
            .all(|s| s.status == StageStatus::Success));
    }

    #[tokio::test]
    async fn multi_file_failure_shape() {
        // three files; the embedder fails on its second call, i.e. file 2
        let embedder = Arc::new(StubEmbedder {
            fail_on_call: Some(1),
            calls: AtomicUsize::new(0),
        });
        let ocr = Arc::new(CountingOcr {
            calls: AtomicUsize::new(0),
        });
        let (store, runner) = runner_with(embedder, Arc::clone(&ocr));

        let files = vec![
            pdf("one.pdf", "First file text."),
            pdf("two.pdf", "Second file text."),
            pdf("three.pdf", "Third file text."),
        ];
        let infos: Vec<FileInfo> = files.iter().map(|f| f.info.clone()).collect();
        let job = store.create_job(infos, PipelineConfig::default());

        runner.run(job.id, files).await;

        let loaded = store.get_job(job.id).unwrap();
        assert_eq!(loaded.status, JobStatus::Failed);
        assert_eq!(loaded.current_file_index, 1);
        assert!(loaded.completed_at.is_some());
        assert!(loaded
            .error
            .as_deref()
            .unwrap()
            .contains("connection refused"));

        // first four stages succeeded for file 2, embed failed, store skipped
        for name in [
            StageName::Upload,
            StageName::Ocr,
            StageName::Chunk,
            StageName::Extract,
        ] {
            assert_eq!(
                loaded.stage(name).unwrap().status,
                StageStatus::Success,
                "{name:?}"
            );
        }
        assert_eq!(loaded.stage(StageName::Embed).unwrap().status, StageStatus::Error);
        assert_eq!(loaded.stage(StageName::Store).unwrap().status, StageStatus::Skipped);

        // the third file never entered the pipeline
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 2);

        // logs from both processed files survive the stage resets
        let upload_logs = &loaded.stage(StageName::Upload).unwrap().logs;
        assert!(upload_logs.iter().any(|l| l.message.contains("[1/3]")));
        assert!(upload_logs.iter().any(|l| l.message.contains("[2/3]")));
        assert!(!upload_logs.iter().any(|l| l.message.contains("[3/3]")));
        let embed_stage = loaded.stage(StageName::Embed).unwrap();
        assert!(embed_stage
            .logs
            .iter()
            .any(|l| l.level == LogLevel::Error && l.message.starts_with("Error: ")));
    }

    #[tokio::test]
    async fn validation_failure_skips_everything_downstream() {
        let embedder = Arc::new(StubEmbedder {
            fail_on_call: None,
            calls: AtomicUsize::new(0),
        });
        let ocr = Arc::new(CountingOcr {
            calls: AtomicUsize::new(0),
        });
        let (store, runner) = runner_with(embedder, Arc::clone(&ocr));

        let bad = FileData {
            info: FileInfo {
                name: "tool.exe".into(),
                media_type: "application/octet-stream".into(),
                size: 10,
            },
            data: vec![0u8; 10],
        };
        let job = store.create_job(vec![bad.info.clone()], PipelineConfig::default());
        runner.run(job.id, vec![bad]).await;

        let loaded = store.get_job(job.id).unwrap();
        assert_eq!(loaded.status, JobStatus::Failed);
        assert_eq!(loaded.stage(StageName::Upload).unwrap().status, StageStatus::Error);
        for name in [
            StageName::Ocr,
            StageName::Chunk,
            StageName::Extract,
            StageName::Embed,
            StageName::Store,
        ] {
            assert_eq!(loaded.stage(name).unwrap().status, StageStatus::Skipped);
        }
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 0);
    }
}
