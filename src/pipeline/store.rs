//! Authoritative in-memory job store with dual-write persistence
//!
//! All reads and writes go through the in-memory maps; snapshot and
//! database writes ride along on every mutation and are strictly
//! best-effort. A persistence failure is logged and swallowed, never
//! surfaced to the pipeline.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::keys::ApiKeyStore;
use crate::pipeline::types::{
    now_ms, CollectionInfo, FileInfo, JobStatus, LogLevel, PipelineConfig, PipelineJob,
    PipelineStage, StageLog, StageName, StageStatus,
};
use crate::storage::{JobRepo, JobSnapshots};

type Listener = mpsc::UnboundedSender<PipelineJob>;

/// Shared store for pipeline jobs, collections, and their API keys
pub struct JobStore {
    jobs: DashMap<Uuid, PipelineJob>,
    collections: DashMap<String, CollectionInfo>,
    listeners: RwLock<HashMap<u64, (Uuid, Listener)>>,
    next_listener_id: AtomicU64,
    snapshots: Option<JobSnapshots>,
    repo: Option<Arc<JobRepo>>,
    keys: Arc<ApiKeyStore>,
}

impl JobStore {
    pub fn new(
        snapshots: Option<JobSnapshots>,
        repo: Option<Arc<JobRepo>>,
        keys: Arc<ApiKeyStore>,
    ) -> Self {
        let store = Self {
            jobs: DashMap::new(),
            collections: DashMap::new(),
            listeners: RwLock::new(HashMap::new()),
            next_listener_id: AtomicU64::new(1),
            snapshots,
            repo: repo.clone(),
            keys,
        };
        if let Some(repo) = &repo {
            match repo.list_collections(500) {
                Ok(collections) => {
                    for info in collections {
                        store.collections.insert(info.name.clone(), info);
                    }
                }
                Err(err) => warn!(error = %err, "failed to load collections from database"),
            }
        }
        store
    }

    pub fn keys(&self) -> &Arc<ApiKeyStore> {
        &self.keys
    }

    /// Create a new queued job with every stage idle
    pub fn create_job(&self, files: Vec<FileInfo>, config: PipelineConfig) -> PipelineJob {
        let job = PipelineJob {
            id: Uuid::new_v4(),
            status: JobStatus::Queued,
            files,
            config,
            stages: StageName::ALL
                .iter()
                .map(|name| PipelineStage::new(*name))
                .collect(),
            created_at: now_ms(),
            completed_at: None,
            error: None,
            current_file_index: 0,
        };
        self.jobs.insert(job.id, job.clone());
        self.notify(&job);
        job
    }

    /// Insert a job constructed elsewhere, e.g. recovered from disk
    pub fn import_job(&self, job: PipelineJob) {
        self.jobs.insert(job.id, job);
    }

    /// Copy of the in-memory job
    pub fn get_job(&self, id: Uuid) -> Option<PipelineJob> {
        self.jobs.get(&id).map(|j| j.clone())
    }

    /// Reload the job from its snapshot if one exists, replacing the
    /// in-memory copy; otherwise fall back to the in-memory job.
    pub fn get_job_refresh(&self, id: Uuid) -> Option<PipelineJob> {
        if let Some(snapshots) = &self.snapshots {
            if let Some(job) = snapshots.read(id) {
                self.jobs.insert(id, job.clone());
                return Some(job);
            }
        }
        self.get_job(id)
    }

    /// All jobs, newest first
    pub fn list_jobs(&self) -> Vec<PipelineJob> {
        let mut jobs: Vec<PipelineJob> = self.jobs.iter().map(|j| j.clone()).collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    /// Transition the job's overall status. Entering a terminal status
    /// stamps completedAt; a failure message is recorded verbatim.
    pub fn update_job_status(
        &self,
        id: Uuid,
        status: JobStatus,
        error: Option<String>,
    ) -> Result<()> {
        self.mutate(id, |job| {
            job.status = status;
            if status.is_terminal() {
                job.completed_at = Some(now_ms());
            }
            if let Some(message) = error {
                job.error = Some(message);
            }
        })
    }

    pub fn set_current_file_index(&self, id: Uuid, index: usize) -> Result<()> {
        self.mutate(id, |job| job.current_file_index = index)
    }

    /// Mark a stage running and stamp its start time
    pub fn begin_stage(&self, id: Uuid, stage: StageName) -> Result<()> {
        self.mutate(id, |job| {
            if let Some(s) = job.stage_mut(stage) {
                s.status = StageStatus::Running;
                s.started_at = Some(now_ms());
                s.completed_at = None;
                s.error = None;
            }
        })
    }

    /// Mark a stage successful
    pub fn complete_stage(&self, id: Uuid, stage: StageName) -> Result<()> {
        self.mutate(id, |job| {
            if let Some(s) = job.stage_mut(stage) {
                s.status = StageStatus::Success;
                s.completed_at = Some(now_ms());
            }
        })
    }

    /// Mark a stage failed with its error message
    pub fn fail_stage(&self, id: Uuid, stage: StageName, message: &str) -> Result<()> {
        self.mutate(id, |job| {
            if let Some(s) = job.stage_mut(stage) {
                s.status = StageStatus::Error;
                s.completed_at = Some(now_ms());
                s.error = Some(message.to_string());
            }
        })
    }

    /// Return a successful stage to idle for the next file. Logs are
    /// preserved; timestamps, output, and error clear.
    pub fn reset_stage(&self, id: Uuid, stage: StageName) -> Result<()> {
        self.mutate(id, |job| {
            if let Some(s) = job.stage_mut(stage) {
                s.status = StageStatus::Idle;
                s.started_at = None;
                s.completed_at = None;
                s.output = None;
                s.error = None;
            }
        })
    }

    /// Mark a never-started stage skipped after an upstream failure
    pub fn skip_stage(&self, id: Uuid, stage: StageName) -> Result<()> {
        self.mutate(id, |job| {
            if let Some(s) = job.stage_mut(stage) {
                s.status = StageStatus::Skipped;
            }
        })
    }

    /// Attach structured output to a stage
    pub fn set_stage_output(&self, id: Uuid, stage: StageName, output: serde_json::Value) -> Result<()> {
        self.mutate(id, |job| {
            if let Some(s) = job.stage_mut(stage) {
                s.output = Some(output);
            }
        })
    }

    /// Append a log line to a stage. Logs only ever grow.
    pub fn add_log(&self, id: Uuid, stage: StageName, level: LogLevel, message: impl Into<String>) -> Result<()> {
        let message = message.into();
        self.mutate(id, |job| {
            if let Some(s) = job.stage_mut(stage) {
                s.logs.push(StageLog {
                    timestamp: now_ms(),
                    message: message.clone(),
                    level,
                });
            }
        })
    }

    fn mutate(&self, id: Uuid, f: impl FnOnce(&mut PipelineJob)) -> Result<()> {
        let snapshot = {
            let mut entry = self
                .jobs
                .get_mut(&id)
                .ok_or_else(|| Error::JobNotFound(id.to_string()))?;
            f(entry.value_mut());
            entry.value().clone()
        };
        self.notify(&snapshot);
        Ok(())
    }

    /// Register a collection after a successful store stage. Creates
    /// the record (and its API key) on first sight; subsequent calls
    /// accumulate counts and pipeline ids.
    pub fn register_collection(
        &self,
        job: &PipelineJob,
        name: &str,
        dimensions: usize,
        vectors_added: u64,
        provider: &str,
        model: &str,
    ) {
        let now = now_ms();
        let mut entry = self
            .collections
            .entry(name.to_string())
            .or_insert_with(|| CollectionInfo {
                name: name.to_string(),
                embedding_provider: provider.to_string(),
                embedding_model: model.to_string(),
                dimensions,
                document_count: 0,
                vector_count: 0,
                created_at: now,
                last_updated: now,
                pipeline_ids: Vec::new(),
                entity_types: Vec::new(),
            });
        let info = entry.value_mut();
        // called once per stored file, so one document per call
        info.document_count += 1;
        info.vector_count += vectors_added;
        info.last_updated = now;
        if !info.pipeline_ids.contains(&job.id) {
            info.pipeline_ids.push(job.id);
        }
        if !job.config.entity_types.is_empty() {
            info.entity_types = job.config.entity_types.clone();
        }
        let info = info.clone();
        drop(entry);

        let prompt = job.config.system_prompt.trim();
        self.keys
            .ensure_key_for_collection(name, (!prompt.is_empty()).then_some(prompt));

        if let Some(repo) = &self.repo {
            if let Err(err) = repo.upsert_collection(&info) {
                warn!(error = %err, collection = name, "failed to persist collection");
            }
        }
    }

    pub fn get_collection(&self, name: &str) -> Option<CollectionInfo> {
        self.collections.get(name).map(|c| c.clone())
    }

    /// All collections, most recently updated first
    pub fn list_collections(&self) -> Vec<CollectionInfo> {
        let mut collections: Vec<CollectionInfo> =
            self.collections.iter().map(|c| c.clone()).collect();
        collections.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        collections
    }

    /// Subscribe to live updates for one job. The returned id
    /// unregisters via [`unsubscribe`](Self::unsubscribe).
    pub fn subscribe(&self, job_id: Uuid) -> (u64, mpsc::UnboundedReceiver<PipelineJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().insert(id, (job_id, tx));
        (id, rx)
    }

    pub fn unsubscribe(&self, listener_id: u64) {
        self.listeners.write().remove(&listener_id);
    }

    /// Fan the updated job out to persistence and listeners. Every
    /// branch here is best-effort by construction.
    fn notify(&self, job: &PipelineJob) {
        if let Some(snapshots) = &self.snapshots {
            if let Err(err) = snapshots.write(job) {
                warn!(error = %err, job_id = %job.id, "failed to write job snapshot");
            }
        }

        if let Some(repo) = &self.repo {
            // repo writes hit the filesystem; keep them off the caller's
            // path when a runtime is available
            let repo = Arc::clone(repo);
            let job_for_db = job.clone();
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let result =
                        tokio::task::spawn_blocking(move || repo.upsert_job(&job_for_db)).await;
                    match result {
                        Ok(Err(err)) => {
                            warn!(error = %err, "failed to persist job to database")
                        }
                        Err(err) => warn!(error = %err, "job persistence task panicked"),
                        Ok(Ok(())) => {}
                    }
                });
            } else if let Err(err) = repo.upsert_job(&job_for_db) {
                warn!(error = %err, "failed to persist job to database");
            }
        }

        let mut dead = Vec::new();
        {
            let listeners = self.listeners.read();
            for (id, (job_id, tx)) in listeners.iter() {
                if *job_id != job.id {
                    continue;
                }
                if tx.send(job.clone()).is_err() {
                    dead.push(*id);
                }
            }
        }
        if !dead.is_empty() {
            let mut listeners = self.listeners.write();
            for id in dead {
                listeners.remove(&id);
            }
            debug!(job_id = %job.id, "dropped closed listeners");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> JobStore {
        JobStore::new(None, None, Arc::new(ApiKeyStore::new(None)))
    }

    fn file(name: &str) -> FileInfo {
        FileInfo {
            name: name.to_string(),
            media_type: "text/plain".to_string(),
            size: 10,
        }
    }

    #[test]
    fn new_job_has_six_idle_stages() {
        let store = store();
        let job = store.create_job(vec![file("a.txt")], PipelineConfig::default());
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.stages.len(), 6);
        assert!(job.stages.iter().all(|s| s.status == StageStatus::Idle));
        assert_eq!(job.current_file_index, 0);
        assert!(job.completed_at.is_none());
    }

    #[test]
    fn terminal_status_stamps_completed_at() {
        let store = store();
        let job = store.create_job(vec![file("a.txt")], PipelineConfig::default());

        store.update_job_status(job.id, JobStatus::Running, None).unwrap();
        assert!(store.get_job(job.id).unwrap().completed_at.is_none());

        store
            .update_job_status(job.id, JobStatus::Failed, Some("embed: boom".into()))
            .unwrap();
        let loaded = store.get_job(job.id).unwrap();
        assert!(loaded.completed_at.is_some());
        assert_eq!(loaded.error.as_deref(), Some("embed: boom"));
    }

    #[test]
    fn reset_preserves_logs() {
        let store = store();
        let job = store.create_job(vec![file("a.txt"), file("b.txt")], PipelineConfig::default());

        store.begin_stage(job.id, StageName::Ocr).unwrap();
        store
            .add_log(job.id, StageName::Ocr, LogLevel::Info, "[1/2] extracted")
            .unwrap();
        store
            .set_stage_output(job.id, StageName::Ocr, serde_json::json!({ "charCount": 42 }))
            .unwrap();
        store.complete_stage(job.id, StageName::Ocr).unwrap();
        store.reset_stage(job.id, StageName::Ocr).unwrap();

        let loaded = store.get_job(job.id).unwrap();
        let stage = loaded.stage(StageName::Ocr).unwrap();
        assert_eq!(stage.status, StageStatus::Idle);
        assert!(stage.started_at.is_none());
        assert!(stage.completed_at.is_none());
        assert!(stage.output.is_none());
        assert_eq!(stage.logs.len(), 1);

        store.begin_stage(job.id, StageName::Ocr).unwrap();
        store
            .add_log(job.id, StageName::Ocr, LogLevel::Info, "[2/2] extracted")
            .unwrap();
        let loaded = store.get_job(job.id).unwrap();
        assert_eq!(loaded.stage(StageName::Ocr).unwrap().logs.len(), 2);
    }

    #[test]
    fn fail_and_skip_shape() {
        let store = store();
        let job = store.create_job(vec![file("a.txt")], PipelineConfig::default());

        for stage in [StageName::Upload, StageName::Ocr] {
            store.begin_stage(job.id, stage).unwrap();
            store.complete_stage(job.id, stage).unwrap();
        }
        store.begin_stage(job.id, StageName::Chunk).unwrap();
        store.fail_stage(job.id, StageName::Chunk, "no text").unwrap();
        for stage in [StageName::Extract, StageName::Embed, StageName::Store] {
            store.skip_stage(job.id, stage).unwrap();
        }

        let loaded = store.get_job(job.id).unwrap();
        let statuses: Vec<StageStatus> = loaded.stages.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![
                StageStatus::Success,
                StageStatus::Success,
                StageStatus::Error,
                StageStatus::Skipped,
                StageStatus::Skipped,
                StageStatus::Skipped,
            ]
        );
        assert_eq!(
            loaded.stage(StageName::Chunk).unwrap().error.as_deref(),
            Some("no text")
        );
    }

    #[test]
    fn snapshot_written_on_every_mutation() {
        let tmp = tempfile::tempdir().unwrap();
        let snapshots = JobSnapshots::open(tmp.path()).unwrap();
        let store = JobStore::new(Some(snapshots), None, Arc::new(ApiKeyStore::new(None)));

        let job = store.create_job(vec![file("a.txt")], PipelineConfig::default());
        store.update_job_status(job.id, JobStatus::Running, None).unwrap();

        let reread = JobSnapshots::open(tmp.path()).unwrap().read(job.id).unwrap();
        assert_eq!(reread.status, JobStatus::Running);
    }

    #[test]
    fn refresh_prefers_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JobStore::new(
            Some(JobSnapshots::open(tmp.path()).unwrap()),
            None,
            Arc::new(ApiKeyStore::new(None)),
        );
        let job = store.create_job(vec![file("a.txt")], PipelineConfig::default());

        // simulate another writer advancing the snapshot on disk
        let mut on_disk = store.get_job(job.id).unwrap();
        on_disk.status = JobStatus::Completed;
        JobSnapshots::open(tmp.path()).unwrap().write(&on_disk).unwrap();

        let refreshed = store.get_job_refresh(job.id).unwrap();
        assert_eq!(refreshed.status, JobStatus::Completed);
        // the reload replaced the in-memory copy too
        assert_eq!(store.get_job(job.id).unwrap().status, JobStatus::Completed);
    }

    #[test]
    fn refresh_falls_back_to_memory_without_snapshot() {
        let store = store();
        let job = store.create_job(vec![file("a.txt")], PipelineConfig::default());
        assert!(store.get_job_refresh(job.id).is_some());
    }

    #[tokio::test]
    async fn listeners_receive_deep_copies() {
        let store = store();
        let job = store.create_job(vec![file("a.txt")], PipelineConfig::default());
        let (id, mut rx) = store.subscribe(job.id);

        store.update_job_status(job.id, JobStatus::Running, None).unwrap();
        let mut seen = rx.recv().await.unwrap();
        assert_eq!(seen.status, JobStatus::Running);

        // mutating the delivered copy must not touch the store
        seen.status = JobStatus::Failed;
        assert_eq!(store.get_job(job.id).unwrap().status, JobStatus::Running);

        store.unsubscribe(id);
        store.update_job_status(job.id, JobStatus::Completed, None).unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn register_collection_counts_one_document_per_call() {
        let store = store();
        let mut config = PipelineConfig::default();
        config.collection_name = "col_docs".into();
        let job = store.create_job(vec![file("a.txt"), file("b.txt")], config.clone());
        // the store stage registers once per file
        store.register_collection(&job, "col_docs", 1024, 12, "ollama", "bge-m3");
        store.register_collection(&job, "col_docs", 1024, 8, "ollama", "bge-m3");
        assert_eq!(store.get_collection("col_docs").unwrap().document_count, 2);

        let job2 = store.create_job(vec![file("c.txt")], config);
        store.register_collection(&job2, "col_docs", 1024, 5, "ollama", "bge-m3");

        let info = store.get_collection("col_docs").unwrap();
        assert_eq!(info.document_count, 3);
        assert_eq!(info.vector_count, 25);
        assert_eq!(info.pipeline_ids.len(), 2);
        assert!(store.keys().key_for_collection("col_docs").is_some());
    }

    #[test]
    fn list_jobs_newest_first() {
        let store = store();
        let first = store.create_job(vec![file("a.txt")], PipelineConfig::default());
        // force distinct created_at ordering
        {
            let mut entry = store.jobs.get_mut(&first.id).unwrap();
            entry.value_mut().created_at -= 1000;
        }
        let second = store.create_job(vec![file("b.txt")], PipelineConfig::default());
        let jobs = store.list_jobs();
        assert_eq!(jobs[0].id, second.id);
        assert_eq!(jobs[1].id, first.id);
    }
}
