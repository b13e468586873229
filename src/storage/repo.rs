//! Optional SQLite durable store for jobs, collections, and API keys
//!
//! Rows hold the full record as JSON next to a few indexed columns, so the
//! schema never chases the wire types. All writes from the store's notify
//! path are fire-and-forget; failures here must never affect in-memory
//! state.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use uuid::Uuid;

use crate::error::Result;
use crate::keys::ApiKey;
use crate::pipeline::types::{CollectionInfo, PipelineJob};

/// SQLite-backed repository
pub struct JobRepo {
    conn: Mutex<Connection>,
}

impl JobRepo {
    /// Open (creating if needed) the database and its tables
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS pipeline_jobs (
                id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                created_at_ms INTEGER NOT NULL,
                updated_at_ms INTEGER NOT NULL,
                job_json TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                updated_at_ms INTEGER NOT NULL,
                collection_json TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS api_keys (
                id TEXT PRIMARY KEY,
                api_key TEXT NOT NULL UNIQUE,
                collection_name TEXT NOT NULL UNIQUE,
                key_json TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert or replace a job row
    pub fn upsert_job(&self, job: &PipelineJob) -> Result<()> {
        let json = serde_json::to_string(job)?;
        let now = crate::pipeline::types::now_ms();
        self.conn.lock().execute(
            "INSERT INTO pipeline_jobs (id, status, created_at_ms, updated_at_ms, job_json)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
               status = excluded.status,
               updated_at_ms = excluded.updated_at_ms,
               job_json = excluded.job_json",
            params![
                job.id.to_string(),
                serde_json::to_string(&job.status)?.trim_matches('"'),
                job.created_at,
                now,
                json
            ],
        )?;
        Ok(())
    }

    /// Fetch one job by id
    pub fn get_job(&self, id: Uuid) -> Result<Option<PipelineJob>> {
        let conn = self.conn.lock();
        let raw: Option<String> = conn
            .query_row(
                "SELECT job_json FROM pipeline_jobs WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(raw.and_then(|json| serde_json::from_str(&json).ok()))
    }

    /// List jobs, newest first
    pub fn list_jobs(&self, limit: usize) -> Result<Vec<PipelineJob>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT job_json FROM pipeline_jobs ORDER BY created_at_ms DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit.clamp(1, 500) as i64], |row| {
            row.get::<_, String>(0)
        })?;
        let mut jobs = Vec::new();
        for row in rows {
            if let Ok(job) = serde_json::from_str(&row?) {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    /// Insert or replace a collection row
    pub fn upsert_collection(&self, info: &CollectionInfo) -> Result<()> {
        let json = serde_json::to_string(info)?;
        self.conn.lock().execute(
            "INSERT INTO collections (name, updated_at_ms, collection_json)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET
               updated_at_ms = excluded.updated_at_ms,
               collection_json = excluded.collection_json",
            params![info.name, info.last_updated, json],
        )?;
        Ok(())
    }

    /// Fetch one collection by name
    pub fn get_collection(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let conn = self.conn.lock();
        let raw: Option<String> = conn
            .query_row(
                "SELECT collection_json FROM collections WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(raw.and_then(|json| serde_json::from_str(&json).ok()))
    }

    /// List collections, most recently updated first
    pub fn list_collections(&self, limit: usize) -> Result<Vec<CollectionInfo>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT collection_json FROM collections ORDER BY updated_at_ms DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit.clamp(1, 500) as i64], |row| {
            row.get::<_, String>(0)
        })?;
        let mut collections = Vec::new();
        for row in rows {
            if let Ok(info) = serde_json::from_str(&row?) {
                collections.push(info);
            }
        }
        Ok(collections)
    }

    /// Insert or replace an API key row
    pub fn upsert_key(&self, key: &ApiKey) -> Result<()> {
        let json = serde_json::to_string(key)?;
        self.conn.lock().execute(
            "INSERT INTO api_keys (id, api_key, collection_name, key_json)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
               api_key = excluded.api_key,
               collection_name = excluded.collection_name,
               key_json = excluded.key_json",
            params![key.id.to_string(), key.key, key.collection_name, json],
        )?;
        Ok(())
    }

    /// Fetch the key provisioned for a collection
    pub fn key_for_collection(&self, collection_name: &str) -> Result<Option<ApiKey>> {
        let conn = self.conn.lock();
        let raw: Option<String> = conn
            .query_row(
                "SELECT key_json FROM api_keys WHERE collection_name = ?1",
                params![collection_name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(raw.and_then(|json| serde_json::from_str(&json).ok()))
    }

    /// Fetch a key by its secret value
    pub fn find_key(&self, api_key: &str) -> Result<Option<ApiKey>> {
        let conn = self.conn.lock();
        let raw: Option<String> = conn
            .query_row(
                "SELECT key_json FROM api_keys WHERE api_key = ?1",
                params![api_key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(raw.and_then(|json| serde_json::from_str(&json).ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{JobStatus, PipelineConfig, PipelineStage, StageName};

    fn open_repo() -> (tempfile::TempDir, JobRepo) {
        let tmp = tempfile::tempdir().unwrap();
        let repo = JobRepo::open(&tmp.path().join("docpipe.db")).unwrap();
        (tmp, repo)
    }

    fn sample_job() -> PipelineJob {
        PipelineJob {
            id: Uuid::new_v4(),
            status: JobStatus::Running,
            files: Vec::new(),
            config: PipelineConfig::default(),
            stages: StageName::ALL.iter().map(|n| PipelineStage::new(*n)).collect(),
            created_at: 1_700_000_000_000,
            completed_at: None,
            error: None,
            current_file_index: 0,
        }
    }

    #[test]
    fn job_upsert_and_fetch() {
        let (_tmp, repo) = open_repo();
        let mut job = sample_job();
        repo.upsert_job(&job).unwrap();

        job.status = JobStatus::Completed;
        job.completed_at = Some(1_700_000_001_000);
        repo.upsert_job(&job).unwrap();

        let loaded = repo.get_job(job.id).unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Completed);
        assert_eq!(loaded.completed_at, Some(1_700_000_001_000));
        assert!(repo.get_job(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn jobs_list_newest_first() {
        let (_tmp, repo) = open_repo();
        let mut older = sample_job();
        older.created_at = 100;
        let mut newer = sample_job();
        newer.created_at = 200;
        repo.upsert_job(&older).unwrap();
        repo.upsert_job(&newer).unwrap();

        let jobs = repo.list_jobs(10).unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].id, newer.id);
    }

    #[test]
    fn collection_round_trip() {
        let (_tmp, repo) = open_repo();
        let info = CollectionInfo {
            name: "col_test".into(),
            embedding_provider: "ollama".into(),
            embedding_model: "bge-m3".into(),
            dimensions: 1024,
            document_count: 1,
            vector_count: 42,
            created_at: 1,
            last_updated: 2,
            pipeline_ids: vec![Uuid::new_v4()],
            entity_types: vec!["Person".into()],
        };
        repo.upsert_collection(&info).unwrap();
        let loaded = repo.get_collection("col_test").unwrap().unwrap();
        assert_eq!(loaded.vector_count, 42);
        assert_eq!(repo.list_collections(10).unwrap().len(), 1);
    }
}
