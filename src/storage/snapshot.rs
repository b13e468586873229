//! Per-job JSON snapshot files
//!
//! Best-effort durable copies of job state under the data directory, written
//! on every mutation via tmp-file-plus-rename so readers never observe a
//! partial write. These snapshots are what lets a process that did not run
//! the job observe its progress.

use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::Result;
use crate::pipeline::types::PipelineJob;

/// Snapshot directory handle
#[derive(Debug, Clone)]
pub struct JobSnapshots {
    dir: PathBuf,
}

impl JobSnapshots {
    /// Open (creating if needed) the snapshot directory
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn job_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Write the full job snapshot atomically
    pub fn write(&self, job: &PipelineJob) -> Result<()> {
        let path = self.job_path(job.id);
        let tmp = path.with_extension("json.tmp");
        let raw = serde_json::to_vec(job)?;
        if let Err(e) = fs::write(&tmp, raw).and_then(|_| fs::rename(&tmp, &path)) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    /// Read a job snapshot; any read or parse failure yields None
    pub fn read(&self, id: Uuid) -> Option<PipelineJob> {
        let raw = fs::read_to_string(self.job_path(id)).ok()?;
        serde_json::from_str(&raw).ok()
    }

    /// The directory snapshots live in
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{FileInfo, JobStatus, PipelineConfig, PipelineStage, StageName};

    fn sample_job() -> PipelineJob {
        PipelineJob {
            id: Uuid::new_v4(),
            status: JobStatus::Queued,
            files: vec![FileInfo {
                name: "report.pdf".into(),
                media_type: "application/pdf".into(),
                size: 1024,
            }],
            config: PipelineConfig::default(),
            stages: StageName::ALL.iter().map(|n| PipelineStage::new(*n)).collect(),
            created_at: 1_700_000_000_000,
            completed_at: None,
            error: None,
            current_file_index: 0,
        }
    }

    #[test]
    fn write_then_read_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let snapshots = JobSnapshots::open(tmp.path().join("jobs")).unwrap();

        let job = sample_job();
        snapshots.write(&job).unwrap();

        let loaded = snapshots.read(job.id).unwrap();
        assert_eq!(loaded.id, job.id);
        assert_eq!(loaded.stages.len(), 6);
        assert_eq!(loaded.files[0].name, "report.pdf");
    }

    #[test]
    fn missing_snapshot_reads_none() {
        let tmp = tempfile::tempdir().unwrap();
        let snapshots = JobSnapshots::open(tmp.path().join("jobs")).unwrap();
        assert!(snapshots.read(Uuid::new_v4()).is_none());
    }

    #[test]
    fn corrupt_snapshot_reads_none() {
        let tmp = tempfile::tempdir().unwrap();
        let snapshots = JobSnapshots::open(tmp.path().join("jobs")).unwrap();
        let id = Uuid::new_v4();
        std::fs::write(snapshots.dir().join(format!("{}.json", id)), b"{not json").unwrap();
        assert!(snapshots.read(id).is_none());
    }
}
