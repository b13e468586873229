//! Stage execution wrapper
//!
//! Centralizes the running/success/error bookkeeping so stage bodies
//! only deal with their own work.

use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;
use crate::pipeline::store::JobStore;
use crate::pipeline::types::{LogLevel, StageName};

/// Run one stage body, recording the transition on the job. On failure
/// the error is logged onto the stage, the stage is marked failed, and
/// the error propagates so the runner can stop the pipeline.
pub async fn run_stage<T, F>(
    store: &Arc<JobStore>,
    job_id: Uuid,
    stage: StageName,
    body: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    store.begin_stage(job_id, stage)?;
    match body.await {
        Ok(value) => {
            store.complete_stage(job_id, stage)?;
            Ok(value)
        }
        Err(err) => {
            let message = err.to_string();
            store.add_log(job_id, stage, LogLevel::Error, format!("Error: {message}"))?;
            store.fail_stage(job_id, stage, &message)?;
            Err(err)
        }
    }
}
