//! Live job progress over Server-Sent Events
//!
//! The stream polls the store every 500ms and only pushes when the
//! job's fingerprint changes, so idle jobs cost one comparison per
//! tick instead of a frame. After the job reaches a terminal status
//! one final update goes out, then the stream closes after a short
//! grace period so proxies flush the last frame.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;
use uuid::Uuid;

use crate::pipeline::types::{PipelineJob, StreamEvent};
use crate::server::state::AppState;

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// Compact change detector over the fields the UI renders
pub(crate) fn fingerprint(job: &PipelineJob) -> String {
    let stages: Vec<String> = job
        .stages
        .iter()
        .map(|s| {
            format!(
                "{:?}:{:?}:{}:{}",
                s.name,
                s.status,
                s.logs.len(),
                s.error.as_deref().unwrap_or("")
            )
        })
        .collect();
    format!(
        "{:?}:{}:{}:{}:{}",
        job.status,
        job.completed_at.unwrap_or(0),
        job.error.as_deref().unwrap_or(""),
        job.current_file_index,
        stages.join("|")
    )
}

fn sse_event(event: &StreamEvent) -> Event {
    match serde_json::to_string(event) {
        Ok(json) => Event::default().data(json),
        Err(_) => Event::default().data("{\"type\":\"error\",\"error\":\"serialization failed\"}"),
    }
}

/// Look the job up, falling back to the database for jobs evicted from
/// memory by a restart
pub(crate) async fn lookup_job(state: &AppState, job_id: Uuid) -> Option<PipelineJob> {
    if let Some(job) = state.store().get_job_refresh(job_id) {
        return Some(job);
    }
    let repo = Arc::clone(state.repo()?);
    let job = tokio::task::spawn_blocking(move || repo.get_job(job_id))
        .await
        .ok()?
        .ok()??;
    state.store().import_job(job.clone());
    Some(job)
}

pub async fn stream_job(
    state: AppState,
    job_id: Uuid,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(16);

    tokio::spawn(async move {
        let Some(mut job) = lookup_job(&state, job_id).await else {
            // consumers match this exact string
            let event = StreamEvent::Error {
                error: "Job not found".to_string(),
            };
            let _ = tx.send(Ok(sse_event(&event))).await;
            return;
        };

        let mut last_fingerprint = fingerprint(&job);
        if tx
            .send(Ok(sse_event(&StreamEvent::JobUpdate { job: job.clone() })))
            .await
            .is_err()
        {
            return;
        }
        if job.status.is_terminal() {
            tokio::time::sleep(CLOSE_GRACE).await;
            return;
        }

        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let Some(current) = state.store().get_job_refresh(job_id) else {
                debug!(%job_id, "job vanished during stream");
                return;
            };
            job = current;
            let current_fingerprint = fingerprint(&job);
            if current_fingerprint != last_fingerprint {
                last_fingerprint = current_fingerprint;
                if tx
                    .send(Ok(sse_event(&StreamEvent::JobUpdate { job: job.clone() })))
                    .await
                    .is_err()
                {
                    return;
                }
            }
            if job.status.is_terminal() {
                tokio::time::sleep(CLOSE_GRACE).await;
                return;
            }
        }
    });

    Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default())
}
