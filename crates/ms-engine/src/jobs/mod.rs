//! Durable job execution: the single-worker runner and its handlers.

pub mod handlers;
pub mod runner;

use ms_core::events::EventPayload;
use ms_core::{JobPayload, Result};
use ms_db::models::Job;
use rusqlite::Connection;

use crate::context::EngineContext;

/// Enqueue a job unless an equivalent one is pending, announcing it on the
/// event bus. Does not signal the runner; callers batch that.
pub fn enqueue(ctx: &EngineContext, conn: &Connection, payload: &JobPayload) -> Result<Option<Job>> {
    let job = ms_db::queries::jobs::enqueue_unique(conn, payload)?;
    match &job {
        Some(job) => announce(ctx, job, payload),
        None => tracing::debug!(
            job_type = %payload.job_type(),
            subject = %payload.subject_id(),
            "job already pending; skipped"
        ),
    }
    Ok(job)
}

/// Broadcast `JobQueued` for jobs created elsewhere.
pub fn announce_all(ctx: &EngineContext, created: &[Job]) {
    for job in created {
        if let Ok(job_type) = job.kind() {
            ctx.event_bus.publish(EventPayload::JobQueued {
                job_id: job.id,
                job_type,
            });
        }
    }
}

fn announce(ctx: &EngineContext, job: &Job, payload: &JobPayload) {
    tracing::debug!(job_id = %job.id, job_type = %payload.job_type(), "job queued");
    ctx.event_bus.publish(EventPayload::JobQueued {
        job_id: job.id,
        job_type: payload.job_type(),
    });
}
