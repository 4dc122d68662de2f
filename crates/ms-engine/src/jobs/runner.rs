//! Single-worker job runner.
//!
//! The runner sleeps on a one-slot trigger channel. Each wake-up drains the
//! queue: claim the oldest `not_started` job, run its handler, record the
//! outcome, repeat until nothing is left. Triggers sent while a pass is
//! running collapse into the one buffered slot, so a burst of signals costs
//! at most one extra pass.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use ms_core::config::StaleJobPolicy;
use ms_core::events::EventPayload;
use ms_core::{Error, JobId, JobStatus, Result};
use ms_db::pool::{get_conn, DbPool};
use ms_db::queries::jobs;

use super::handlers;
use crate::context::EngineContext;

/// Sending half of the trigger channel.
#[derive(Debug, Clone)]
pub struct RunnerHandle {
    tx: mpsc::Sender<()>,
}

impl RunnerHandle {
    /// Ask the runner for a pass. Never blocks; redundant signals coalesce.
    pub fn signal(&self) {
        match self.tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Closed(())) => {
                tracing::debug!("job runner is not listening; signal dropped");
            }
        }
    }
}

/// Receiving half of the trigger channel, consumed by [`run`].
#[derive(Debug)]
pub struct RunnerTrigger {
    rx: mpsc::Receiver<()>,
}

#[cfg(test)]
impl RunnerTrigger {
    /// Consume a pending trigger, if any.
    pub(crate) fn try_recv(&mut self) -> bool {
        self.rx.try_recv().is_ok()
    }
}

/// Create a connected handle/trigger pair with a single buffered slot.
pub fn channel() -> (RunnerHandle, RunnerTrigger) {
    let (tx, rx) = mpsc::channel(1);
    (RunnerHandle { tx }, RunnerTrigger { rx })
}

/// What happened to one claimed job.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub job_id: JobId,
    pub status: JobStatus,
    pub error: Option<String>,
}

/// Totals for one or more drain passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    pub done: usize,
    pub failed: usize,
}

impl DrainSummary {
    pub fn total(&self) -> usize {
        self.done + self.failed
    }
}

/// Force jobs left `in_progress` by a previous process out of that state.
///
/// Must run before the runner starts claiming.
pub fn recover(db: &DbPool, policy: StaleJobPolicy) -> Result<usize> {
    let conn = get_conn(db)?;
    let recovered = jobs::recover_stale_jobs(&conn, policy)?;
    if recovered > 0 {
        tracing::warn!(count = recovered, ?policy, "recovered jobs interrupted by a previous shutdown");
    }
    Ok(recovered)
}

/// Run the trigger loop until `cancel` fires and return the number of
/// drain passes made.
///
/// A job that is executing when cancellation arrives runs to completion;
/// no further job is claimed afterwards.
pub async fn run(ctx: EngineContext, mut trigger: RunnerTrigger, cancel: CancellationToken) -> usize {
    tracing::info!("Job runner started");
    let mut passes = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            msg = trigger.rx.recv() => {
                if msg.is_none() {
                    break;
                }
                let summary = drain(&ctx, &cancel).await;
                passes += 1;
                if summary.total() > 0 {
                    tracing::info!(done = summary.done, failed = summary.failed, "job queue drained");
                }
            }
        }
    }

    tracing::info!(passes, "Job runner stopped");
    passes
}

/// Process jobs until the queue is empty or `cancel` fires.
pub async fn drain(ctx: &EngineContext, cancel: &CancellationToken) -> DrainSummary {
    let mut summary = DrainSummary::default();

    while !cancel.is_cancelled() {
        match process_next(ctx).await {
            Ok(Some(outcome)) => match outcome.status {
                JobStatus::Done => summary.done += 1,
                _ => summary.failed += 1,
            },
            Ok(None) => break,
            Err(e) => {
                // Store errors end the pass; the next trigger retries.
                tracing::error!("Job runner error: {e}");
                break;
            }
        }
    }

    summary
}

/// Claim and execute the oldest pending job.
///
/// Returns `Ok(None)` when the queue is empty. Handler failures are recorded
/// on the job and reported through the outcome, not as `Err`; `Err` means
/// the job store itself failed.
pub async fn process_next(ctx: &EngineContext) -> Result<Option<JobOutcome>> {
    let conn = get_conn(&ctx.db)?;
    let job = jobs::claim_next_job(&conn)?;
    drop(conn);

    let Some(job) = job else {
        return Ok(None);
    };

    let job_id = job.id;
    tracing::info!(job_id = %job_id, job_type = %job.job_type, "Processing job");
    ctx.event_bus.publish(EventPayload::JobStarted { job_id });

    // The payload is decoded once here; handlers only see the typed variant.
    let result = match job.decode_payload() {
        Ok(payload) => handlers::dispatch(ctx, payload).await,
        Err(e) => Err(Error::job(job_id, format!("undecodable job: {e}"))),
    };

    let conn = get_conn(&ctx.db)?;
    let outcome = match result {
        Ok(()) => {
            if !jobs::complete_job(&conn, job_id)? {
                return Err(left_in_progress(job_id));
            }
            tracing::info!(job_id = %job_id, "Job completed");
            ctx.event_bus.publish(EventPayload::JobCompleted { job_id });
            JobOutcome {
                job_id,
                status: JobStatus::Done,
                error: None,
            }
        }
        Err(e) => {
            let message = e.to_string();
            if !jobs::fail_job(&conn, job_id, &message)? {
                return Err(left_in_progress(job_id));
            }
            if e.is_not_found() {
                // The watcher removed the record after the job was queued.
                tracing::warn!(job_id = %job_id, job_type = %job.job_type, error = %message, "Job target vanished");
            } else {
                tracing::error!(job_id = %job_id, job_type = %job.job_type, error = %message, "Job failed");
            }
            ctx.event_bus.publish(EventPayload::JobFailed {
                job_id,
                error: message.clone(),
            });
            JobOutcome {
                job_id,
                status: JobStatus::Failed,
                error: Some(message),
            }
        }
    };

    Ok(Some(outcome))
}

/// A claimed job was moved out of `in_progress` by someone else, e.g. a
/// second process sharing the database ran startup recovery.
fn left_in_progress(job_id: JobId) -> Error {
    Error::job(job_id, "no longer in progress; outcome discarded")
}
