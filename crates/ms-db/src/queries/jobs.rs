//! Job queue operations.
//!
//! Jobs are claimed strictly in creation order. The runner is the only
//! caller of [`claim_next_job`], which flips a single row to `in_progress`
//! in one statement so a claim can never be shared.

use ms_core::config::StaleJobPolicy;
use ms_core::{Error, JobId, JobPayload, JobStatus, Result};
use rusqlite::Connection;

use crate::models::Job;

const COLS: &str = "id, job_type, status, payload, subject_id, error,
    created_at, modified_at, started_at, completed_at";

fn status_in(pred: impl Fn(JobStatus) -> bool) -> String {
    let set: Vec<String> = JobStatus::ALL
        .into_iter()
        .filter(|s| pred(*s))
        .map(|s| format!("'{}'", s.as_str()))
        .collect();
    format!("status IN ({})", set.join(", "))
}

/// SQL condition matching the rows that may move to `next`, taken from
/// [`JobStatus::can_transition_to`].
fn may_become(next: JobStatus) -> String {
    status_in(|s| s.can_transition_to(next))
}

/// Create a new `not_started` job.
pub fn create_job(conn: &Connection, payload: &JobPayload) -> Result<Job> {
    let id = JobId::new();
    let now = super::now();
    let job_type = payload.job_type();
    let body = payload.to_json()?;
    let subject = payload.subject_id();

    conn.execute(
        "INSERT INTO jobs (id, job_type, status, payload, subject_id, created_at, modified_at)
         VALUES (?1, ?2, 'not_started', ?3, ?4, ?5, ?5)",
        rusqlite::params![id.to_string(), job_type.as_str(), &body, &subject, &now],
    )
    .map_err(Error::database)?;

    Ok(Job {
        id,
        job_type: job_type.as_str().to_string(),
        status: JobStatus::NotStarted,
        payload: body,
        subject_id: Some(subject),
        error: None,
        created_at: now.clone(),
        modified_at: now,
        started_at: None,
        completed_at: None,
    })
}

/// Create a job unless one of the same type for the same subject is still
/// pending (`not_started` or `in_progress`).
///
/// Returns `None` when the job was de-duplicated.
pub fn enqueue_unique(conn: &Connection, payload: &JobPayload) -> Result<Option<Job>> {
    let q = format!(
        "SELECT COUNT(*) > 0 FROM jobs WHERE job_type = ?1 AND subject_id = ?2 AND {}",
        status_in(|s| !s.is_terminal())
    );
    let pending: bool = conn
        .query_row(
            &q,
            rusqlite::params![payload.job_type().as_str(), payload.subject_id()],
            |row| row.get(0),
        )
        .map_err(Error::database)?;

    if pending {
        return Ok(None);
    }
    create_job(conn, payload).map(Some)
}

/// Get a job by ID.
pub fn get_job(conn: &Connection, id: JobId) -> Result<Option<Job>> {
    let q = format!("SELECT {COLS} FROM jobs WHERE id = ?1");
    match conn.query_row(&q, [id.to_string()], Job::from_row) {
        Ok(j) => Ok(Some(j)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e)),
    }
}

/// List jobs in a given status, oldest first.
pub fn list_jobs_by_status(conn: &Connection, status: JobStatus) -> Result<Vec<Job>> {
    let q = format!(
        "SELECT {COLS} FROM jobs WHERE status = ?1 ORDER BY created_at ASC, rowid ASC"
    );
    let mut stmt = conn.prepare(&q).map_err(Error::database)?;
    let rows = stmt
        .query_map([status.as_str()], Job::from_row)
        .map_err(Error::database)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::database)?;
    Ok(rows)
}

/// Count jobs in a given status.
pub fn count_jobs_by_status(conn: &Connection, status: JobStatus) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM jobs WHERE status = ?1",
        [status.as_str()],
        |row| row.get(0),
    )
    .map_err(Error::database)
}

/// Atomically claim the oldest `not_started` job.
///
/// Sets `status='in_progress'` and `started_at` on exactly one row and
/// returns it, or `None` when the queue is empty.
pub fn claim_next_job(conn: &Connection) -> Result<Option<Job>> {
    let now = super::now();

    // SQLite RETURNING is supported since 3.35.
    let q = format!(
        "UPDATE jobs SET status='in_progress', started_at=?1, modified_at=?1
         WHERE id = (
             SELECT id FROM jobs WHERE {}
             ORDER BY created_at ASC, rowid ASC LIMIT 1
         )
         RETURNING {COLS}",
        may_become(JobStatus::InProgress)
    );

    match conn.query_row(&q, [&now], Job::from_row) {
        Ok(j) => Ok(Some(j)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e)),
    }
}

/// Mark an `in_progress` job as done. Returns `false` when the job is in a
/// state that cannot finish.
pub fn complete_job(conn: &Connection, id: JobId) -> Result<bool> {
    finish(conn, id, JobStatus::Done, None)
}

/// Mark an `in_progress` job as failed, recording the error.
pub fn fail_job(conn: &Connection, id: JobId, error: &str) -> Result<bool> {
    finish(conn, id, JobStatus::Failed, Some(error))
}

fn finish(conn: &Connection, id: JobId, next: JobStatus, error: Option<&str>) -> Result<bool> {
    let q = format!(
        "UPDATE jobs SET status=?1, error=?2, completed_at=?3, modified_at=?3
         WHERE id=?4 AND {}",
        may_become(next)
    );
    let n = conn
        .execute(
            &q,
            rusqlite::params![next.as_str(), error, super::now(), id.to_string()],
        )
        .map_err(Error::database)?;
    Ok(n > 0)
}

/// Force every `in_progress` job out of that state.
///
/// Called once at startup, before the runner begins claiming. `Requeue` is
/// the one backwards move the state machine allows, and only here. Returns
/// the number of jobs affected.
pub fn recover_stale_jobs(conn: &Connection, policy: StaleJobPolicy) -> Result<usize> {
    let now = super::now();
    let sql = match policy {
        StaleJobPolicy::Cancel => {
            "UPDATE jobs SET status='cancelled', completed_at=?1, modified_at=?1,
                error='interrupted by shutdown'
             WHERE status='in_progress'"
        }
        StaleJobPolicy::Requeue => {
            "UPDATE jobs SET status='not_started', started_at=NULL, modified_at=?1
             WHERE status='in_progress'"
        }
    };
    conn.execute(sql, [&now])
        .map_err(Error::database)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::init_memory_pool;
    use ms_core::{JobType, LibraryPathId, MediaId};

    #[test]
    fn create_and_get() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();

        let media_id = MediaId::new();
        let job = create_job(&conn, &JobPayload::generate_checksum(media_id)).unwrap();
        let fetched = get_job(&conn, job.id).unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::NotStarted);
        assert_eq!(fetched.kind().unwrap(), JobType::GenerateChecksum);
        assert_eq!(
            fetched.decode_payload().unwrap(),
            JobPayload::generate_checksum(media_id)
        );
        assert_eq!(fetched.subject_id, Some(media_id.to_string()));
    }

    #[test]
    fn claim_in_creation_order() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();

        let first = create_job(&conn, &JobPayload::scan_path(LibraryPathId::new())).unwrap();
        let second = create_job(&conn, &JobPayload::probe_media(MediaId::new())).unwrap();

        let claimed = claim_next_job(&conn).unwrap().unwrap();
        assert_eq!(claimed.id, first.id);
        assert_eq!(claimed.status, JobStatus::InProgress);
        assert!(claimed.started_at.is_some());

        let claimed = claim_next_job(&conn).unwrap().unwrap();
        assert_eq!(claimed.id, second.id);

        assert!(claim_next_job(&conn).unwrap().is_none());
        assert_eq!(count_jobs_by_status(&conn, JobStatus::InProgress).unwrap(), 2);
    }

    #[test]
    fn complete_and_fail_require_in_progress() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();

        let a = create_job(&conn, &JobPayload::probe_media(MediaId::new())).unwrap();
        assert!(!complete_job(&conn, a.id).unwrap());

        claim_next_job(&conn).unwrap();
        assert!(complete_job(&conn, a.id).unwrap());
        assert_eq!(get_job(&conn, a.id).unwrap().unwrap().status, JobStatus::Done);
        // Done is terminal.
        assert!(!fail_job(&conn, a.id, "late").unwrap());

        let b = create_job(&conn, &JobPayload::probe_media(MediaId::new())).unwrap();
        claim_next_job(&conn).unwrap();
        assert!(fail_job(&conn, b.id, "boom").unwrap());
        let failed = get_job(&conn, b.id).unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("boom"));
        assert!(failed.completed_at.is_some());
    }

    #[test]
    fn enqueue_unique_skips_pending_duplicates() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let lp = LibraryPathId::new();

        assert!(enqueue_unique(&conn, &JobPayload::scan_path(lp)).unwrap().is_some());
        assert!(enqueue_unique(&conn, &JobPayload::scan_path(lp)).unwrap().is_none());

        // Still pending while in progress.
        let claimed = claim_next_job(&conn).unwrap().unwrap();
        assert!(enqueue_unique(&conn, &JobPayload::scan_path(lp)).unwrap().is_none());

        // Finished jobs no longer block.
        complete_job(&conn, claimed.id).unwrap();
        assert!(enqueue_unique(&conn, &JobPayload::scan_path(lp)).unwrap().is_some());
    }

    #[test]
    fn recover_stale_cancel() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let job = create_job(&conn, &JobPayload::probe_media(MediaId::new())).unwrap();
        claim_next_job(&conn).unwrap();

        assert_eq!(recover_stale_jobs(&conn, StaleJobPolicy::Cancel).unwrap(), 1);
        assert_eq!(
            get_job(&conn, job.id).unwrap().unwrap().status,
            JobStatus::Cancelled
        );
        assert_eq!(count_jobs_by_status(&conn, JobStatus::InProgress).unwrap(), 0);
    }

    #[test]
    fn recover_stale_requeue() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let job = create_job(&conn, &JobPayload::probe_media(MediaId::new())).unwrap();
        claim_next_job(&conn).unwrap();

        assert_eq!(recover_stale_jobs(&conn, StaleJobPolicy::Requeue).unwrap(), 1);
        let requeued = get_job(&conn, job.id).unwrap().unwrap();
        assert_eq!(requeued.status, JobStatus::NotStarted);
        assert!(requeued.started_at.is_none());

        let claimed = claim_next_job(&conn).unwrap().unwrap();
        assert_eq!(claimed.id, job.id);
    }

    #[test]
    fn transition_guard_follows_state_machine() {
        assert_eq!(may_become(JobStatus::InProgress), "status IN ('not_started')");
        assert_eq!(may_become(JobStatus::Done), "status IN ('in_progress')");
        assert_eq!(may_become(JobStatus::NotStarted), "status IN ()");
        assert_eq!(
            status_in(|s| !s.is_terminal()),
            "status IN ('not_started', 'in_progress')"
        );
    }

    #[test]
    fn terminal_jobs_stay_put() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let job = create_job(&conn, &JobPayload::probe_media(MediaId::new())).unwrap();
        claim_next_job(&conn).unwrap();
        assert!(fail_job(&conn, job.id, "boom").unwrap());

        assert!(!complete_job(&conn, job.id).unwrap());
        assert!(!fail_job(&conn, job.id, "again").unwrap());
        assert!(claim_next_job(&conn).unwrap().is_none());
        let stored = get_job(&conn, job.id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.error.as_deref(), Some("boom"));
        assert_eq!(list_jobs_by_status(&conn, JobStatus::Failed).unwrap().len(), 1);
    }

    #[test]
    fn unknown_type_decodes_to_error() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO jobs (id, job_type, status, payload, created_at, modified_at)
             VALUES (?1, 'resize', 'not_started', '{}', 'a', 'a')",
            [JobId::new().to_string()],
        )
        .unwrap();

        let claimed = claim_next_job(&conn).unwrap().unwrap();
        assert!(claimed.decode_payload().is_err());
        assert!(fail_job(&conn, claimed.id, "bad type").unwrap());
    }
}
