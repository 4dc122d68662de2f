//! Full scan passes against a real directory tree.

mod common;

use std::sync::Arc;

use common::{FakeProber, TestHarness};
use ms_av::ProbeReport;
use ms_core::{JobPayload, JobStatus};
use ms_db::queries::{jobs, media};
use ms_engine::jobs::runner;
use ms_engine::{reconciler, DrainSummary};
use tokio_util::sync::CancellationToken;

async fn scan(harness: &TestHarness) -> DrainSummary {
    let lp = harness.library_path();
    jobs::create_job(&harness.conn(), &JobPayload::scan_path(lp.id)).unwrap();
    runner::drain(&harness.ctx, &CancellationToken::new()).await
}

// ---------------------------------------------------------------------------
// Delete and re-add scenario
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_and_readd_never_duplicates_active_record() {
    let harness = TestHarness::new();
    let lp = harness.library_path();
    let file = harness.write_file("a.mp4", 5000);

    scan(&harness).await;
    let first = media::list_active_media(&harness.conn(), lp.id).unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].relative_path, "/a.mp4");
    assert_eq!(first[0].size_bytes, 5000);
    let original_id = first[0].id;

    std::fs::remove_file(&file).unwrap();
    scan(&harness).await;
    let conn = harness.conn();
    assert!(media::list_active_media(&conn, lp.id).unwrap().is_empty());
    let old = media::get_media(&conn, original_id).unwrap().unwrap();
    assert!(!old.exists, "row must be kept, only marked missing");
    drop(conn);

    harness.write_file("a.mp4", 5000);
    scan(&harness).await;
    let conn = harness.conn();
    let active = media::list_active_media(&conn, lp.id).unwrap();
    assert_eq!(active.len(), 1);
    assert_ne!(active[0].id, original_id);

    // History is preserved alongside the fresh record.
    let history = media::list_media_at_path(&conn, lp.id, "/a.mp4").unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().any(|m| m.id == original_id && m.checksum.is_some()));
}

// ---------------------------------------------------------------------------
// Idempotence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unchanged_tree_reconciles_to_zero_writes() {
    let harness = TestHarness::new();
    let lp = harness.library_path();
    harness.write_file("a.mp4", 10);
    harness.write_file("shows/s01/e01.mkv", 10);
    harness.write_file("shows/s01/e01.srt", 10);

    let conn = harness.conn();
    let exts = harness.ctx.config.media.video_extensions.clone();
    let first = reconciler::reconcile(&conn, &lp, &exts, 50).unwrap();
    assert_eq!(first.writes(), 2);
    let second = reconciler::reconcile(&conn, &lp, &exts, 50).unwrap();
    assert_eq!(second.writes(), 0);
    assert_eq!(second.files_found, 2);
}

// ---------------------------------------------------------------------------
// Enrichment
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scan_enriches_every_new_record() {
    let harness = TestHarness::new();
    let lp = harness.library_path();
    harness.write_file("a.mp4", 100);
    harness.write_file("b.mkv", 100);

    let summary = scan(&harness).await;
    // One scan, then probe + checksum + thumbnail per record.
    assert_eq!(summary, DrainSummary { done: 7, failed: 0 });

    let conn = harness.conn();
    for record in media::list_active_media(&conn, lp.id).unwrap() {
        assert_eq!((record.width, record.height), (1280, 720));
        assert_eq!(record.runtime_secs, 120);
        assert_eq!(record.checksum.as_deref().map(str::len), Some(64));
        assert!(harness.ctx.config.assets.thumbnail_path(record.id).exists());
    }
    assert_eq!(jobs::count_jobs_by_status(&conn, JobStatus::Done).unwrap(), 7);
}

#[tokio::test]
async fn run_once_style_pass_uses_configured_roots() {
    let harness = TestHarness::new();
    harness.write_file("a.mp4", 1);

    let summary = ms_engine::sync_once(&harness.ctx).await.unwrap();
    assert_eq!(summary.library_paths, 1);
    assert_eq!(summary.jobs.failed, 0);
    assert_eq!(summary.jobs.done, 4);
}

#[tokio::test]
async fn rescans_do_not_reprobe_files_without_video() {
    let harness = TestHarness::with_prober(Arc::new(FakeProber {
        report: ProbeReport {
            width: 0,
            height: 0,
            duration_secs: 60.0,
            size_bytes: 0,
        },
    }));
    let lp = harness.library_path();
    harness.write_file("song.mp4", 10);

    let first = ms_engine::sync_once(&harness.ctx).await.unwrap();
    assert_eq!(first.jobs.done, 4);

    for _ in 0..2 {
        let again = ms_engine::sync_once(&harness.ctx).await.unwrap();
        assert_eq!(again.jobs.done, 1, "an unchanged tree only runs the scan itself");
    }

    let record = media::list_active_media(&harness.conn(), lp.id).unwrap().remove(0);
    assert_eq!((record.width, record.height), (0, 0));
    assert!(record.probed_at.is_some());
}
