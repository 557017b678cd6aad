//! Worker loop tests against an in-memory delivery double.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use courtcam_cloud::MediaCache;
use courtcam_core::booking::{Booking, BookingStatus};
use courtcam_core::config::PipelineConfig;
use courtcam_core::delivery::{UserMediaRecord, VideoMetadata};
use courtcam_core::markers;
use courtcam_merge::{MergeConfig, MergeEngine};
use courtcam_store::{BookingStore, PendingUpload, PendingUploadQueue};
use courtcam_worker::delivery::{Delivery, DeliveryError};
use courtcam_worker::process::ProcessOutcome;
use courtcam_worker::{Worker, WorkerConfig};

// ---------------------------------------------------------------------------
// Delivery double
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct MockDelivery {
    online: Arc<AtomicBool>,
    fail_uploads: Arc<AtomicBool>,
    uploads: Arc<Mutex<Vec<String>>>,
    inserts: Arc<Mutex<Vec<VideoMetadata>>>,
}

impl MockDelivery {
    fn online() -> Self {
        let mock = Self::default();
        mock.online.store(true, Ordering::SeqCst);
        mock
    }
}

#[async_trait::async_trait]
impl Delivery for MockDelivery {
    async fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://cdn.test/{key}")
    }

    async fn upload(&self, _local: &Path, key: &str) -> Result<(), DeliveryError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(DeliveryError::Upload(courtcam_cloud::CloudError::Upload(
                "injected failure".into(),
            )));
        }
        self.uploads.lock().unwrap().push(key.to_string());
        Ok(())
    }

    async fn insert_metadata(&self, meta: &VideoMetadata) -> Result<(), DeliveryError> {
        self.inserts.lock().unwrap().push(meta.clone());
        Ok(())
    }

    async fn user_media(&self, _user_id: &str) -> Option<UserMediaRecord> {
        None
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

struct Fixture {
    _dir: tempfile::TempDir,
    pipeline: PipelineConfig,
    store: BookingStore,
    pending: PendingUploadQueue,
    delivery: MockDelivery,
}

fn fixture(delivery: MockDelivery) -> (Fixture, Worker<MockDelivery>) {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = PipelineConfig {
        user_id: "u1".into(),
        camera_id: "cam0".into(),
        recordings_dir: dir.path().join("recordings"),
        processed_dir: dir.path().join("processed"),
        media_cache_dir: dir.path().join("media-cache"),
        booking_cache_path: dir.path().join("bookings.json"),
        pending_uploads_path: dir.path().join("pending.json"),
        status_queue_path: dir.path().join("status.json"),
        run_dir: dir.path().join("run"),
    };
    std::fs::create_dir_all(&pipeline.recordings_dir).unwrap();
    std::fs::create_dir_all(&pipeline.processed_dir).unwrap();

    let store = BookingStore::new(&pipeline.booking_cache_path);
    let pending = PendingUploadQueue::new(&pipeline.pending_uploads_path);

    let worker = Worker::new(
        pipeline.clone(),
        WorkerConfig::default(),
        store.clone(),
        pending.clone(),
        None,
        delivery.clone(),
        MergeEngine::new(MergeConfig::default()),
        MediaCache::new(&pipeline.media_cache_dir),
    );

    (
        Fixture {
            _dir: dir,
            pipeline,
            store,
            pending,
            delivery,
        },
        worker,
    )
}

fn booking(id: &str) -> Booking {
    let base = Utc.with_ymd_and_hms(2025, 1, 1, 14, 30, 0).unwrap();
    Booking {
        id: id.into(),
        user_id: "u1".into(),
        camera_id: "cam0".into(),
        start_time: base,
        end_time: base + chrono::Duration::minutes(5),
        status: BookingStatus::Uploading,
        error_message: None,
        retry_count: 0,
    }
}

/// Seed a frozen (already-finished, upload-deferred) session on disk.
fn seed_deferred_session(fx: &Fixture, stem: &str) -> PendingUpload {
    let day = fx.pipeline.recordings_dir.join("2025-01-01");
    std::fs::create_dir_all(&day).unwrap();
    let raw = day.join(format!("{stem}_cam1.mp4"));
    std::fs::write(&raw, b"raw bytes").unwrap();
    markers::mark_done(&raw).unwrap();
    markers::mark_completed(&raw).unwrap();
    std::fs::write(day.join(format!("{stem}.json")), b"{}").unwrap();

    let processed_day = fx.pipeline.processed_dir.join("2025-01-01");
    std::fs::create_dir_all(&processed_day).unwrap();
    let final_file = processed_day.join(format!("{stem}.mp4"));
    std::fs::write(&final_file, b"finished bytes").unwrap();

    let key = format!("u1/2025-01-01/{stem}.mp4");
    PendingUpload {
        final_file,
        s3_key: key.clone(),
        meta: VideoMetadata {
            user_id: "u1".into(),
            video_url: format!("https://cdn.test/{key}"),
            date: "2025-01-01".into(),
            recording_id: stem.into(),
            duration_seconds: 300.0,
            filename: format!("{stem}.mp4"),
            storage_path: key,
            booking_id: "b1".into(),
            uploaded_at: Utc::now(),
        },
    }
}

// ---------------------------------------------------------------------------
// Pending queue durability
// ---------------------------------------------------------------------------

#[tokio::test]
async fn drain_delivers_evicts_and_rewrites_queue() {
    let (fx, worker) = fixture(MockDelivery::online());
    fx.store.save(&[booking("b1")]).unwrap();

    let entry = seed_deferred_session(&fx, "143000-143500");
    let final_file = entry.final_file.clone();
    fx.pending.push(entry).unwrap();

    worker.drain_pending().await;

    // Uploaded exactly once, metadata recorded.
    assert_eq!(
        *fx.delivery.uploads.lock().unwrap(),
        vec!["u1/2025-01-01/143000-143500.mp4".to_string()]
    );
    assert_eq!(fx.delivery.inserts.lock().unwrap().len(), 1);
    assert_eq!(fx.delivery.inserts.lock().unwrap()[0].booking_id, "b1");

    // Queue rewritten empty; session evicted; booking removed.
    assert!(fx.pending.load().unwrap().is_empty());
    assert!(!final_file.exists());
    let day = fx.pipeline.recordings_dir.join("2025-01-01");
    assert_eq!(std::fs::read_dir(&day).unwrap().count(), 0);
    assert!(fx.store.load().unwrap().is_empty());
}

#[tokio::test]
async fn drain_keeps_failing_entries_without_loss() {
    let (fx, worker) = fixture(MockDelivery::online());
    fx.delivery.fail_uploads.store(true, Ordering::SeqCst);

    let first = seed_deferred_session(&fx, "143000-143500");
    let second = seed_deferred_session(&fx, "150000-150500");
    fx.pending.push(first).unwrap();
    fx.pending.push(second).unwrap();

    worker.drain_pending().await;

    // Both entries survive, order preserved, nothing uploaded.
    let entries = fx.pending.load().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].meta.recording_id, "143000-143500");
    assert_eq!(entries[1].meta.recording_id, "150000-150500");
    assert!(fx.delivery.uploads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn drain_removes_only_delivered_entries() {
    let (fx, worker) = fixture(MockDelivery::online());

    let keep = seed_deferred_session(&fx, "143000-143500");
    let vanish = seed_deferred_session(&fx, "150000-150500");
    // The second entry's finished file disappears (manual cleanup).
    std::fs::remove_file(&vanish.final_file).unwrap();
    fx.pending.push(keep).unwrap();
    fx.pending.push(vanish).unwrap();

    worker.drain_pending().await;

    // Deliverable entry uploaded; undeliverable entry dropped, not stuck.
    assert_eq!(fx.delivery.uploads.lock().unwrap().len(), 1);
    assert!(fx.pending.load().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Per-file processing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn corrupt_raw_marked_completed_not_error() {
    let (fx, worker) = fixture(MockDelivery::online());
    let day = fx.pipeline.recordings_dir.join("2025-01-01");
    std::fs::create_dir_all(&day).unwrap();
    let raw = day.join("143000-143500.mp4");
    std::fs::write(&raw, b"way too small").unwrap();
    markers::mark_done(&raw).unwrap();

    let outcome = worker.process_file(&raw, true).await;

    assert_eq!(outcome, ProcessOutcome::SkippedCorrupt);
    assert!(markers::has_marker(&raw, markers::Marker::Completed));
    assert!(!markers::has_marker(&raw, markers::Marker::Error));
    // The raw file itself is preserved for inspection.
    assert!(raw.exists());
}

#[tokio::test]
async fn completed_file_never_reprocessed() {
    let (fx, worker) = fixture(MockDelivery::online());
    let day = fx.pipeline.recordings_dir.join("2025-01-01");
    std::fs::create_dir_all(&day).unwrap();
    let raw = day.join("143000-143500.mp4");
    std::fs::write(&raw, b"bytes").unwrap();
    markers::mark_done(&raw).unwrap();
    markers::mark_completed(&raw).unwrap();

    let outcome = worker.process_file(&raw, true).await;
    assert_eq!(outcome, ProcessOutcome::SkippedStale);
    assert!(fx.delivery.uploads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn cam2_defers_to_finished_cam1_sibling() {
    let (fx, worker) = fixture(MockDelivery::online());
    let day = fx.pipeline.recordings_dir.join("2025-01-01");
    std::fs::create_dir_all(&day).unwrap();
    let cam1 = day.join("143000-143500_cam1.mp4");
    let cam2 = day.join("143000-143500_cam2.mp4");
    std::fs::write(&cam1, b"left").unwrap();
    std::fs::write(&cam2, b"right").unwrap();
    markers::mark_done(&cam1).unwrap();
    markers::mark_done(&cam2).unwrap();

    let outcome = worker.process_file(&cam2, true).await;
    assert_eq!(outcome, ProcessOutcome::SkippedForSibling);
}

#[tokio::test]
async fn cam2_processes_alone_when_cam1_never_finished() {
    let (fx, worker) = fixture(MockDelivery::online());
    let day = fx.pipeline.recordings_dir.join("2025-01-01");
    std::fs::create_dir_all(&day).unwrap();
    let cam1 = day.join("143000-143500_cam1.mp4");
    let cam2 = day.join("143000-143500_cam2.mp4");
    std::fs::write(&cam1, b"left, never marked done").unwrap();
    std::fs::write(&cam2, b"right").unwrap();
    markers::mark_done(&cam2).unwrap();

    // cam1 never reached `.done` (capture crash); cam2 must not wait on
    // it forever. Processing proceeds past pair deferral and fails on
    // validation of this stub file instead.
    let outcome = worker.process_file(&cam2, true).await;
    assert_eq!(outcome, ProcessOutcome::SkippedCorrupt);
}

#[tokio::test]
async fn offline_iteration_defers_everything() {
    let (fx, mut worker) = fixture(MockDelivery::default());

    let entry = seed_deferred_session(&fx, "143000-143500");
    fx.pending.push(entry).unwrap();

    worker.iterate().await;

    // Offline: the queue is untouched and nothing was uploaded.
    assert_eq!(fx.pending.load().unwrap().len(), 1);
    assert!(fx.delivery.uploads.lock().unwrap().is_empty());
}
