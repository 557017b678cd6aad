//! `courtcam-worker` -- video finishing & delivery daemon.
//!
//! Scans for finished raw recordings, merges dual-camera pairs, applies
//! branding overlays, uploads to object storage, mirrors metadata into
//! the remote database, and evicts local files. Intended to run under a
//! process supervisor alongside `courtcam-scheduler`.
//!
//! # Required environment variables
//!
//! `COURTCAM_USER_ID`, `COURTCAM_CAMERA_ID`, `DATABASE_URL`, `S3_BUCKET`.
//! See the config modules for the full table of optional variables.

use courtcam_cloud::{MediaCache, S3Config, Uploader};
use courtcam_core::config::PipelineConfig;
use courtcam_core::instance::InstanceLock;
use courtcam_merge::MergeEngine;
use courtcam_store::{BookingStore, PendingUploadQueue, StatusQueue};
use courtcam_sync::{connect_lazy, BestEffortSync, DatabaseConfig};
use courtcam_worker::{S3Delivery, Worker, WorkerConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courtcam_worker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let pipeline = PipelineConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid pipeline configuration");
        std::process::exit(1);
    });

    let _instance = InstanceLock::acquire(&pipeline.run_dir, "courtcam-worker").unwrap_or_else(|e| {
        tracing::error!(error = %e, "Cannot start");
        std::process::exit(1);
    });

    let config = WorkerConfig::from_env();

    let db_config = DatabaseConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid database configuration");
        std::process::exit(1);
    });
    let pool = connect_lazy(&db_config).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Cannot build database pool");
        std::process::exit(1);
    });

    let s3_config = S3Config::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid object storage configuration");
        std::process::exit(1);
    });
    let uploader = Uploader::connect(s3_config).await;

    let store = BookingStore::new(&pipeline.booking_cache_path);
    let pending = PendingUploadQueue::new(&pipeline.pending_uploads_path);
    let status_queue = StatusQueue::new(&pipeline.status_queue_path);
    let sync = BestEffortSync::new(pool.clone(), status_queue);
    let delivery = S3Delivery::new(
        uploader,
        pool,
        config.probe_url.clone(),
        config.probe_timeout,
    );
    let engine = MergeEngine::new(courtcam_worker::config::merge_config_from_env());
    let media_cache = MediaCache::new(&pipeline.media_cache_dir);

    tracing::info!(
        user_id = %pipeline.user_id,
        camera_id = %pipeline.camera_id,
        recordings_dir = %pipeline.recordings_dir.display(),
        poll_interval_secs = config.poll_interval.as_secs(),
        "Starting courtcam-worker",
    );

    let worker = Worker::new(
        pipeline, config, store, pending, Some(sync), delivery, engine, media_cache,
    );

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_cancel.cancel();
        }
    });

    worker.run(cancel).await;
}
