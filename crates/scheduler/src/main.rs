//! `courtcam-scheduler` -- booking-driven recording daemon.
//!
//! Polls the local booking cache and drives the capture devices through
//! Idle → Recording → Finalizing, leaving raw files, sidecars, and
//! marker files for `courtcam-worker` to finish and deliver.
//!
//! # Required environment variables
//!
//! `COURTCAM_USER_ID`, `COURTCAM_CAMERA_ID`, `DATABASE_URL`.
//! See the config modules for the full table of optional variables.

use courtcam_capture::{detect_available, RpicamDevice};
use courtcam_core::config::PipelineConfig;
use courtcam_core::instance::InstanceLock;
use courtcam_scheduler::{Scheduler, SchedulerConfig};
use courtcam_store::{BookingStore, StatusQueue};
use courtcam_sync::{connect_lazy, BestEffortSync, DatabaseConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courtcam_scheduler=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let pipeline = PipelineConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid pipeline configuration");
        std::process::exit(1);
    });

    let _instance =
        InstanceLock::acquire(&pipeline.run_dir, "courtcam-scheduler").unwrap_or_else(|e| {
            tracing::error!(error = %e, "Cannot start");
            std::process::exit(1);
        });

    let config = SchedulerConfig::from_env();

    let db_config = DatabaseConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid database configuration");
        std::process::exit(1);
    });
    let pool = connect_lazy(&db_config).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Cannot build database pool");
        std::process::exit(1);
    });
    let sync = BestEffortSync::new(pool, StatusQueue::new(&pipeline.status_queue_path));

    let detected = detect_available().await;
    tracing::info!(
        detected = detected.len(),
        configured = config.camera_indices.len(),
        "Camera detection complete",
    );
    for camera in &detected {
        tracing::info!(index = camera.index, model = %camera.model, "Detected camera");
    }

    let devices: Vec<RpicamDevice> = config
        .camera_indices
        .iter()
        .map(|&idx| RpicamDevice::new(idx))
        .collect();

    let store = BookingStore::new(&pipeline.booking_cache_path);

    tracing::info!(
        user_id = %pipeline.user_id,
        camera_id = %pipeline.camera_id,
        check_interval_secs = config.check_interval_secs,
        cameras = devices.len(),
        "Starting courtcam-scheduler",
    );

    let scheduler = Scheduler::new(pipeline, config, store, Some(sync), devices);

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_cancel.cancel();
        }
    });

    scheduler.run(cancel).await;
}
