//! Shared pipeline configuration loaded from environment variables.
//!
//! Both daemons load [`PipelineConfig`] at startup. Values that identify
//! this appliance (`COURTCAM_USER_ID`, `COURTCAM_CAMERA_ID`) are required;
//! everything else has a default suitable for a stock Raspberry Pi image.

use std::path::PathBuf;

use crate::error::CoreError;

/// Configuration shared by the scheduler and worker daemons.
///
/// | Env Var                  | Required | Default                              |
/// |--------------------------|----------|--------------------------------------|
/// | `COURTCAM_USER_ID`       | yes      | --                                   |
/// | `COURTCAM_CAMERA_ID`     | yes      | --                                   |
/// | `RECORDINGS_DIR`         | no       | `/var/lib/courtcam/recordings`       |
/// | `PROCESSED_DIR`          | no       | `/var/lib/courtcam/processed`        |
/// | `MEDIA_CACHE_DIR`        | no       | `/var/lib/courtcam/media-cache`      |
/// | `BOOKING_CACHE_PATH`     | no       | `/var/lib/courtcam/bookings.json`    |
/// | `PENDING_UPLOADS_PATH`   | no       | `/var/lib/courtcam/pending-uploads.json` |
/// | `STATUS_QUEUE_PATH`      | no       | `/var/lib/courtcam/status-queue.json` |
/// | `RUN_DIR`                | no       | `/run/courtcam`                      |
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Owner of this appliance's bookings.
    pub user_id: String,
    /// Identity this appliance records under.
    pub camera_id: String,
    /// Root of the date-partitioned raw recording tree.
    pub recordings_dir: PathBuf,
    /// Where finished (merged/branded) files are written before upload.
    pub processed_dir: PathBuf,
    /// Per-user branding asset cache.
    pub media_cache_dir: PathBuf,
    /// Local JSON mirror of the remote bookings table.
    pub booking_cache_path: PathBuf,
    /// Durable queue of uploads deferred while offline.
    pub pending_uploads_path: PathBuf,
    /// Durable queue of booking status updates awaiting remote delivery.
    pub status_queue_path: PathBuf,
    /// Directory for pid files (single-instance guard).
    pub run_dir: PathBuf,
}

impl PipelineConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns [`CoreError::Config`] when a required variable is missing.
    pub fn from_env() -> Result<Self, CoreError> {
        let user_id = required("COURTCAM_USER_ID")?;
        let camera_id = required("COURTCAM_CAMERA_ID")?;

        Ok(Self {
            user_id,
            camera_id,
            recordings_dir: path_or("RECORDINGS_DIR", "/var/lib/courtcam/recordings"),
            processed_dir: path_or("PROCESSED_DIR", "/var/lib/courtcam/processed"),
            media_cache_dir: path_or("MEDIA_CACHE_DIR", "/var/lib/courtcam/media-cache"),
            booking_cache_path: path_or("BOOKING_CACHE_PATH", "/var/lib/courtcam/bookings.json"),
            pending_uploads_path: path_or(
                "PENDING_UPLOADS_PATH",
                "/var/lib/courtcam/pending-uploads.json",
            ),
            status_queue_path: path_or("STATUS_QUEUE_PATH", "/var/lib/courtcam/status-queue.json"),
            run_dir: path_or("RUN_DIR", "/run/courtcam"),
        })
    }
}

fn required(var: &str) -> Result<String, CoreError> {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(CoreError::Config(format!(
            "{var} environment variable is required"
        ))),
    }
}

fn path_or(var: &str, default: &str) -> PathBuf {
    std::env::var(var)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

/// Parse an env var as `u64`, falling back to `default` when unset or
/// unparseable.
pub fn env_u64(var: &str, default: u64) -> u64 {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parse an env var as `bool` (`1`/`true`/`yes`), defaulting to `default`.
pub fn env_bool(var: &str, default: bool) -> bool {
    match std::env::var(var) {
        Ok(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
        Err(_) => default,
    }
}
