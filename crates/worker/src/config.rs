//! Worker daemon configuration.

use std::path::PathBuf;
use std::time::Duration;

use courtcam_core::config::{env_bool, env_u64};
use courtcam_core::disk::{DEFAULT_CLEANUP_THRESHOLD_PERCENT, DEFAULT_RETENTION_DAYS};
use courtcam_merge::MergeMethod;

/// Default seconds between worker passes.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Default age after which an orphaned lock may be reclaimed (30 min,
/// roughly twice the worst-case merge + overlay + upload time).
pub const DEFAULT_STALE_LOCK_SECS: u64 = 30 * 60;

/// Default size floor for a raw recording to be worth processing.
pub const DEFAULT_MIN_RAW_BYTES: u64 = 100 * 1024;

/// Worker-specific tunables.
///
/// | Env Var                 | Default                    |
/// |-------------------------|----------------------------|
/// | `POLL_INTERVAL`         | `30`                       |
/// | `STALE_LOCK_SECS`       | `1800`                     |
/// | `MIN_RAW_BYTES`         | `102400`                   |
/// | `MERGE_METHOD`          | `side_by_side`             |
/// | `USE_OPENCV_STITCHING`  | `false`                    |
/// | `DISK_CLEANUP_PERCENT`  | `80`                       |
/// | `RETENTION_DAYS`        | `7`                        |
/// | `STATIC_LOGO_PATH`      | `/etc/courtcam/logo.png`   |
/// | `OVERLAY_TIMEOUT_SECS`  | `600`                      |
/// | `CONNECTIVITY_PROBE_URL`| gstatic generate_204       |
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub poll_interval: Duration,
    pub stale_lock_after: chrono::Duration,
    pub min_raw_bytes: u64,
    pub merge_method: MergeMethod,
    pub use_opencv_stitching: bool,
    pub disk_threshold_percent: u8,
    pub retention: Duration,
    pub static_logo_path: PathBuf,
    pub overlay_timeout: Duration,
    pub probe_url: String,
    pub probe_timeout: Duration,
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        let merge_method = std::env::var("MERGE_METHOD")
            .ok()
            .and_then(|m| MergeMethod::from_str(&m).ok())
            .unwrap_or(MergeMethod::SideBySide);

        Self {
            poll_interval: Duration::from_secs(env_u64(
                "POLL_INTERVAL",
                DEFAULT_POLL_INTERVAL_SECS,
            )),
            stale_lock_after: chrono::Duration::seconds(env_u64(
                "STALE_LOCK_SECS",
                DEFAULT_STALE_LOCK_SECS,
            ) as i64),
            min_raw_bytes: env_u64("MIN_RAW_BYTES", DEFAULT_MIN_RAW_BYTES),
            merge_method,
            use_opencv_stitching: env_bool("USE_OPENCV_STITCHING", false),
            disk_threshold_percent: env_u64(
                "DISK_CLEANUP_PERCENT",
                DEFAULT_CLEANUP_THRESHOLD_PERCENT as u64,
            ) as u8,
            retention: Duration::from_secs(
                env_u64("RETENTION_DAYS", DEFAULT_RETENTION_DAYS) * 24 * 3600,
            ),
            static_logo_path: std::env::var("STATIC_LOGO_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/etc/courtcam/logo.png")),
            overlay_timeout: Duration::from_secs(env_u64("OVERLAY_TIMEOUT_SECS", 600)),
            probe_url: std::env::var("CONNECTIVITY_PROBE_URL")
                .unwrap_or_else(|_| courtcam_cloud::connectivity::DEFAULT_PROBE_URL.to_string()),
            probe_timeout: courtcam_cloud::connectivity::DEFAULT_PROBE_TIMEOUT,
        }
    }
}

/// Build the merge engine configuration from the environment.
///
/// | Env Var              | Default |
/// |----------------------|---------|
/// | `FEATHER_WIDTH`      | `100`   |
/// | `EDGE_TRIM`          | `0`     |
/// | `MERGE_MAX_RETRIES`  | `3`     |
/// | `MERGE_TIMEOUT_SECS` | `600`   |
/// | `STITCHER_COMMAND`   | --      |
/// | `CALIBRATION_PATH`   | --      |
pub fn merge_config_from_env() -> courtcam_merge::MergeConfig {
    let defaults = courtcam_merge::MergeConfig::default();
    courtcam_merge::MergeConfig {
        feather_width: env_u64("FEATHER_WIDTH", defaults.feather_width as u64) as u32,
        edge_trim: env_u64("EDGE_TRIM", defaults.edge_trim as u64) as u32,
        max_retries: env_u64("MERGE_MAX_RETRIES", defaults.max_retries as u64) as u32,
        timeout: Duration::from_secs(env_u64(
            "MERGE_TIMEOUT_SECS",
            defaults.timeout.as_secs(),
        )),
        use_opencv_stitching: env_bool("USE_OPENCV_STITCHING", false),
        stitcher_command: std::env::var("STITCHER_COMMAND").ok().map(PathBuf::from),
        calibration_path: std::env::var("CALIBRATION_PATH").ok().map(PathBuf::from),
        ..defaults
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            stale_lock_after: chrono::Duration::seconds(DEFAULT_STALE_LOCK_SECS as i64),
            min_raw_bytes: DEFAULT_MIN_RAW_BYTES,
            merge_method: MergeMethod::SideBySide,
            use_opencv_stitching: false,
            disk_threshold_percent: DEFAULT_CLEANUP_THRESHOLD_PERCENT,
            retention: Duration::from_secs(DEFAULT_RETENTION_DAYS * 24 * 3600),
            static_logo_path: PathBuf::from("/etc/courtcam/logo.png"),
            overlay_timeout: Duration::from_secs(600),
            probe_url: courtcam_cloud::connectivity::DEFAULT_PROBE_URL.to_string(),
            probe_timeout: courtcam_cloud::connectivity::DEFAULT_PROBE_TIMEOUT,
        }
    }
}
