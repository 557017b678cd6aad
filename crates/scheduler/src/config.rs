//! Scheduler daemon configuration.

use courtcam_core::config::env_u64;

/// Default seconds between booking-cache polls.
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 3;

/// Default minimum recording length. A session is never stopped by the
/// end-time check before this much has elapsed, which guards against
/// clock skew and bookings found active for only a poll tick.
pub const DEFAULT_MIN_RECORDING_SECS: u64 = 10;

/// Scheduler-specific tunables.
///
/// | Env Var               | Default |
/// |-----------------------|---------|
/// | `CHECK_INTERVAL`      | `3`     |
/// | `MIN_RECORDING_SECS`  | `10`    |
/// | `CAMERA_DEVICES`      | `0`     |
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub check_interval_secs: u64,
    pub min_recording_secs: u64,
    /// Camera indices to record, e.g. `[0]` or `[0, 1]` for a dual rig.
    pub camera_indices: Vec<u32>,
}

impl SchedulerConfig {
    pub fn from_env() -> Self {
        let camera_indices = std::env::var("CAMERA_DEVICES")
            .unwrap_or_else(|_| "0".into())
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect::<Vec<u32>>();

        Self {
            check_interval_secs: env_u64("CHECK_INTERVAL", DEFAULT_CHECK_INTERVAL_SECS),
            min_recording_secs: env_u64("MIN_RECORDING_SECS", DEFAULT_MIN_RECORDING_SECS),
            camera_indices: if camera_indices.is_empty() {
                vec![0]
            } else {
                camera_indices
            },
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: DEFAULT_CHECK_INTERVAL_SECS,
            min_recording_secs: DEFAULT_MIN_RECORDING_SECS,
            camera_indices: vec![0],
        }
    }
}
