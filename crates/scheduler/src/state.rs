//! Scheduler state and pure transition predicates.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use courtcam_core::booking::Booking;
use courtcam_core::markers::LockGuard;

/// A recording in progress.
#[derive(Debug)]
pub struct ActiveSession {
    pub booking: Booking,
    pub started_at: DateTime<Utc>,
    /// Raw files being written, one per started camera.
    pub raw_paths: Vec<PathBuf>,
    /// Lock markers held for the duration of the capture.
    pub locks: Vec<LockGuard>,
}

/// The scheduler's state machine. `Finalizing` is transient within one
/// tick (stop, write markers, sync status) so only two states persist
/// across ticks.
#[derive(Debug)]
pub enum SchedulerState {
    Idle,
    Recording(ActiveSession),
}

/// Whether an active session should stop now.
///
/// True only when the booking window has closed **and** the minimum
/// recording duration has elapsed since capture actually started. The
/// second condition guards against a session started near (or past) its
/// end time being torn down after a single poll tick.
pub fn should_stop(
    now: DateTime<Utc>,
    end_time: DateTime<Utc>,
    started_at: DateTime<Utc>,
    min_duration: Duration,
) -> bool {
    now > end_time && now - started_at >= min_duration
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn keeps_recording_inside_window() {
        assert!(!should_stop(at(0), at(120), at(-10), Duration::seconds(10)));
    }

    #[test]
    fn stops_after_window_and_min_duration() {
        assert!(should_stop(at(121), at(120), at(0), Duration::seconds(10)));
    }

    #[test]
    fn min_duration_guard_defers_stop() {
        // end_time already one second in the past, but the session only
        // started two seconds ago: keep recording.
        assert!(!should_stop(at(0), at(-1), at(-2), Duration::seconds(10)));
    }

    #[test]
    fn min_duration_boundary_is_inclusive() {
        assert!(should_stop(at(10), at(5), at(0), Duration::seconds(10)));
    }

    #[test]
    fn end_time_boundary_is_exclusive() {
        // Exactly at end_time the window is still open.
        assert!(!should_stop(at(120), at(120), at(0), Duration::seconds(10)));
    }
}
