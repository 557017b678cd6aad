//! Directory scan for recordings ready to process.

use std::path::{Path, PathBuf};

use courtcam_core::markers::{self, SessionState};
use courtcam_core::session::{self, CameraRole};

/// Find raw recordings eligible for processing.
///
/// Walks date directories in lexicographic (chronological) order and
/// files within each in name order. Eligible files have a `.done` marker
/// and none of `.completed`/`.error`; a `.lock` hides a file unless the
/// lock is stale, in which case the file is surfaced so processing can
/// reclaim it. Merged intermediates are never selected directly.
pub fn scan_ready(recordings_dir: &Path, stale_lock_after: chrono::Duration) -> Vec<PathBuf> {
    let mut date_dirs: Vec<PathBuf> = match std::fs::read_dir(recordings_dir) {
        Ok(entries) => entries
            .flatten()
            .filter(|e| e.path().is_dir())
            .map(|e| e.path())
            .collect(),
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    dir = %recordings_dir.display(),
                    error = %e,
                    "Cannot read recordings directory",
                );
            }
            return Vec::new();
        }
    };
    date_dirs.sort();

    let mut ready = Vec::new();
    for dir in date_dirs {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        let mut files: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
        files.sort();

        for file in files {
            if is_eligible(&file, stale_lock_after) {
                ready.push(file);
            }
        }
    }
    ready
}

fn is_eligible(file: &Path, stale_lock_after: chrono::Duration) -> bool {
    if file.extension().and_then(|e| e.to_str()) != Some(session::VIDEO_EXT) {
        return false;
    }
    // A merged file is consumed by its pair's processing, never scanned.
    if session::role_of(file) == CameraRole::Merged {
        return false;
    }
    match markers::session_state(file) {
        SessionState::Done => true,
        SessionState::Locked => markers::stale_locked(file, stale_lock_after),
        SessionState::Pending | SessionState::Completed | SessionState::Error => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use courtcam_core::markers::{mark_completed, mark_done, mark_error, LockInfo, Marker};

    fn stale_after() -> ChronoDuration {
        ChronoDuration::minutes(30)
    }

    fn make_raw(dir: &Path, date: &str, name: &str) -> PathBuf {
        let day = dir.join(date);
        std::fs::create_dir_all(&day).unwrap();
        let raw = day.join(name);
        std::fs::write(&raw, b"video").unwrap();
        raw
    }

    #[test]
    fn done_files_selected_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let later = make_raw(dir.path(), "2025-01-02", "090000-091000.mp4");
        let earlier = make_raw(dir.path(), "2025-01-01", "143000-143500_cam1.mp4");
        mark_done(&later).unwrap();
        mark_done(&earlier).unwrap();

        let ready = scan_ready(dir.path(), stale_after());
        assert_eq!(ready, vec![earlier, later]);
    }

    #[test]
    fn unmarked_files_not_selected() {
        let dir = tempfile::tempdir().unwrap();
        make_raw(dir.path(), "2025-01-01", "143000-143500.mp4");
        assert!(scan_ready(dir.path(), stale_after()).is_empty());
    }

    #[test]
    fn completed_never_reselected() {
        let dir = tempfile::tempdir().unwrap();
        let raw = make_raw(dir.path(), "2025-01-01", "143000-143500.mp4");
        mark_done(&raw).unwrap();
        mark_completed(&raw).unwrap();
        assert!(scan_ready(dir.path(), stale_after()).is_empty());
    }

    #[test]
    fn error_never_reselected() {
        let dir = tempfile::tempdir().unwrap();
        let raw = make_raw(dir.path(), "2025-01-01", "143000-143500.mp4");
        mark_done(&raw).unwrap();
        mark_error(&raw, "merge exhausted retries").unwrap();
        assert!(scan_ready(dir.path(), stale_after()).is_empty());
    }

    #[test]
    fn live_lock_hides_file() {
        let dir = tempfile::tempdir().unwrap();
        let raw = make_raw(dir.path(), "2025-01-01", "143000-143500.mp4");
        mark_done(&raw).unwrap();
        let info = LockInfo {
            pid: std::process::id(),
            acquired_at: chrono::Utc::now(),
        };
        std::fs::write(
            courtcam_core::markers::marker_path(&raw, Marker::Lock),
            serde_json::to_string(&info).unwrap(),
        )
        .unwrap();

        assert!(scan_ready(dir.path(), stale_after()).is_empty());
    }

    #[test]
    fn stale_lock_surfaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let raw = make_raw(dir.path(), "2025-01-01", "143000-143500.mp4");
        mark_done(&raw).unwrap();
        let info = LockInfo {
            pid: u32::MAX - 1,
            acquired_at: chrono::Utc::now() - ChronoDuration::hours(2),
        };
        std::fs::write(
            courtcam_core::markers::marker_path(&raw, Marker::Lock),
            serde_json::to_string(&info).unwrap(),
        )
        .unwrap();

        assert_eq!(scan_ready(dir.path(), stale_after()), vec![raw]);
    }

    #[test]
    fn merged_and_non_video_files_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let merged = make_raw(dir.path(), "2025-01-01", "143000-143500_merged.mp4");
        mark_done(&merged).unwrap();
        let sidecar = dir.path().join("2025-01-01").join("143000-143500.json");
        std::fs::write(&sidecar, b"{}").unwrap();

        assert!(scan_ready(dir.path(), stale_after()).is_empty());
    }

    #[test]
    fn missing_recordings_dir_is_empty() {
        assert!(scan_ready(Path::new("/nope"), stale_after()).is_empty());
    }
}
