//! Marker-file protocol coordinating the scheduler and the worker.
//!
//! Marker files next to a raw recording are the only cross-process
//! synchronization primitive in the pipeline. The ad hoc existence checks
//! of early prototypes are replaced by a tagged [`SessionState`] and a
//! small set of transition functions; lock acquisition uses create-new
//! open semantics so there is no window between "check" and "create".
//!
//! Lock files carry the owner's pid and acquisition time so a lock left
//! behind by a crashed worker can be reclaimed once it is stale and its
//! owner is gone.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::instance::pid_alive;

// ---------------------------------------------------------------------------
// Marker kinds
// ---------------------------------------------------------------------------

/// The marker files recognized next to a raw recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// Transient: a process is recording to or processing this file.
    Lock,
    /// Capture finished; file is ready for the worker.
    Done,
    /// Terminal success (or permanent skip): never reprocess.
    Completed,
    /// Terminal failure: never reprocess, left for operator inspection.
    Error,
    /// Dual-camera pair was merged successfully.
    Merged,
    /// Merge exhausted its retries.
    MergeError,
}

impl Marker {
    /// Extension appended to the raw file name, e.g. `"done"` in
    /// `143000-143500_cam1.mp4.done`.
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Lock => "lock",
            Self::Done => "done",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Merged => "merged",
            Self::MergeError => "merge_error",
        }
    }
}

/// Path of `marker` for the given raw file.
pub fn marker_path(raw: &Path, marker: Marker) -> PathBuf {
    let mut name = raw.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(marker.suffix());
    raw.with_file_name(name)
}

/// Whether `marker` exists for the given raw file.
pub fn has_marker(raw: &Path, marker: Marker) -> bool {
    marker_path(raw, marker).exists()
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Tagged state derived from the marker files of one raw recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No markers yet: capture still running or never started.
    Pending,
    /// A `.lock` exists: recording or processing in progress.
    Locked,
    /// `.done` with no lock: ready for the worker.
    Done,
    /// Terminal success / permanent skip.
    Completed,
    /// Terminal failure.
    Error,
}

/// Derive the session state for a raw file.
///
/// Terminal markers take precedence over `.lock`/`.done` so a crash that
/// leaves a mixed set still resolves to a terminal state.
pub fn session_state(raw: &Path) -> SessionState {
    if has_marker(raw, Marker::Error) {
        SessionState::Error
    } else if has_marker(raw, Marker::Completed) {
        SessionState::Completed
    } else if has_marker(raw, Marker::Lock) {
        SessionState::Locked
    } else if has_marker(raw, Marker::Done) {
        SessionState::Done
    } else {
        SessionState::Pending
    }
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// Signal that capture finished and the file is ready for the worker.
pub fn mark_done(raw: &Path) -> Result<(), CoreError> {
    touch(&marker_path(raw, Marker::Done))
}

/// Terminally complete a file so it is never reselected.
pub fn mark_completed(raw: &Path) -> Result<(), CoreError> {
    touch(&marker_path(raw, Marker::Completed))
}

/// Terminally fail a file, recording `reason` inside the marker.
pub fn mark_error(raw: &Path, reason: &str) -> Result<(), CoreError> {
    std::fs::write(marker_path(raw, Marker::Error), reason)?;
    Ok(())
}

/// Record a successful merge of a dual-camera pair.
pub fn mark_merged(raw: &Path) -> Result<(), CoreError> {
    touch(&marker_path(raw, Marker::Merged))
}

/// Record a terminally failed merge, keeping `reason` for postmortem.
pub fn mark_merge_error(raw: &Path, reason: &str) -> Result<(), CoreError> {
    std::fs::write(marker_path(raw, Marker::MergeError), reason)?;
    Ok(())
}

/// Remove every marker belonging to a raw file (after successful delivery).
pub fn clear_markers(raw: &Path) -> Result<(), CoreError> {
    for marker in [
        Marker::Lock,
        Marker::Done,
        Marker::Completed,
        Marker::Error,
        Marker::Merged,
        Marker::MergeError,
    ] {
        let path = marker_path(raw, marker);
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn touch(path: &Path) -> Result<(), CoreError> {
    std::fs::write(path, b"")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Locks
// ---------------------------------------------------------------------------

/// Contents of a `.lock` marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

impl LockInfo {
    fn current() -> Self {
        Self {
            pid: std::process::id(),
            acquired_at: Utc::now(),
        }
    }
}

/// Holds a `.lock` marker; releasing (or dropping) removes the file.
#[derive(Debug)]
pub struct LockGuard {
    path: Option<PathBuf>,
}

impl LockGuard {
    /// Remove the lock file. Safe to call once; `Drop` is the backstop.
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove lock file");
                }
            }
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Outcome of a lock acquisition attempt.
#[derive(Debug)]
pub enum LockAttempt {
    /// Lock acquired; hold the guard for the duration of processing.
    Acquired(LockGuard),
    /// Another live process holds the lock.
    Held,
}

/// Try to acquire the `.lock` marker for a raw file.
///
/// Uses `create_new` so two processes racing for the same file cannot both
/// succeed. A stale lock (older than `stale_after` with a dead owner) is
/// reclaimed: the old file is removed and acquisition is retried once.
pub fn acquire_lock(raw: &Path, stale_after: Duration) -> Result<LockAttempt, CoreError> {
    let path = marker_path(raw, Marker::Lock);

    for attempt in 0..2 {
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let info = LockInfo::current();
                file.write_all(serde_json::to_string(&info)?.as_bytes())?;
                return Ok(LockAttempt::Acquired(LockGuard {
                    path: Some(path),
                }));
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if attempt == 0 && try_reclaim(&path, stale_after)? {
                    continue;
                }
                return Ok(LockAttempt::Held);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(LockAttempt::Held)
}

/// Whether a lock is stale: old enough and its owner no longer runs.
pub fn lock_is_stale(info: &LockInfo, now: DateTime<Utc>, stale_after: Duration) -> bool {
    now - info.acquired_at > stale_after && !pid_alive(info.pid)
}

/// Whether `raw` carries a lock that is stale and therefore reclaimable.
///
/// Used by the worker scan so a crash-orphaned lock does not hide a file
/// forever; the actual reclaim happens inside [`acquire_lock`].
pub fn stale_locked(raw: &Path, stale_after: Duration) -> bool {
    let path = marker_path(raw, Marker::Lock);
    match std::fs::read_to_string(&path) {
        Ok(contents) => match serde_json::from_str::<LockInfo>(&contents) {
            Ok(info) => lock_is_stale(&info, Utc::now(), stale_after),
            Err(_) => file_older_than(&path, stale_after),
        },
        Err(_) => false,
    }
}

/// Remove the lock at `path` if it is stale. Returns whether it was removed.
fn try_reclaim(path: &Path, stale_after: Duration) -> Result<bool, CoreError> {
    let stale = match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<LockInfo>(&contents) {
            Ok(info) => lock_is_stale(&info, Utc::now(), stale_after),
            // Unparseable lock: fall back to filesystem mtime.
            Err(_) => file_older_than(path, stale_after),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e.into()),
    };

    if !stale {
        return Ok(false);
    }

    tracing::warn!(path = %path.display(), "Reclaiming stale lock");
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(e.into()),
    }
}

fn file_older_than(path: &Path, age: Duration) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    let Ok(modified) = meta.modified() else {
        return false;
    };
    match modified.elapsed() {
        Ok(elapsed) => elapsed > age.to_std().unwrap_or_default(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_file(dir: &Path) -> PathBuf {
        let raw = dir.join("143000-143500_cam1.mp4");
        std::fs::write(&raw, b"video").unwrap();
        raw
    }

    // -- marker paths ---------------------------------------------------------

    #[test]
    fn marker_path_appends_suffix() {
        let raw = Path::new("/rec/143000-143500_cam1.mp4");
        assert_eq!(
            marker_path(raw, Marker::Done),
            Path::new("/rec/143000-143500_cam1.mp4.done")
        );
        assert_eq!(
            marker_path(raw, Marker::MergeError),
            Path::new("/rec/143000-143500_cam1.mp4.merge_error")
        );
    }

    // -- state derivation -----------------------------------------------------

    #[test]
    fn fresh_file_is_pending() {
        let dir = tempfile::tempdir().unwrap();
        let raw = raw_file(dir.path());
        assert_eq!(session_state(&raw), SessionState::Pending);
    }

    #[test]
    fn done_marker_makes_ready() {
        let dir = tempfile::tempdir().unwrap();
        let raw = raw_file(dir.path());
        mark_done(&raw).unwrap();
        assert_eq!(session_state(&raw), SessionState::Done);
    }

    #[test]
    fn lock_takes_precedence_over_done() {
        let dir = tempfile::tempdir().unwrap();
        let raw = raw_file(dir.path());
        mark_done(&raw).unwrap();
        let guard = match acquire_lock(&raw, Duration::minutes(30)).unwrap() {
            LockAttempt::Acquired(g) => g,
            LockAttempt::Held => panic!("fresh lock should be acquired"),
        };
        assert_eq!(session_state(&raw), SessionState::Locked);
        guard.release();
        assert_eq!(session_state(&raw), SessionState::Done);
    }

    #[test]
    fn terminal_markers_take_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let raw = raw_file(dir.path());
        mark_done(&raw).unwrap();
        mark_completed(&raw).unwrap();
        assert_eq!(session_state(&raw), SessionState::Completed);

        mark_error(&raw, "merge exhausted retries").unwrap();
        assert_eq!(session_state(&raw), SessionState::Error);
    }

    #[test]
    fn error_marker_records_reason() {
        let dir = tempfile::tempdir().unwrap();
        let raw = raw_file(dir.path());
        mark_error(&raw, "corrupt input").unwrap();
        let contents = std::fs::read_to_string(marker_path(&raw, Marker::Error)).unwrap();
        assert_eq!(contents, "corrupt input");
    }

    #[test]
    fn clear_markers_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let raw = raw_file(dir.path());
        mark_done(&raw).unwrap();
        mark_merged(&raw).unwrap();
        mark_completed(&raw).unwrap();
        clear_markers(&raw).unwrap();
        assert_eq!(session_state(&raw), SessionState::Pending);
        assert!(!has_marker(&raw, Marker::Merged));
    }

    // -- locks ----------------------------------------------------------------

    #[test]
    fn second_acquire_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let raw = raw_file(dir.path());
        let _guard = match acquire_lock(&raw, Duration::minutes(30)).unwrap() {
            LockAttempt::Acquired(g) => g,
            LockAttempt::Held => panic!(),
        };
        assert!(matches!(
            acquire_lock(&raw, Duration::minutes(30)).unwrap(),
            LockAttempt::Held
        ));
    }

    #[test]
    fn drop_releases_lock() {
        let dir = tempfile::tempdir().unwrap();
        let raw = raw_file(dir.path());
        {
            let _guard = acquire_lock(&raw, Duration::minutes(30)).unwrap();
        }
        assert!(!has_marker(&raw, Marker::Lock));
    }

    #[test]
    fn lock_records_owner_pid() {
        let dir = tempfile::tempdir().unwrap();
        let raw = raw_file(dir.path());
        let _guard = acquire_lock(&raw, Duration::minutes(30)).unwrap();
        let contents =
            std::fs::read_to_string(marker_path(&raw, Marker::Lock)).unwrap();
        let info: LockInfo = serde_json::from_str(&contents).unwrap();
        assert_eq!(info.pid, std::process::id());
    }

    #[test]
    fn stale_lock_with_dead_owner_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let raw = raw_file(dir.path());
        // Plant a lock owned by a pid that cannot exist, acquired an hour ago.
        let info = LockInfo {
            pid: u32::MAX - 1,
            acquired_at: Utc::now() - Duration::hours(1),
        };
        std::fs::write(
            marker_path(&raw, Marker::Lock),
            serde_json::to_string(&info).unwrap(),
        )
        .unwrap();

        match acquire_lock(&raw, Duration::minutes(30)).unwrap() {
            LockAttempt::Acquired(_g) => {}
            LockAttempt::Held => panic!("stale lock should be reclaimed"),
        }
    }

    #[test]
    fn fresh_lock_not_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let raw = raw_file(dir.path());
        let info = LockInfo {
            pid: u32::MAX - 1,
            acquired_at: Utc::now(),
        };
        std::fs::write(
            marker_path(&raw, Marker::Lock),
            serde_json::to_string(&info).unwrap(),
        )
        .unwrap();

        assert!(matches!(
            acquire_lock(&raw, Duration::minutes(30)).unwrap(),
            LockAttempt::Held
        ));
    }

    #[test]
    fn live_owner_lock_not_reclaimed_even_when_old() {
        let dir = tempfile::tempdir().unwrap();
        let raw = raw_file(dir.path());
        let info = LockInfo {
            pid: std::process::id(),
            acquired_at: Utc::now() - Duration::hours(2),
        };
        std::fs::write(
            marker_path(&raw, Marker::Lock),
            serde_json::to_string(&info).unwrap(),
        )
        .unwrap();

        assert!(matches!(
            acquire_lock(&raw, Duration::minutes(30)).unwrap(),
            LockAttempt::Held
        ));
    }

    #[test]
    fn lock_is_stale_requires_both_conditions() {
        let now = Utc::now();
        let old_dead = LockInfo {
            pid: u32::MAX - 1,
            acquired_at: now - Duration::hours(1),
        };
        let old_alive = LockInfo {
            pid: std::process::id(),
            acquired_at: now - Duration::hours(1),
        };
        let fresh_dead = LockInfo {
            pid: u32::MAX - 1,
            acquired_at: now,
        };
        let after = Duration::minutes(30);
        assert!(lock_is_stale(&old_dead, now, after));
        assert!(!lock_is_stale(&old_alive, now, after));
        assert!(!lock_is_stale(&fresh_dead, now, after));
    }
}
