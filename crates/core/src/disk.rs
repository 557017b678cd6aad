//! Disk usage accounting and cleanup candidate selection.
//!
//! The worker runs an opportunistic cleanup pass when the recordings
//! volume crosses a usage threshold. Candidate selection is pure (oldest
//! first, optionally age-gated) so it can be tested without filling a
//! disk; the actual deletion loop lives in the worker.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::error::CoreError;

/// Default usage percentage above which cleanup runs.
pub const DEFAULT_CLEANUP_THRESHOLD_PERCENT: u8 = 80;

/// Default retention for raw recordings that never completed delivery.
pub const DEFAULT_RETENTION_DAYS: u64 = 7;

/// Percentage of the filesystem containing `path` currently in use.
pub fn disk_usage_percent(path: &Path) -> Result<u8, CoreError> {
    use std::os::unix::ffi::OsStrExt;

    let c_path = std::ffi::CString::new(path.as_os_str().as_bytes())
        .map_err(|_| CoreError::Validation(format!("Path contains NUL: {}", path.display())))?;

    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let ret = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if ret != 0 {
        return Err(CoreError::Io(std::io::Error::last_os_error()));
    }

    let total = stat.f_blocks as u128 * stat.f_frsize as u128;
    if total == 0 {
        return Ok(0);
    }
    let avail = stat.f_bavail as u128 * stat.f_frsize as u128;
    let used = total.saturating_sub(avail);
    Ok(((used * 100) / total) as u8)
}

/// A file eligible for deletion during a cleanup pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupCandidate {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified: SystemTime,
}

/// List files under `dir` (recursively, one level of date directories)
/// older than `min_age`, oldest first.
///
/// Unreadable entries are skipped rather than failing the pass.
pub fn cleanup_candidates(dir: &Path, min_age: Duration) -> Vec<CleanupCandidate> {
    let mut candidates = Vec::new();
    collect_files(dir, &mut candidates, 2);

    let now = SystemTime::now();
    candidates.retain(|c| match now.duration_since(c.modified) {
        Ok(age) => age >= min_age,
        Err(_) => false,
    });
    candidates.sort_by_key(|c| c.modified);
    candidates
}

fn collect_files(dir: &Path, out: &mut Vec<CleanupCandidate>, depth: u8) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if meta.is_dir() {
            if depth > 0 {
                collect_files(&path, out, depth - 1);
            }
        } else if let Ok(modified) = meta.modified() {
            out.push(CleanupCandidate {
                path,
                size_bytes: meta.len(),
                modified,
            });
        }
    }
}
