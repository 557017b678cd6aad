//! Opportunistic disk-space cleanup.
//!
//! Runs only when the recordings volume crosses the usage threshold.
//! Deletion order: oldest processed files first (they are reproducible
//! from raws or already delivered), then raw sessions that reached a
//! terminal marker state and outlived the retention window. Raw files
//! without a terminal marker are never touched — an undelivered
//! recording is the one thing this pipeline must not lose.

use std::path::Path;
use std::time::Duration;

use courtcam_core::config::PipelineConfig;
use courtcam_core::disk::{cleanup_candidates, disk_usage_percent};
use courtcam_core::markers::{self, SessionState};
use courtcam_core::session;

use crate::config::WorkerConfig;

/// Whether usage warrants a cleanup pass.
pub fn needs_cleanup(usage_percent: u8, threshold_percent: u8) -> bool {
    usage_percent >= threshold_percent
}

/// Run the cleanup pass when the disk is under pressure. Returns bytes
/// freed.
pub fn run_if_needed(pipeline: &PipelineConfig, config: &WorkerConfig) -> u64 {
    let usage = match disk_usage_percent(&pipeline.recordings_dir) {
        Ok(usage) => usage,
        Err(e) => {
            tracing::warn!(error = %e, "Cannot stat recordings volume; skipping cleanup");
            return 0;
        }
    };
    if !needs_cleanup(usage, config.disk_threshold_percent) {
        return 0;
    }

    tracing::warn!(
        usage,
        threshold = config.disk_threshold_percent,
        "Disk pressure; running cleanup",
    );

    let mut freed = delete_until_below_threshold(
        &pipeline.processed_dir,
        &pipeline.recordings_dir,
        config.disk_threshold_percent,
    );
    freed += delete_terminal_sessions(&pipeline.recordings_dir, config.retention);

    tracing::info!(freed_bytes = freed, "Cleanup pass finished");
    freed
}

/// Delete processed files oldest-first until usage drops below the
/// threshold (or candidates run out).
fn delete_until_below_threshold(processed_dir: &Path, volume: &Path, threshold: u8) -> u64 {
    let mut freed = 0u64;
    for candidate in cleanup_candidates(processed_dir, Duration::ZERO) {
        match disk_usage_percent(volume) {
            Ok(usage) if usage < threshold => break,
            Ok(_) => {}
            Err(_) => break,
        }
        match std::fs::remove_file(&candidate.path) {
            Ok(()) => {
                freed += candidate.size_bytes;
                tracing::info!(file = %candidate.path.display(), "Removed old processed file");
            }
            Err(e) => {
                tracing::warn!(file = %candidate.path.display(), error = %e, "Cleanup removal failed");
            }
        }
    }
    freed
}

/// Delete terminal (`.completed`/`.error`) raw sessions older than
/// `retention`, markers included. Returns bytes freed.
pub fn delete_terminal_sessions(recordings_dir: &Path, retention: Duration) -> u64 {
    let mut freed = 0u64;
    for candidate in cleanup_candidates(recordings_dir, retention) {
        let path = &candidate.path;
        if path.extension().and_then(|e| e.to_str()) != Some(session::VIDEO_EXT) {
            continue;
        }
        match markers::session_state(path) {
            SessionState::Completed | SessionState::Error => {}
            _ => continue,
        }

        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!(file = %path.display(), error = %e, "Failed to remove expired session");
            continue;
        }
        freed += candidate.size_bytes;
        markers::clear_markers(path).ok();
        tracing::info!(file = %path.display(), "Removed expired terminal session");
    }
    freed
}
