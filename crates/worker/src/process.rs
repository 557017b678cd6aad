//! The per-iteration worker algorithm.

use std::path::{Path, PathBuf};

use chrono::Utc;
use courtcam_cloud::{object_key, MediaCache};
use courtcam_core::booking::BookingStatus;
use courtcam_core::config::PipelineConfig;
use courtcam_core::delivery::VideoMetadata;
use courtcam_core::ffmpeg;
use courtcam_core::markers::{self, LockAttempt, SessionState};
use courtcam_core::session::{self, CameraRole, SessionSidecar};
use courtcam_merge::MergeEngine;
use courtcam_store::{BookingStore, PendingUpload, PendingUploadQueue};
use courtcam_sync::BestEffortSync;
use tokio_util::sync::CancellationToken;

use crate::cleanup;
use crate::config::WorkerConfig;
use crate::delivery::Delivery;
use crate::scan;

/// What happened to one scanned file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Uploaded, recorded, evicted.
    Delivered,
    /// Queued for upload; finishing work is done.
    Deferred,
    /// Another process holds the lock.
    SkippedLocked,
    /// Marker state changed since the scan (e.g. pair already handled).
    SkippedStale,
    /// The other half of a pair will process this file.
    SkippedForSibling,
    /// Unreadable/corrupt raw; permanently skipped.
    SkippedCorrupt,
    /// No sidecar yet; retried next pass.
    MissingSidecar,
    /// Merge exhausted retries; terminal.
    MergeFailed,
    /// Overlay/compose transcode failed; retried next pass.
    OverlayFailed,
}

/// The finishing & delivery worker.
pub struct Worker<D: Delivery> {
    pipeline: PipelineConfig,
    config: WorkerConfig,
    store: BookingStore,
    pending: PendingUploadQueue,
    sync: Option<BestEffortSync>,
    delivery: D,
    engine: MergeEngine,
    media_cache: MediaCache,
}

impl<D: Delivery> Worker<D> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pipeline: PipelineConfig,
        config: WorkerConfig,
        store: BookingStore,
        pending: PendingUploadQueue,
        sync: Option<BestEffortSync>,
        delivery: D,
        engine: MergeEngine,
        media_cache: MediaCache,
    ) -> Self {
        Self {
            pipeline,
            config,
            store,
            pending,
            sync,
            delivery,
            engine,
            media_cache,
        }
    }

    /// Run the poll loop until cancelled.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Worker shutting down");
                    return;
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    self.iterate().await;
                }
            }
        }
    }

    /// One full worker pass.
    pub async fn iterate(&mut self) {
        let online = self.delivery.is_online().await;

        if online {
            self.drain_pending().await;
            if let Some(sync) = &self.sync {
                sync.flush().await;
            }
        }

        self.maintenance();

        let ready = scan::scan_ready(&self.pipeline.recordings_dir, self.config.stale_lock_after);
        for raw in ready {
            let outcome = self.process_file(&raw, online).await;
            tracing::info!(raw = %raw.display(), outcome = ?outcome, "Processed recording");
        }
    }

    /// Opportunistic housekeeping: expired bookings and disk pressure.
    fn maintenance(&self) {
        match self
            .store
            .prune_expired(Utc::now(), chrono::Duration::from_std(self.config.retention).unwrap_or_else(|_| chrono::Duration::days(7)))
        {
            Ok(0) => {}
            Ok(pruned) => tracing::info!(pruned, "Pruned expired bookings"),
            Err(e) => tracing::warn!(error = %e, "Booking retention prune failed"),
        }

        cleanup::run_if_needed(&self.pipeline, &self.config);
    }

    /// Walk one raw recording through validate → merge → overlay →
    /// deliver → evict. The lock guard is held for the whole pipeline and
    /// released on every exit path by drop.
    pub async fn process_file(&self, raw: &Path, online: bool) -> ProcessOutcome {
        // The scan snapshot may be stale: the pair's lead file may have
        // handled this one already.
        if markers::session_state(raw) != SessionState::Done {
            return ProcessOutcome::SkippedStale;
        }
        if let Some(outcome) = self.sibling_defers(raw) {
            return outcome;
        }

        let _guard = match markers::acquire_lock(raw, self.config.stale_lock_after) {
            Ok(LockAttempt::Acquired(guard)) => guard,
            Ok(LockAttempt::Held) => return ProcessOutcome::SkippedLocked,
            Err(e) => {
                tracing::warn!(raw = %raw.display(), error = %e, "Lock acquisition failed");
                return ProcessOutcome::SkippedLocked;
            }
        };

        // Cheap size floor first, then container/stream probing.
        let info = match ffmpeg::validate_video_file(raw, self.config.min_raw_bytes).await {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(
                    raw = %raw.display(),
                    error = %e,
                    "Raw recording unusable; marking completed to stop retries",
                );
                // `.completed` (not `.error`): a corrupt capture is not
                // actionable, and an `.error` marker would page operators.
                markers::mark_completed(raw).ok();
                return ProcessOutcome::SkippedCorrupt;
            }
        };

        let sidecar_path = match session::sidecar_path(raw) {
            Some(path) => path,
            None => return ProcessOutcome::MissingSidecar,
        };
        let sidecar = match SessionSidecar::load(&sidecar_path) {
            Ok(Some(sidecar)) => sidecar,
            Ok(None) => {
                tracing::warn!(raw = %raw.display(), "No metadata sidecar; cannot attribute booking yet");
                return ProcessOutcome::MissingSidecar;
            }
            Err(e) => {
                tracing::warn!(raw = %raw.display(), error = %e, "Unreadable sidecar");
                return ProcessOutcome::MissingSidecar;
            }
        };

        self.record_status(&sidecar.booking_id, BookingStatus::Processing, None)
            .await;

        // Dual-camera pair handling.
        let (working, duration_secs) = match self.resolve_working_file(raw, &info).await {
            Ok(resolved) => resolved,
            Err(outcome) => {
                if outcome == ProcessOutcome::MergeFailed {
                    self.record_status(
                        &sidecar.booking_id,
                        BookingStatus::Failed,
                        Some("merge failed"),
                    )
                    .await;
                    // Mirror the terminal state locally so retention can
                    // eventually prune the booking.
                    if let Err(e) = self.store.update_status(
                        &sidecar.booking_id,
                        BookingStatus::Failed,
                        Some("merge failed"),
                    ) {
                        tracing::warn!(error = %e, "Failed to mark booking failed in cache");
                    }
                }
                return outcome;
            }
        };

        // Branding overlays.
        let date = date_of(raw);
        let base = session::base_stem_of(raw).unwrap_or_else(|| "recording".into());
        let final_path = self
            .pipeline
            .processed_dir
            .join(&date)
            .join(format!("{base}.{}", session::VIDEO_EXT));

        let record = self
            .delivery
            .user_media(&sidecar.user_id)
            .await
            .unwrap_or_default();
        let assets = self.media_cache.branding_for(&sidecar.user_id, &record).await;

        if let Err(e) = crate::overlay::compose(
            &working,
            &assets,
            &self.config.static_logo_path,
            &final_path,
            self.config.overlay_timeout,
        )
        .await
        {
            // No terminal marker: a transient transcode failure retries
            // on the next pass; eventual delivery wins over giving up.
            tracing::error!(
                raw = %raw.display(),
                error = %e,
                "Overlay compose failed; will retry next pass",
            );
            return ProcessOutcome::OverlayFailed;
        }

        // Delivery.
        self.record_status(&sidecar.booking_id, BookingStatus::Uploading, None)
            .await;

        let filename = format!("{base}.{}", session::VIDEO_EXT);
        let key = object_key(&sidecar.user_id, &date, &filename);
        let meta = VideoMetadata {
            user_id: sidecar.user_id.clone(),
            video_url: self.delivery.public_url(&key),
            date: date.clone(),
            recording_id: base.clone(),
            duration_seconds: duration_secs,
            filename,
            storage_path: key.clone(),
            booking_id: sidecar.booking_id.clone(),
            uploaded_at: Utc::now(),
        };

        if online {
            match self.deliver(&final_path, &key, &meta).await {
                Ok(()) => {
                    self.finish_booking(&sidecar.booking_id).await;
                    self.evict_session(raw, &final_path);
                    return ProcessOutcome::Delivered;
                }
                Err(e) => {
                    tracing::warn!(key, error = %e, "Delivery failed; deferring to pending queue");
                }
            }
        }

        self.defer_upload(raw, &final_path, key, meta);
        ProcessOutcome::Deferred
    }

    /// Whether this file should wait for its pair's lead file.
    ///
    /// `cam1` leads a pair; `cam2` only processes alone once `cam1` is
    /// out of play: absent, terminal, or abandoned without ever reaching
    /// `.done` (a finalize crash can leave one half unmarked forever —
    /// waiting on it would deadlock the pair).
    fn sibling_defers(&self, raw: &Path) -> Option<ProcessOutcome> {
        if session::role_of(raw) != CameraRole::Cam2 {
            return None;
        }
        let sibling = session::sibling_path(raw)?;
        if !sibling.exists() {
            return None;
        }
        match markers::session_state(&sibling) {
            SessionState::Done | SessionState::Locked => Some(ProcessOutcome::SkippedForSibling),
            SessionState::Pending | SessionState::Completed | SessionState::Error => None,
        }
    }

    /// Resolve the file the overlay/delivery steps should work on.
    ///
    /// For one half of a dual pair this is the merged output (reusing a
    /// previous pass's merge when it validates); for a single-camera
    /// session, or a pair whose sibling is missing/corrupt, it is the raw
    /// file itself.
    async fn resolve_working_file(
        &self,
        raw: &Path,
        info: &ffmpeg::VideoInfo,
    ) -> Result<(PathBuf, f64), ProcessOutcome> {
        let role = session::role_of(raw);
        if !matches!(role, CameraRole::Cam1 | CameraRole::Cam2) {
            return Ok((raw.to_path_buf(), info.duration_secs));
        }

        let Some(sibling) = session::sibling_path(raw) else {
            return Ok((raw.to_path_buf(), info.duration_secs));
        };
        let Some(merged) = session::merged_path(raw) else {
            return Ok((raw.to_path_buf(), info.duration_secs));
        };

        // A previous pass may have merged and then failed later (e.g. on
        // overlay); reuse its output instead of transcoding again.
        if merged.exists() {
            if let Ok(merged_info) = ffmpeg::validate_video_file(&merged, 1024).await {
                tracing::info!(merged = %merged.display(), "Reusing merged output from earlier pass");
                return Ok((merged, merged_info.duration_secs));
            }
        }

        if !sibling.exists() {
            tracing::warn!(
                raw = %raw.display(),
                "Pair sibling missing; degrading to single-camera processing",
            );
            return Ok((raw.to_path_buf(), info.duration_secs));
        }

        // Only a finished sibling may join the pair. A live lock means
        // the scheduler or another worker still owns it — wait. A
        // sibling that never reached `.done` (capture crashed) and a
        // terminal sibling both degrade to single-camera.
        match markers::session_state(&sibling) {
            SessionState::Done => {}
            SessionState::Locked => {
                if !markers::stale_locked(&sibling, self.config.stale_lock_after) {
                    return Err(ProcessOutcome::SkippedForSibling);
                }
            }
            SessionState::Pending | SessionState::Completed | SessionState::Error => {
                tracing::warn!(
                    sibling = %sibling.display(),
                    "Pair sibling not deliverable; degrading to single-camera processing",
                );
                return Ok((raw.to_path_buf(), info.duration_secs));
            }
        }

        if ffmpeg::validate_video_file(&sibling, self.config.min_raw_bytes)
            .await
            .is_err()
        {
            tracing::warn!(
                sibling = %sibling.display(),
                "Pair sibling corrupt; degrading to single-camera processing",
            );
            markers::mark_completed(&sibling).ok();
            return Ok((raw.to_path_buf(), info.duration_secs));
        }

        // Left camera is always input 0 regardless of which file leads.
        let (left, right) = match session::role_of(raw) {
            CameraRole::Cam2 => (sibling.clone(), raw.to_path_buf()),
            _ => (raw.to_path_buf(), sibling.clone()),
        };

        let result = self
            .engine
            .merge(&left, &right, &merged, self.config.merge_method)
            .await;

        if result.success {
            markers::mark_merged(raw).ok();
            markers::mark_merged(&sibling).ok();
            Ok((merged, result.duration))
        } else {
            let reason = result
                .error_message
                .unwrap_or_else(|| "merge failed".to_string());
            tracing::error!(raw = %raw.display(), reason, "Merge terminally failed");
            markers::mark_merge_error(raw, &reason).ok();
            markers::mark_error(raw, &reason).ok();
            markers::mark_error(&sibling, &reason).ok();
            Err(ProcessOutcome::MergeFailed)
        }
    }

    /// Upload and record one finished file.
    async fn deliver(
        &self,
        final_path: &Path,
        key: &str,
        meta: &VideoMetadata,
    ) -> Result<(), crate::delivery::DeliveryError> {
        self.delivery.upload(final_path, key).await?;
        self.delivery.insert_metadata(meta).await?;
        Ok(())
    }

    /// Post-delivery bookkeeping: statuses, cache removal.
    async fn finish_booking(&self, booking_id: &str) {
        self.record_status(booking_id, BookingStatus::Uploaded, None)
            .await;
        self.record_status(booking_id, BookingStatus::Completed, None)
            .await;
        if let Err(e) = self.store.remove(booking_id) {
            tracing::warn!(booking_id, error = %e, "Failed to remove booking from cache");
        }
    }

    /// Queue the upload for a later pass and freeze the session so the
    /// finishing work is not redone.
    fn defer_upload(&self, raw: &Path, final_path: &Path, s3_key: String, meta: VideoMetadata) {
        let entry = PendingUpload {
            final_file: final_path.to_path_buf(),
            s3_key,
            meta,
        };
        if let Err(e) = self.pending.push(entry) {
            tracing::error!(error = %e, "Failed to enqueue pending upload");
            return;
        }
        // The raw files stay on disk until the upload is confirmed, but
        // `.completed` stops the scan from reprocessing them.
        markers::mark_completed(raw).ok();
        if let Some(sibling) = session::sibling_path(raw) {
            if sibling.exists() {
                markers::mark_completed(&sibling).ok();
            }
        }
    }

    /// Retry previously deferred uploads, rewriting the queue with
    /// exactly the undelivered remainder.
    pub async fn drain_pending(&self) {
        let entries = match self.pending.load() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(error = %e, "Cannot read pending-upload queue");
                return;
            }
        };
        if entries.is_empty() {
            return;
        }

        tracing::info!(count = entries.len(), "Retrying deferred uploads");
        let mut remaining = Vec::new();
        for entry in entries {
            if !entry.final_file.exists() {
                tracing::warn!(
                    file = %entry.final_file.display(),
                    "Finished file vanished; dropping queue entry",
                );
                continue;
            }
            match self.deliver(&entry.final_file, &entry.s3_key, &entry.meta).await {
                Ok(()) => {
                    self.finish_booking(&entry.meta.booking_id).await;
                    self.evict_deferred(&entry);
                }
                Err(e) => {
                    tracing::warn!(key = %entry.s3_key, error = %e, "Deferred upload still failing");
                    remaining.push(entry);
                }
            }
        }

        if let Err(e) = self.pending.replace(&remaining) {
            tracing::error!(error = %e, "Failed to rewrite pending-upload queue");
        }
    }

    /// Delete everything belonging to a delivered session.
    fn evict_session(&self, raw: &Path, final_path: &Path) {
        let Some(base) = session::base_stem_of(raw) else {
            return;
        };
        if let Some(dir) = raw.parent() {
            remove_session_files(dir, &base);
        }
        if let Err(e) = std::fs::remove_file(final_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(file = %final_path.display(), error = %e, "Failed to remove finished file");
            }
        }
    }

    /// Eviction for a queue entry, reconstructing the session location
    /// from its metadata.
    fn evict_deferred(&self, entry: &PendingUpload) {
        let dir = self.pipeline.recordings_dir.join(&entry.meta.date);
        remove_session_files(&dir, &entry.meta.recording_id);
        std::fs::remove_file(&entry.final_file).ok();
    }

    async fn record_status(&self, booking_id: &str, status: BookingStatus, error: Option<&str>) {
        if let Some(sync) = &self.sync {
            sync.record_status(booking_id, status, error).await;
        }
    }
}

/// Date component of a raw path (its date-partitioned directory name).
fn date_of(raw: &Path) -> String {
    raw.parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| Utc::now().format("%Y-%m-%d").to_string())
}

/// Remove every file in `dir` whose name starts with the session stem:
/// raw captures, merged output, markers, and the sidecar.
fn remove_session_files(dir: &Path, base_stem: &str) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        if name.to_string_lossy().starts_with(base_stem) {
            if let Err(e) = std::fs::remove_file(entry.path()) {
                tracing::warn!(
                    file = %entry.path().display(),
                    error = %e,
                    "Failed to evict session file",
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_of_uses_parent_dir_name() {
        assert_eq!(
            date_of(Path::new("/rec/2025-01-01/143000-143500.mp4")),
            "2025-01-01"
        );
    }

    #[test]
    fn remove_session_files_is_prefix_scoped() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "143000-143500_cam1.mp4",
            "143000-143500_cam1.mp4.done",
            "143000-143500_cam2.mp4",
            "143000-143500_merged.mp4",
            "143000-143500.json",
            "150000-150500.mp4",
        ] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        remove_session_files(dir.path(), "143000-143500");

        let left: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(left, vec!["150000-150500.mp4".to_string()]);
    }
}
