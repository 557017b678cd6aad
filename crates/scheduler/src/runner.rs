//! The scheduler poll loop and state machine driver.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Local, Utc};
use courtcam_core::booking::{active_booking, Booking, BookingStatus};
use courtcam_core::config::PipelineConfig;
use courtcam_core::markers::{self, LockAttempt};
use courtcam_core::session::{self, SessionSidecar};
use courtcam_capture::CaptureDevice;
use courtcam_store::BookingStore;
use courtcam_sync::BestEffortSync;
use tokio_util::sync::CancellationToken;

use crate::config::SchedulerConfig;
use crate::state::{should_stop, ActiveSession, SchedulerState};

/// How long a scheduler-held lock may live before the worker may reclaim
/// it. Generous: a recording can legitimately hold its lock for hours.
const SCHEDULER_LOCK_STALE_HOURS: i64 = 6;

/// Drives this appliance's capture devices against the booking cache.
pub struct Scheduler<D: CaptureDevice> {
    pipeline: PipelineConfig,
    config: SchedulerConfig,
    store: BookingStore,
    sync: Option<BestEffortSync>,
    devices: Vec<D>,
    state: SchedulerState,
}

impl<D: CaptureDevice> Scheduler<D> {
    pub fn new(
        pipeline: PipelineConfig,
        config: SchedulerConfig,
        store: BookingStore,
        sync: Option<BestEffortSync>,
        devices: Vec<D>,
    ) -> Self {
        if devices.len() > 2 {
            tracing::warn!(
                count = devices.len(),
                "More than two capture devices configured; only the first two record",
            );
        }
        Self {
            pipeline,
            config,
            store,
            sync,
            devices,
            state: SchedulerState::Idle,
        }
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    /// Run the poll loop until cancelled. An in-flight recording is
    /// finalized on shutdown so its footage is never stranded without a
    /// `.done` marker.
    pub async fn run(mut self, cancel: CancellationToken) {
        let interval = std::time::Duration::from_secs(self.config.check_interval_secs);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Scheduler shutting down");
                    if matches!(self.state, SchedulerState::Recording(_)) {
                        self.finalize_session().await;
                    }
                    return;
                }
                _ = tokio::time::sleep(interval) => {
                    self.tick(Utc::now()).await;
                }
            }
        }
    }

    /// One poll tick of the state machine.
    pub async fn tick(&mut self, now: DateTime<Utc>) {
        match &self.state {
            SchedulerState::Idle => self.tick_idle(now).await,
            SchedulerState::Recording(session) => {
                let end_time = session.booking.end_time;
                let started_at = session.started_at;
                if should_stop(
                    now,
                    end_time,
                    started_at,
                    Duration::seconds(self.config.min_recording_secs as i64),
                ) {
                    self.finalize_session().await;
                }
            }
        }
    }

    async fn tick_idle(&mut self, now: DateTime<Utc>) {
        let bookings = match self.store.load() {
            Ok(bookings) => bookings,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read booking cache; skipping tick");
                return;
            }
        };

        let booking = active_booking(
            &bookings,
            &self.pipeline.user_id,
            &self.pipeline.camera_id,
            now,
        );
        if let Some(booking) = booking {
            let booking = booking.clone();
            self.start_session(booking, now).await;
        }
    }

    /// Idle → Recording: start every configured camera.
    ///
    /// A partial start (one of two cameras fails) records in degraded
    /// mode; a total failure stays Idle and is retried on the next tick.
    async fn start_session(&mut self, booking: Booking, now: DateTime<Utc>) {
        let date_dir = self
            .pipeline
            .recordings_dir
            .join(session::date_dir_name(Local::now()));
        if let Err(e) = std::fs::create_dir_all(&date_dir) {
            tracing::error!(dir = %date_dir.display(), error = %e, "Cannot create session directory");
            return;
        }

        let stem = session::session_stem(booking.start_time, booking.end_time);
        let dual = self.devices.len() >= 2;
        let targets: Vec<PathBuf> = self
            .devices
            .iter()
            .take(2)
            .enumerate()
            .map(|(i, _)| {
                let name = if dual {
                    format!("{stem}_cam{}.{}", i + 1, session::VIDEO_EXT)
                } else {
                    format!("{stem}.{}", session::VIDEO_EXT)
                };
                date_dir.join(name)
            })
            .collect();

        let mut raw_paths = Vec::new();
        let mut locks = Vec::new();
        for (device, target) in self.devices.iter_mut().take(2).zip(&targets) {
            match device.start(target).await {
                Ok(()) => {
                    match markers::acquire_lock(target, Duration::hours(SCHEDULER_LOCK_STALE_HOURS))
                    {
                        Ok(LockAttempt::Acquired(guard)) => locks.push(guard),
                        Ok(LockAttempt::Held) => {
                            tracing::warn!(
                                target = %target.display(),
                                "Session file already locked; continuing unlocked",
                            );
                        }
                        Err(e) => {
                            tracing::warn!(target = %target.display(), error = %e, "Failed to write lock marker");
                        }
                    }
                    raw_paths.push(target.clone());
                }
                Err(e) => {
                    tracing::error!(
                        target = %target.display(),
                        error = %e,
                        "Capture device failed to start",
                    );
                }
            }
        }

        if raw_paths.is_empty() {
            tracing::error!(
                booking_id = %booking.id,
                "No capture device started; will retry next tick",
            );
            return;
        }
        if raw_paths.len() < targets.len() {
            tracing::warn!(
                booking_id = %booking.id,
                started = raw_paths.len(),
                configured = targets.len(),
                "Recording in degraded mode",
            );
        }

        let sidecar = SessionSidecar {
            user_id: booking.user_id.clone(),
            camera_id: booking.camera_id.clone(),
            booking_id: booking.id.clone(),
            start_time: booking.start_time,
            end_time: booking.end_time,
        };
        if let Some(path) = session::sidecar_path(&raw_paths[0]) {
            if let Err(e) = sidecar.save(&path) {
                tracing::error!(path = %path.display(), error = %e, "Failed to write session sidecar");
                // Without a sidecar the worker cannot attribute the
                // recording; abort and retry the whole start next tick.
                self.stop_devices().await;
                return;
            }
        }

        tracing::info!(
            booking_id = %booking.id,
            cameras = raw_paths.len(),
            stem = %stem,
            "Recording started",
        );

        self.record_status(&booking.id, BookingStatus::Recording).await;
        self.state = SchedulerState::Recording(ActiveSession {
            booking,
            started_at: now,
            raw_paths,
            locks,
        });
    }

    /// Recording → Finalizing → Idle: stop devices, publish `.done`.
    async fn finalize_session(&mut self) {
        let session = match std::mem::replace(&mut self.state, SchedulerState::Idle) {
            SchedulerState::Recording(session) => session,
            SchedulerState::Idle => return,
        };

        self.stop_devices().await;

        for raw in &session.raw_paths {
            if let Err(e) = markers::mark_done(raw) {
                tracing::error!(raw = %raw.display(), error = %e, "Failed to write done marker");
            }
        }
        for lock in session.locks {
            lock.release();
        }

        tracing::info!(
            booking_id = %session.booking.id,
            files = session.raw_paths.len(),
            "Recording finalized",
        );
        self.record_status(&session.booking.id, BookingStatus::RecordingFinished)
            .await;
    }

    /// Stop every device that reports an active capture. Stop failures
    /// are logged and skipped; frames already on disk are preserved
    /// regardless, and a wedged device must not wedge the state machine.
    async fn stop_devices(&mut self) {
        for device in self.devices.iter_mut().take(2) {
            if device.is_recording() {
                if let Err(e) = device.stop().await {
                    tracing::error!(error = %e, "Capture device failed to stop");
                }
            }
        }
    }

    async fn record_status(&self, booking_id: &str, status: BookingStatus) {
        if let Some(sync) = &self.sync {
            sync.record_status(booking_id, status, None).await;
        }
    }
}
