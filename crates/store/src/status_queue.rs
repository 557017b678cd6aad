//! Durable queue of booking status updates awaiting remote delivery.
//!
//! Early revisions of the appliance fired status updates at the remote
//! database and dropped them on any failure. Every update is now enqueued
//! here first and flushed opportunistically, so a remote outage delays
//! status history instead of losing it. Order is preserved per booking
//! because the queue is drained front to back and the flush stops at the
//! first delivery failure.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use courtcam_core::booking::BookingStatus;
use serde::{Deserialize, Serialize};

use crate::bookings::write_atomic;
use crate::error::StoreError;

/// One queued status transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub booking_id: String,
    pub status: BookingStatus,
    #[serde(default)]
    pub error_message: Option<String>,
    pub queued_at: DateTime<Utc>,
}

/// Handle to the status-update queue file.
#[derive(Debug, Clone)]
pub struct StatusQueue {
    path: PathBuf,
}

impl StatusQueue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all queued updates, oldest first. Missing file is empty.
    pub fn load(&self) -> Result<Vec<StatusUpdate>, StoreError> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&data)?)
    }

    /// Append an update to the back of the queue.
    pub fn push(
        &self,
        booking_id: &str,
        status: BookingStatus,
        error_message: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut entries = self.load()?;
        entries.push(StatusUpdate {
            booking_id: booking_id.to_string(),
            status,
            error_message: error_message.map(|s| s.to_string()),
            queued_at: Utc::now(),
        });
        self.replace(&entries)
    }

    /// Drop the first `delivered` entries (those successfully flushed).
    pub fn pop_front(&self, delivered: usize) -> Result<(), StoreError> {
        if delivered == 0 {
            return Ok(());
        }
        let entries = self.load()?;
        let remaining: Vec<StatusUpdate> = entries.into_iter().skip(delivered).collect();
        self.replace(&remaining)
    }

    fn replace(&self, entries: &[StatusUpdate]) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(entries)?;
        write_atomic(&self.path, json.as_bytes())
    }
}
