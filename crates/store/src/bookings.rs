//! Local JSON mirror of the remote bookings table.
//!
//! The external reservation API writes new bookings into this file; the
//! scheduler only reads it; the worker updates statuses and deletes
//! bookings on completion. Writers rewrite the whole file through a
//! temp-file + rename so concurrent readers never see a torn write.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use courtcam_core::booking::{Booking, BookingStatus};
use serde::Deserialize;

use crate::error::StoreError;

/// The cache file is accepted in two shapes for backward compatibility:
/// a bare array of bookings, or an envelope object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CacheShape {
    List(Vec<Booking>),
    Envelope {
        bookings: Vec<Booking>,
        #[serde(default)]
        #[allow(dead_code)]
        last_updated: Option<DateTime<Utc>>,
        #[serde(default)]
        #[allow(dead_code)]
        user_id: Option<String>,
        #[serde(default)]
        #[allow(dead_code)]
        camera_id: Option<String>,
    },
}

/// Handle to the booking cache file.
#[derive(Debug, Clone)]
pub struct BookingStore {
    path: PathBuf,
}

impl BookingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all bookings. A missing file is an empty list; a corrupt file
    /// is an error so callers can log it rather than silently dropping
    /// every booking.
    pub fn load(&self) -> Result<Vec<Booking>, StoreError> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let shape: CacheShape = serde_json::from_str(&data)?;
        Ok(match shape {
            CacheShape::List(bookings) => bookings,
            CacheShape::Envelope { bookings, .. } => bookings,
        })
    }

    /// Replace the cache contents, atomically. Always writes the bare
    /// array shape.
    pub fn save(&self, bookings: &[Booking]) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(bookings)?;
        write_atomic(&self.path, json.as_bytes())?;
        Ok(())
    }

    /// Update the status (and error message) of one booking in place.
    ///
    /// Unknown IDs are a no-op: the booking may already have been removed
    /// by a completed delivery racing this update.
    pub fn update_status(
        &self,
        booking_id: &str,
        status: BookingStatus,
        error_message: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut bookings = self.load()?;
        let mut changed = false;
        for booking in bookings.iter_mut() {
            if booking.id == booking_id {
                booking.status = status;
                booking.error_message = error_message.map(|s| s.to_string());
                changed = true;
            }
        }
        if changed {
            self.save(&bookings)?;
        }
        Ok(())
    }

    /// Remove a booking from the cache (on completed delivery).
    pub fn remove(&self, booking_id: &str) -> Result<(), StoreError> {
        let mut bookings = self.load()?;
        let before = bookings.len();
        bookings.retain(|b| b.id != booking_id);
        if bookings.len() != before {
            self.save(&bookings)?;
        }
        Ok(())
    }

    /// Remove bookings whose window ended more than `retention` ago.
    ///
    /// Age-based regardless of status: a booking long past its window
    /// will never record again, and delivery does not need the cache
    /// entry (the sidecar carries the attribution). Returns how many
    /// were pruned.
    pub fn prune_expired(
        &self,
        now: DateTime<Utc>,
        retention: chrono::Duration,
    ) -> Result<usize, StoreError> {
        let mut bookings = self.load()?;
        let before = bookings.len();
        bookings.retain(|b| now - b.end_time <= retention);
        let pruned = before - bookings.len();
        if pruned > 0 {
            self.save(&bookings)?;
        }
        Ok(pruned)
    }
}

/// Write `data` to `path` via a same-directory temp file and rename.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let tmp = path.with_extension("tmp");
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
