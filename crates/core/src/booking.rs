//! Booking records and the booking status state machine.
//!
//! Bookings are created by the external reservation API and mirrored into
//! the local JSON cache. The scheduler and worker only move the `status`
//! field forward and delete bookings once terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Status strings
// ---------------------------------------------------------------------------

/// Booking created, waiting for its window to open.
pub const STATUS_SCHEDULED: &str = "scheduled";
/// Capture running on the appliance.
pub const STATUS_RECORDING: &str = "recording";
/// Capture finished, raw file waiting for the worker.
pub const STATUS_RECORDING_FINISHED: &str = "recordingfinished";
/// Worker validating/merging/branding the recording.
pub const STATUS_PROCESSING: &str = "processing";
/// Finished file being transferred to object storage.
pub const STATUS_UPLOADING: &str = "uploading";
/// Object stored; metadata insert pending.
pub const STATUS_UPLOADED: &str = "uploaded";
/// Delivered end to end; booking eligible for deletion.
pub const STATUS_COMPLETED: &str = "completed";
/// Unrecoverable failure; surfaced by the dashboard layer.
pub const STATUS_FAILED: &str = "failed";

/// All valid status strings.
pub const VALID_STATUSES: &[&str] = &[
    STATUS_SCHEDULED,
    STATUS_RECORDING,
    STATUS_RECORDING_FINISHED,
    STATUS_PROCESSING,
    STATUS_UPLOADING,
    STATUS_UPLOADED,
    STATUS_COMPLETED,
    STATUS_FAILED,
];

// ---------------------------------------------------------------------------
// Status enum
// ---------------------------------------------------------------------------

/// Lifecycle status of a booking, string-serialized in the cache file and
/// the remote database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    #[serde(rename = "scheduled")]
    Scheduled,
    #[serde(rename = "recording")]
    Recording,
    #[serde(rename = "recordingfinished")]
    RecordingFinished,
    #[serde(rename = "processing")]
    Processing,
    #[serde(rename = "uploading")]
    Uploading,
    #[serde(rename = "uploaded")]
    Uploaded,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
}

impl BookingStatus {
    /// Return the wire/database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => STATUS_SCHEDULED,
            Self::Recording => STATUS_RECORDING,
            Self::RecordingFinished => STATUS_RECORDING_FINISHED,
            Self::Processing => STATUS_PROCESSING,
            Self::Uploading => STATUS_UPLOADING,
            Self::Uploaded => STATUS_UPLOADED,
            Self::Completed => STATUS_COMPLETED,
            Self::Failed => STATUS_FAILED,
        }
    }

    /// Parse from a string, returning an error for unknown statuses.
    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            STATUS_SCHEDULED => Ok(Self::Scheduled),
            STATUS_RECORDING => Ok(Self::Recording),
            STATUS_RECORDING_FINISHED => Ok(Self::RecordingFinished),
            STATUS_PROCESSING => Ok(Self::Processing),
            STATUS_UPLOADING => Ok(Self::Uploading),
            STATUS_UPLOADED => Ok(Self::Uploaded),
            STATUS_COMPLETED => Ok(Self::Completed),
            STATUS_FAILED => Ok(Self::Failed),
            other => Err(CoreError::Validation(format!(
                "Unknown booking status: '{other}'. Valid statuses: {}",
                VALID_STATUSES.join(", ")
            ))),
        }
    }

    /// Whether this status admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns the set of statuses reachable from `self`.
    ///
    /// `Failed` is reachable from every non-terminal status; the forward
    /// path follows the delivery pipeline order.
    pub fn valid_transitions(&self) -> &'static [BookingStatus] {
        use BookingStatus::*;
        match self {
            Scheduled => &[Recording, Failed],
            Recording => &[RecordingFinished, Failed],
            RecordingFinished => &[Processing, Failed],
            Processing => &[Uploading, Failed],
            Uploading => &[Uploaded, Failed],
            Uploaded => &[Completed, Failed],
            Completed | Failed => &[],
        }
    }

    /// Check whether a transition from `self` to `to` is valid.
    pub fn can_transition(&self, to: BookingStatus) -> bool {
        self.valid_transitions().contains(&to)
    }
}

// ---------------------------------------------------------------------------
// Booking record
// ---------------------------------------------------------------------------

/// One reservation of one camera for one time window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub user_id: String,
    pub camera_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: BookingStatus,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
}

impl Booking {
    /// Whether `now` falls inside this booking's window (inclusive).
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.start_time <= now && now <= self.end_time
    }
}

/// Find the booking the scheduler should be recording right now.
///
/// Scans in iteration order and returns the **first** booking matching
/// `(user_id, camera_id)` whose window contains `now` and whose status has
/// not passed the recording stage. Overlapping bookings for the same
/// camera are a caller error; first-match is the contract here.
pub fn active_booking<'a>(
    bookings: &'a [Booking],
    user_id: &str,
    camera_id: &str,
    now: DateTime<Utc>,
) -> Option<&'a Booking> {
    bookings.iter().find(|b| {
        b.user_id == user_id
            && b.camera_id == camera_id
            && b.is_active_at(now)
            && matches!(
                b.status,
                BookingStatus::Scheduled | BookingStatus::Recording
            )
    })
}
