//! Delivery payloads shared between the worker, the upload queue, and the
//! remote database mirror.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata row recorded in the remote database after a successful upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub user_id: String,
    pub video_url: String,
    /// Calendar date of the recording, `YYYY-MM-DD`.
    pub date: String,
    /// Session stem, e.g. `143000-143500`.
    pub recording_id: String,
    pub duration_seconds: f64,
    pub filename: String,
    /// Object storage key, `{user_id}/{date}/{filename}`.
    pub storage_path: String,
    pub booking_id: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Per-user branding assets resolved from the remote database. URLs point
/// into object storage; the worker materializes them through the local
/// media cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserMediaRecord {
    pub intro_video_url: Option<String>,
    pub logo_url: Option<String>,
    /// Up to three sponsor logos, overlaid along the bottom edge.
    #[serde(default)]
    pub sponsor_logo_urls: Vec<String>,
}

/// Maximum number of sponsor logos applied to one recording.
pub const MAX_SPONSOR_LOGOS: usize = 3;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_metadata_round_trip() {
        let meta = VideoMetadata {
            user_id: "u1".into(),
            video_url: "https://cdn.example.com/u1/2025-01-01/000001-000201.mp4".into(),
            date: "2025-01-01".into(),
            recording_id: "000001-000201".into(),
            duration_seconds: 120.0,
            filename: "000001-000201.mp4".into(),
            storage_path: "u1/2025-01-01/000001-000201.mp4".into(),
            booking_id: "b1".into(),
            uploaded_at: Utc::now(),
        };
        let json = serde_json::to_string(&meta).unwrap();
        let back: VideoMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back.booking_id, "b1");
        assert_eq!(back.storage_path, meta.storage_path);
    }

    #[test]
    fn user_media_defaults_to_empty() {
        let record: UserMediaRecord = serde_json::from_str("{}").unwrap();
        assert!(record.intro_video_url.is_none());
        assert!(record.sponsor_logo_urls.is_empty());
    }
}
