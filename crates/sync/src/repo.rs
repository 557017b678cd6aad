//! Queries against the remote bookings/videos/user_media tables.

use courtcam_core::booking::BookingStatus;
use courtcam_core::delivery::{UserMediaRecord, VideoMetadata};
use sqlx::PgPool;

use crate::SyncError;

/// Remote mirror operations for the pipeline.
pub struct BookingSyncRepo;

impl BookingSyncRepo {
    /// Update one booking's status (and error message) remotely.
    pub async fn update_status(
        pool: &PgPool,
        booking_id: &str,
        status: BookingStatus,
        error_message: Option<&str>,
    ) -> Result<(), SyncError> {
        sqlx::query(
            "UPDATE bookings
             SET status = $2, error_message = $3, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(booking_id)
        .bind(status.as_str())
        .bind(error_message)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Insert the delivery metadata row for an uploaded recording.
    pub async fn insert_video_metadata(
        pool: &PgPool,
        meta: &VideoMetadata,
    ) -> Result<(), SyncError> {
        sqlx::query(
            "INSERT INTO videos
                (user_id, video_url, date, recording_id, duration_seconds,
                 filename, storage_path, booking_id, uploaded_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (booking_id) DO NOTHING",
        )
        .bind(&meta.user_id)
        .bind(&meta.video_url)
        .bind(&meta.date)
        .bind(&meta.recording_id)
        .bind(meta.duration_seconds)
        .bind(&meta.filename)
        .bind(&meta.storage_path)
        .bind(&meta.booking_id)
        .bind(meta.uploaded_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Fetch a user's branding asset record, if any.
    pub async fn user_media(
        pool: &PgPool,
        user_id: &str,
    ) -> Result<Option<UserMediaRecord>, SyncError> {
        let row: Option<(Option<String>, Option<String>, Vec<String>)> = sqlx::query_as(
            "SELECT intro_video_url, logo_url,
                    ARRAY_REMOVE(ARRAY[sponsor_logo_1_url, sponsor_logo_2_url, sponsor_logo_3_url], NULL)
             FROM user_media
             WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(|(intro_video_url, logo_url, sponsor_logo_urls)| UserMediaRecord {
            intro_video_url,
            logo_url,
            sponsor_logo_urls,
        }))
    }
}
