//! Delivery seam: connectivity, upload, and metadata insert behind one
//! trait.
//!
//! The production implementation pairs the S3 uploader with the remote
//! database pool; tests substitute an in-memory double so the full
//! worker loop can run against temp directories.

use std::path::Path;
use std::time::Duration;

use courtcam_cloud::{connectivity, CloudError, Uploader};
use courtcam_core::delivery::{UserMediaRecord, VideoMetadata};
use courtcam_sync::{BookingSyncRepo, SyncError};
use sqlx::PgPool;

/// Errors from a delivery attempt. Both variants defer the item to the
/// pending-upload queue; the split exists for logging.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("upload failed: {0}")]
    Upload(#[from] CloudError),

    #[error("metadata insert failed: {0}")]
    Insert(#[from] SyncError),
}

/// Uploads a finished file and records its metadata remotely.
#[async_trait::async_trait]
pub trait Delivery: Send + Sync {
    /// Whether the network is reachable right now.
    async fn is_online(&self) -> bool;

    /// Public URL an object uploaded under `key` will be served from.
    fn public_url(&self, key: &str) -> String;

    /// Upload `local` under `key`.
    async fn upload(&self, local: &Path, key: &str) -> Result<(), DeliveryError>;

    /// Insert the delivery metadata row.
    async fn insert_metadata(&self, meta: &VideoMetadata) -> Result<(), DeliveryError>;

    /// Branding record for a user, `None` when absent or unreachable.
    async fn user_media(&self, user_id: &str) -> Option<UserMediaRecord>;
}

/// Production delivery: S3 + Postgres.
pub struct S3Delivery {
    uploader: Uploader,
    pool: PgPool,
    probe_url: String,
    probe_timeout: Duration,
}

impl S3Delivery {
    pub fn new(uploader: Uploader, pool: PgPool, probe_url: String, probe_timeout: Duration) -> Self {
        Self {
            uploader,
            pool,
            probe_url,
            probe_timeout,
        }
    }
}

#[async_trait::async_trait]
impl Delivery for S3Delivery {
    async fn is_online(&self) -> bool {
        connectivity::is_online(&self.probe_url, self.probe_timeout).await
    }

    fn public_url(&self, key: &str) -> String {
        self.uploader.public_url(key)
    }

    async fn upload(&self, local: &Path, key: &str) -> Result<(), DeliveryError> {
        self.uploader.upload_video(local, key).await?;
        Ok(())
    }

    async fn insert_metadata(&self, meta: &VideoMetadata) -> Result<(), DeliveryError> {
        BookingSyncRepo::insert_video_metadata(&self.pool, meta).await?;
        Ok(())
    }

    async fn user_media(&self, user_id: &str) -> Option<UserMediaRecord> {
        match BookingSyncRepo::user_media(&self.pool, user_id).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Could not fetch branding record");
                None
            }
        }
    }
}
