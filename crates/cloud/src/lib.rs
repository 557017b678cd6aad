//! Object storage and network-facing helpers.
//!
//! Everything here is allowed to fail without consequence for local state:
//! the worker defers uploads to the pending queue when offline and skips
//! branding overlays whose assets cannot be fetched.

pub mod connectivity;
pub mod media_cache;
pub mod s3;

pub use media_cache::{BrandingAssets, MediaCache};
pub use s3::{object_key, S3Config, Uploader};

/// Errors from the cloud boundary.
#[derive(Debug, thiserror::Error)]
pub enum CloudError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
