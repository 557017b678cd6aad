//! Merge/stitch engine for dual-camera recordings.
//!
//! Combines two camera files into one deliverable behind a retrying,
//! validating interface. Method selection is an enum dispatched to
//! strategy functions that all share one crop-geometry validation
//! ([`courtcam_core::geometry`]); transient transcode failures retry with
//! exponential backoff; terminal failures leave a debug artifact next to
//! the intended output.

pub mod engine;
pub mod repair;
pub mod strategy;

pub use engine::{MergeConfig, MergeEngine, MergeResult, MergeStatus};
pub use strategy::MergeMethod;

/// Errors surfaced by the merge engine.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("input not found: {0}")]
    InputNotFound(String),

    #[error("input unusable: {0}")]
    InputUnusable(String),

    #[error("invalid crop geometry: {0}")]
    Geometry(String),

    #[error("transcode failed: {0}")]
    Transcode(#[from] courtcam_core::ffmpeg::FfmpegError),

    #[error("output validation failed: {0}")]
    OutputInvalid(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
