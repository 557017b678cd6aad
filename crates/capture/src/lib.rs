//! Capture primitive boundary.
//!
//! The pipeline treats a camera as an opaque device that records a file
//! for as long as it is told to. [`CaptureDevice`] is the seam: the
//! production implementation shells out to `rpicam-vid`, and the
//! [`mock::MockDevice`] double stands in for hardware in tests.

pub mod mock;
pub mod rpicam;

use std::path::Path;

pub use rpicam::{detect_available, RpicamDevice};

/// Errors from the capture boundary.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("capture binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("camera {camera}: failed to start capture: {reason}")]
    StartFailed { camera: u32, reason: String },

    #[error("capture process exited early (code {exit_code:?})")]
    ExitedEarly { exit_code: Option<i32> },

    #[error("no capture in progress")]
    NotRecording,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One attached camera, as reported by device detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraInfo {
    /// Index usable as `--camera N`.
    pub index: u32,
    /// Sensor model string, when the tooling reports one.
    pub model: String,
}

/// An opaque recording device.
///
/// `start` begins writing to `output` and returns once the capture
/// process is up; `stop` ends the recording and waits (bounded by the
/// implementation) for the container to be finalized.
#[async_trait::async_trait]
pub trait CaptureDevice: Send {
    async fn start(&mut self, output: &Path) -> Result<(), CaptureError>;
    async fn stop(&mut self) -> Result<(), CaptureError>;
    fn is_recording(&self) -> bool;
}
