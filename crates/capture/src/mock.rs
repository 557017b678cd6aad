//! In-memory capture double for scheduler and worker tests.

use std::path::{Path, PathBuf};

use crate::{CaptureDevice, CaptureError};

/// Test double that "records" by writing a fixed payload on `start`.
#[derive(Debug, Default)]
pub struct MockDevice {
    recording: bool,
    /// Paths this device has been asked to record to, in order.
    pub started: Vec<PathBuf>,
    /// Number of completed stop calls.
    pub stops: usize,
    /// When set, the next `start` fails with this reason.
    pub fail_next_start: Option<String>,
    /// Bytes written to the output file on `start`.
    pub payload: Vec<u8>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self {
            payload: b"mock video payload".to_vec(),
            ..Default::default()
        }
    }
}

#[async_trait::async_trait]
impl CaptureDevice for MockDevice {
    async fn start(&mut self, output: &Path) -> Result<(), CaptureError> {
        if let Some(reason) = self.fail_next_start.take() {
            return Err(CaptureError::StartFailed { camera: 0, reason });
        }
        std::fs::write(output, &self.payload)?;
        self.started.push(output.to_path_buf());
        self.recording = true;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        if !self.recording {
            return Err(CaptureError::NotRecording);
        }
        self.recording = false;
        self.stops += 1;
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.recording
    }
}
