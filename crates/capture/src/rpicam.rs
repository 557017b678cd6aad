//! `rpicam-vid` backed capture device.
//!
//! One [`RpicamDevice`] owns one camera index and at most one child
//! process. Stop sends SIGINT first so `rpicam-vid` can finalize the MP4
//! container, then escalates to SIGKILL after a bounded wait. A device
//! whose sensor read degrades mid-recording keeps whatever frames the
//! child manages to write; the pipeline prefers partial footage over
//! none.

use std::path::Path;
use std::time::Duration;

use tokio::process::{Child, Command};

use crate::{CameraInfo, CaptureDevice, CaptureError};

/// How long `stop` waits after SIGINT before killing the child.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// `rpicam-vid` capture device for one camera index.
#[derive(Debug)]
pub struct RpicamDevice {
    camera_index: u32,
    /// Extra arguments appended to every invocation (resolution, bitrate).
    extra_args: Vec<String>,
    child: Option<Child>,
}

impl RpicamDevice {
    pub fn new(camera_index: u32) -> Self {
        Self {
            camera_index,
            extra_args: vec![
                "--width".into(),
                "1920".into(),
                "--height".into(),
                "1080".into(),
                "--framerate".into(),
                "30".into(),
            ],
            child: None,
        }
    }

    /// Override the default capture arguments (resolution, framerate).
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    pub fn camera_index(&self) -> u32 {
        self.camera_index
    }
}

#[async_trait::async_trait]
impl CaptureDevice for RpicamDevice {
    async fn start(&mut self, output: &Path) -> Result<(), CaptureError> {
        if self.child.is_some() {
            return Err(CaptureError::StartFailed {
                camera: self.camera_index,
                reason: "capture already in progress".into(),
            });
        }

        let mut child = Command::new("rpicam-vid")
            .arg("--camera")
            .arg(self.camera_index.to_string())
            // Record until signalled.
            .args(["-t", "0"])
            .args(["--codec", "libav", "--libav-format", "mp4"])
            .args(&self.extra_args)
            .arg("-o")
            .arg(output)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(CaptureError::NotFound)?;

        // A busy sensor or bad index makes rpicam-vid exit within a few
        // hundred milliseconds; catch that here so the scheduler sees a
        // start failure instead of a zero-byte recording.
        tokio::time::sleep(Duration::from_millis(500)).await;
        if let Some(status) = child.try_wait()? {
            return Err(CaptureError::StartFailed {
                camera: self.camera_index,
                reason: format!("rpicam-vid exited immediately (code {:?})", status.code()),
            });
        }

        tracing::info!(
            camera = self.camera_index,
            output = %output.display(),
            "Capture started",
        );
        self.child = Some(child);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        let mut child = self.child.take().ok_or(CaptureError::NotRecording)?;

        if let Some(pid) = child.id() {
            // SIGINT lets rpicam-vid write the MP4 trailer.
            unsafe {
                libc::kill(pid as i32, libc::SIGINT);
            }
        }

        match tokio::time::timeout(STOP_GRACE, child.wait()).await {
            Ok(status) => {
                let status = status?;
                tracing::info!(
                    camera = self.camera_index,
                    exit_code = status.code(),
                    "Capture stopped",
                );
            }
            Err(_) => {
                tracing::warn!(
                    camera = self.camera_index,
                    "Capture did not stop within grace period; killing",
                );
                child.kill().await.ok();
            }
        }
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.child.is_some()
    }
}

/// Enumerate attached cameras via `rpicam-hello --list-cameras`.
///
/// Output lines look like `0 : imx708 [4608x2592 ...] (/base/soc/...)`.
/// A missing binary or non-zero exit yields an empty list with a warning;
/// detection failures should not stop the scheduler from booting.
pub async fn detect_available() -> Vec<CameraInfo> {
    let output = match Command::new("rpicam-hello")
        .arg("--list-cameras")
        .output()
        .await
    {
        Ok(output) => output,
        Err(e) => {
            tracing::warn!(error = %e, "rpicam-hello not available; no cameras detected");
            return Vec::new();
        }
    };

    if !output.status.success() {
        tracing::warn!(
            exit_code = output.status.code(),
            "rpicam-hello --list-cameras failed",
        );
        return Vec::new();
    }

    parse_camera_list(&String::from_utf8_lossy(&output.stdout))
}

/// Parse `--list-cameras` output into camera infos.
fn parse_camera_list(stdout: &str) -> Vec<CameraInfo> {
    let mut cameras = Vec::new();
    for line in stdout.lines() {
        let line = line.trim();
        let Some((index_part, rest)) = line.split_once(':') else {
            continue;
        };
        let Ok(index) = index_part.trim().parse::<u32>() else {
            continue;
        };
        let model = rest
            .trim()
            .split_whitespace()
            .next()
            .unwrap_or("unknown")
            .to_string();
        cameras.push(CameraInfo { index, model });
    }
    cameras
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_typical_listing() {
        let stdout = "Available cameras\n\
                      -----------------\n\
                      0 : imx708 [4608x2592 10-bit RGGB] (/base/soc/i2c0mux/i2c@1/imx708@1a)\n\
                      1 : imx219 [3280x2464 10-bit RGGB] (/base/soc/i2c0mux/i2c@0/imx219@10)\n";
        let cameras = parse_camera_list(stdout);
        assert_eq!(cameras.len(), 2);
        assert_eq!(cameras[0], CameraInfo { index: 0, model: "imx708".into() });
        assert_eq!(cameras[1], CameraInfo { index: 1, model: "imx219".into() });
    }

    #[test]
    fn parse_empty_listing() {
        assert!(parse_camera_list("No cameras available!\n").is_empty());
    }

    #[test]
    fn parse_skips_malformed_lines() {
        let stdout = "header\nx : not-an-index\n0 : imx708 [stuff]\n";
        let cameras = parse_camera_list(stdout);
        assert_eq!(cameras.len(), 1);
        assert_eq!(cameras[0].index, 0);
    }

    #[test]
    fn fresh_device_not_recording() {
        let device = RpicamDevice::new(0);
        assert!(!device.is_recording());
    }

    #[tokio::test]
    async fn stop_without_start_errors() {
        let mut device = RpicamDevice::new(0);
        assert!(matches!(
            device.stop().await,
            Err(CaptureError::NotRecording)
        ));
    }
}
