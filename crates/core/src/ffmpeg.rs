//! FFmpeg/FFprobe shared command utilities.
//!
//! Every external transcode in the pipeline goes through [`run_ffmpeg`]
//! (explicit timeout, kill on expiry) and every container/stream check
//! goes through [`probe_video`] / [`validate_video_file`].

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Error type for FFmpeg/FFprobe operations.
#[derive(Debug, thiserror::Error)]
pub enum FfmpegError {
    #[error("ffprobe/ffmpeg binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("ffprobe/ffmpeg execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("ffmpeg timed out after {0:?} and was killed")]
    Timeout(Duration),

    #[error("failed to parse ffprobe output: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("video file not found: {0}")]
    VideoNotFound(String),

    #[error("video file invalid: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// ffprobe JSON output structures
// ---------------------------------------------------------------------------

/// Top-level ffprobe JSON output (`-print_format json -show_format -show_streams`).
#[derive(Debug, Deserialize)]
pub struct FfprobeOutput {
    pub streams: Vec<FfprobeStream>,
    pub format: FfprobeFormat,
}

/// A single stream from ffprobe output.
#[derive(Debug, Deserialize)]
pub struct FfprobeStream {
    pub index: i32,
    pub codec_name: Option<String>,
    pub codec_type: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub duration: Option<String>,
}

/// Format-level metadata from ffprobe.
#[derive(Debug, Deserialize)]
pub struct FfprobeFormat {
    pub duration: Option<String>,
    pub size: Option<String>,
    pub format_name: Option<String>,
}

// ---------------------------------------------------------------------------
// Probing
// ---------------------------------------------------------------------------

/// Run `ffprobe` on a video file and return the parsed JSON output.
pub async fn probe_video(path: &Path) -> Result<FfprobeOutput, FfmpegError> {
    if !path.exists() {
        return Err(FfmpegError::VideoNotFound(
            path.to_string_lossy().to_string(),
        ));
    }

    let output = tokio::process::Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output()
        .await
        .map_err(FfmpegError::NotFound)?;

    if !output.status.success() {
        return Err(FfmpegError::ExecutionFailed {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str::<FfprobeOutput>(&stdout)
        .map_err(|e| FfmpegError::ParseError(format!("{e}: {stdout}")))
}

/// Find the first video stream in the ffprobe output.
pub fn first_video_stream(probe: &FfprobeOutput) -> Option<&FfprobeStream> {
    probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
}

/// Parse the video duration in seconds from ffprobe output.
pub fn parse_duration(probe: &FfprobeOutput) -> f64 {
    if let Some(d) = &probe.format.duration {
        if let Ok(secs) = d.parse::<f64>() {
            return secs;
        }
    }
    if let Some(stream) = first_video_stream(probe) {
        if let Some(d) = &stream.duration {
            if let Ok(secs) = d.parse::<f64>() {
                return secs;
            }
        }
    }
    0.0
}

/// Find the first video stream's resolution.
pub fn parse_resolution(probe: &FfprobeOutput) -> (i32, i32) {
    first_video_stream(probe)
        .map(|s| (s.width.unwrap_or(0), s.height.unwrap_or(0)))
        .unwrap_or((0, 0))
}

/// Find the first video stream's codec name.
pub fn parse_video_codec(probe: &FfprobeOutput) -> String {
    first_video_stream(probe)
        .and_then(|s| s.codec_name.clone())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Everything the pipeline needs to know about a validated video file.
#[derive(Debug, Clone)]
pub struct VideoInfo {
    pub width: i32,
    pub height: i32,
    pub duration_secs: f64,
    pub codec: String,
    pub size_bytes: u64,
}

/// Validate that `path` is a readable, decodable video file.
///
/// Checks, cheapest first: the file exists, its size is at least
/// `min_bytes`, ffprobe sees at least one video stream, and the duration
/// is non-zero. Returns the probed [`VideoInfo`] on success.
pub async fn validate_video_file(path: &Path, min_bytes: u64) -> Result<VideoInfo, FfmpegError> {
    let meta = tokio::fs::metadata(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            FfmpegError::VideoNotFound(path.to_string_lossy().to_string())
        } else {
            FfmpegError::IoError(e)
        }
    })?;

    if meta.len() < min_bytes {
        return Err(FfmpegError::Invalid(format!(
            "{} is {} bytes, below the {} byte minimum",
            path.display(),
            meta.len(),
            min_bytes
        )));
    }

    let probe = probe_video(path).await?;
    let stream = first_video_stream(&probe).ok_or_else(|| {
        FfmpegError::Invalid(format!("{} has no decodable video stream", path.display()))
    })?;

    let duration = parse_duration(&probe);
    if duration <= 0.0 {
        return Err(FfmpegError::Invalid(format!(
            "{} has zero duration",
            path.display()
        )));
    }

    Ok(VideoInfo {
        width: stream.width.unwrap_or(0),
        height: stream.height.unwrap_or(0),
        duration_secs: duration,
        codec: stream.codec_name.clone().unwrap_or_default(),
        size_bytes: meta.len(),
    })
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Run `ffmpeg` with the given arguments under an explicit timeout.
///
/// The child is killed if the timeout expires; stderr is captured for the
/// error path. Arguments should not include the leading `-y` — it is
/// always added so reruns over a partial output never hang on a prompt.
pub async fn run_ffmpeg(args: &[String], timeout: Duration) -> Result<(), FfmpegError> {
    let mut child = tokio::process::Command::new("ffmpeg")
        .arg("-y")
        .args(args)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .map_err(FfmpegError::NotFound)?;

    // Drain stderr concurrently; ffmpeg is chatty enough to fill the
    // pipe buffer and deadlock a plain wait().
    let stderr = child.stderr.take();
    let drain = tokio::spawn(async move {
        let mut buf = String::new();
        if let Some(mut stderr) = stderr {
            use tokio::io::AsyncReadExt;
            stderr.read_to_string(&mut buf).await.ok();
        }
        buf
    });

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => status?,
        Err(_) => {
            child.kill().await.ok();
            drain.abort();
            return Err(FfmpegError::Timeout(timeout));
        }
    };

    if !status.success() {
        let buf = drain.await.unwrap_or_default();
        return Err(FfmpegError::ExecutionFailed {
            exit_code: status.code(),
            stderr: tail(&buf, 2048),
        });
    }

    Ok(())
}

/// Last `max` bytes of a string, for keeping ffmpeg's noisy stderr usable.
fn tail(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let start = s.len() - max;
    // Avoid splitting a UTF-8 sequence.
    let start = (start..s.len()).find(|&i| s.is_char_boundary(i)).unwrap_or(start);
    s[start..].to_string()
}
