//! The retrying, validating merge executor.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use courtcam_core::ffmpeg::{self, VideoInfo};
use courtcam_core::geometry::{self, DEFAULT_EDGE_TRIM, DEFAULT_FEATHER_WIDTH};

use crate::repair;
use crate::strategy::{build_filtergraph, MergeMethod};
use crate::MergeError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunables for the merge engine.
#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// Width of the feathered blend band, in pixels.
    pub feather_width: u32,
    /// Pixels trimmed from each source's outer edge.
    pub edge_trim: u32,
    /// Maximum transcode attempts before giving up.
    pub max_retries: u32,
    /// Per-attempt transcode timeout.
    pub timeout: Duration,
    /// Inputs below this size are unusable outright.
    pub min_input_bytes_hard: u64,
    /// Inputs below this size are suspicious; log a warning.
    pub min_input_bytes_warn: u64,
    /// Outputs below this size fail validation.
    pub min_output_bytes: u64,
    /// Codec the output is expected to carry; mismatch is a warning.
    pub expected_codec: String,
    /// Try the homography/panoramic stitcher before the geometric path.
    pub use_opencv_stitching: bool,
    /// External panoramic stitcher command.
    pub stitcher_command: Option<PathBuf>,
    /// Calibration data for the panoramic path; missing file disables it.
    pub calibration_path: Option<PathBuf>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            feather_width: DEFAULT_FEATHER_WIDTH,
            edge_trim: DEFAULT_EDGE_TRIM,
            max_retries: 3,
            timeout: Duration::from_secs(600),
            min_input_bytes_hard: 256 * 1024,
            min_input_bytes_warn: 1024 * 1024,
            min_output_bytes: 1024 * 1024,
            expected_codec: "h264".to_string(),
            use_opencv_stitching: false,
            stitcher_command: None,
            calibration_path: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Progress/outcome status of one merge invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    /// Output passed post-merge validation.
    Validated,
}

impl MergeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Validated => "validated",
        }
    }
}

/// Outcome of one merge invocation. Not persisted beyond the marker files
/// the caller writes.
#[derive(Debug, Clone)]
pub struct MergeResult {
    pub success: bool,
    pub status: MergeStatus,
    pub output_path: Option<PathBuf>,
    pub error_message: Option<String>,
    pub file_size: u64,
    /// Output duration in seconds (0 on failure).
    pub duration: f64,
    pub retry_count: u32,
    /// Wall-clock seconds the merge took.
    pub merge_time: f64,
}

impl MergeResult {
    fn failure(message: String, retry_count: u32, started: Instant) -> Self {
        Self {
            success: false,
            status: MergeStatus::Failed,
            output_path: None,
            error_message: Some(message),
            file_size: 0,
            duration: 0.0,
            retry_count,
            merge_time: started.elapsed().as_secs_f64(),
        }
    }

    fn validated(output: PathBuf, info: &VideoInfo, retry_count: u32, started: Instant) -> Self {
        Self {
            success: true,
            status: MergeStatus::Validated,
            output_path: Some(output),
            error_message: None,
            file_size: info.size_bytes,
            duration: info.duration_secs,
            retry_count,
            merge_time: started.elapsed().as_secs_f64(),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Stateless merge executor; all behavior comes from [`MergeConfig`], so
/// repeated calls with the same inputs behave identically.
#[derive(Debug, Clone)]
pub struct MergeEngine {
    config: MergeConfig,
}

impl MergeEngine {
    pub fn new(config: MergeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Merge `video1` (left) and `video2` (right) into `output`.
    ///
    /// Never returns `Err`: every failure mode is folded into the
    /// [`MergeResult`] so the calling worker has one place to look.
    pub async fn merge(
        &self,
        video1: &Path,
        video2: &Path,
        output: &Path,
        method: MergeMethod,
    ) -> MergeResult {
        let started = Instant::now();

        let info1 = match self.usable_input(video1).await {
            Ok(info) => info,
            Err(e) => return MergeResult::failure(e.to_string(), 0, started),
        };
        let info2 = match self.usable_input(video2).await {
            Ok(info) => info,
            Err(e) => return MergeResult::failure(e.to_string(), 0, started),
        };

        // Panoramic pre-pass, when enabled and calibrated. Any failure
        // falls back to the geometric path below.
        if self.config.use_opencv_stitching {
            if let Some(result) = self
                .try_panoramic(video1, video2, output, started)
                .await
            {
                return result;
            }
        }

        let plan = match geometry::compute_crop_plan(
            info1.width as u32,
            info1.height as u32,
            info2.width as u32,
            info2.height as u32,
            self.config.feather_width,
            self.config.edge_trim,
        ) {
            Ok(plan) => plan,
            Err(e) => {
                return MergeResult::failure(
                    format!("crop geometry rejected: {e}"),
                    0,
                    started,
                )
            }
        };

        let graph = build_filtergraph(method, &plan, info1.width as u32, info2.width as u32);
        let args = merge_args(video1, video2, &graph, output);

        let mut last_error = String::new();
        for attempt in 1..=self.config.max_retries.max(1) {
            tracing::info!(
                attempt,
                method = method.as_str(),
                output = %output.display(),
                "Merge attempt",
            );

            match self.run_attempt(&args, output).await {
                Ok(info) => {
                    return MergeResult::validated(output.to_path_buf(), &info, attempt - 1, started);
                }
                Err(e) => {
                    last_error = e.to_string();
                    tracing::warn!(
                        attempt,
                        error = %last_error,
                        "Merge attempt failed",
                    );
                    // Never leave a partial output for the next attempt
                    // (or the worker's scan) to trip over.
                    tokio::fs::remove_file(output).await.ok();

                    if attempt < self.config.max_retries.max(1) {
                        tokio::time::sleep(backoff_delay(attempt)).await;
                    }
                }
            }
        }

        self.write_debug_artifact(output, &args, &[(video1, info1.size_bytes), (video2, info2.size_bytes)])
            .await;

        MergeResult::failure(
            format!(
                "merge failed after {} attempts: {last_error}",
                self.config.max_retries.max(1)
            ),
            self.config.max_retries.max(1),
            started,
        )
    }

    /// One transcode attempt plus output validation.
    async fn run_attempt(&self, args: &[String], output: &Path) -> Result<VideoInfo, MergeError> {
        ffmpeg::run_ffmpeg(args, self.config.timeout).await?;
        self.validate_output(output).await
    }

    /// Validate an input, with one repair attempt for probe failures.
    async fn usable_input(&self, path: &Path) -> Result<VideoInfo, MergeError> {
        let meta = match tokio::fs::metadata(path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MergeError::InputNotFound(
                    path.to_string_lossy().to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        };

        // Below the hard floor there is nothing a remux could recover.
        if meta.len() < self.config.min_input_bytes_hard {
            return Err(MergeError::InputUnusable(format!(
                "{} is {} bytes, below the {} byte hard minimum",
                path.display(),
                meta.len(),
                self.config.min_input_bytes_hard
            )));
        }
        if meta.len() < self.config.min_input_bytes_warn {
            tracing::warn!(
                input = %path.display(),
                size = meta.len(),
                "Input is suspiciously small",
            );
        }

        match ffmpeg::validate_video_file(path, self.config.min_input_bytes_hard).await {
            Ok(info) => Ok(info),
            Err(probe_err) => {
                tracing::warn!(
                    input = %path.display(),
                    error = %probe_err,
                    "Input failed validation; attempting remux repair",
                );
                repair::attempt_repair(path, self.config.min_input_bytes_hard, self.config.timeout)
                    .await
                    .map_err(|e| {
                        MergeError::InputUnusable(format!(
                            "{}: unrepairable ({probe_err}; repair: {e})",
                            path.display()
                        ))
                    })?;
                ffmpeg::validate_video_file(path, self.config.min_input_bytes_hard)
                    .await
                    .map_err(|e| {
                        MergeError::InputUnusable(format!(
                            "{} still invalid after repair: {e}",
                            path.display()
                        ))
                    })
            }
        }
    }

    /// Validate the merged output: size floor, decodable stream, codec.
    async fn validate_output(&self, output: &Path) -> Result<VideoInfo, MergeError> {
        let info = ffmpeg::validate_video_file(output, self.config.min_output_bytes)
            .await
            .map_err(|e| MergeError::OutputInvalid(e.to_string()))?;

        if info.codec != self.config.expected_codec {
            tracing::warn!(
                output = %output.display(),
                codec = %info.codec,
                expected = %self.config.expected_codec,
                "Merged output codec differs from expected",
            );
        }
        Ok(info)
    }

    /// Homography-based panoramic stitch via the external stitcher.
    ///
    /// Returns `Some(result)` only on a validated success; every failure
    /// logs and returns `None` so the geometric path takes over.
    async fn try_panoramic(
        &self,
        video1: &Path,
        video2: &Path,
        output: &Path,
        started: Instant,
    ) -> Option<MergeResult> {
        let command = self.config.stitcher_command.as_ref()?;
        let calibration = match &self.config.calibration_path {
            Some(path) if path.exists() => path,
            _ => {
                tracing::warn!("Panoramic stitching enabled but calibration data missing");
                return None;
            }
        };

        let mut child = match tokio::process::Command::new(command)
            .arg("--calibration")
            .arg(calibration)
            .arg(video1)
            .arg(video2)
            .arg(output)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(error = %e, "Panoramic stitcher failed to spawn");
                return None;
            }
        };

        let status = match tokio::time::timeout(self.config.timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Panoramic stitcher failed");
                return None;
            }
            Err(_) => {
                child.kill().await.ok();
                tracing::warn!("Panoramic stitcher timed out; falling back to geometric merge");
                return None;
            }
        };

        if !status.success() {
            tracing::warn!(
                exit_code = status.code(),
                "Panoramic stitcher exited non-zero; falling back",
            );
            tokio::fs::remove_file(output).await.ok();
            return None;
        }

        match self.validate_output(output).await {
            Ok(info) => Some(MergeResult::validated(
                output.to_path_buf(),
                &info,
                0,
                started,
            )),
            Err(e) => {
                tracing::warn!(error = %e, "Panoramic output failed validation; falling back");
                tokio::fs::remove_file(output).await.ok();
                None
            }
        }
    }

    /// Dump the failed command line and input sizes for postmortem.
    async fn write_debug_artifact(
        &self,
        output: &Path,
        args: &[String],
        inputs: &[(&Path, u64)],
    ) {
        let path = debug_artifact_path(output);
        let mut contents = String::from("merge failure debug dump\n\ncommand:\nffmpeg -y");
        for arg in args {
            contents.push(' ');
            contents.push_str(arg);
        }
        contents.push_str("\n\ninputs:\n");
        for (input, size) in inputs {
            contents.push_str(&format!("  {} ({size} bytes)\n", input.display()));
        }
        if let Err(e) = tokio::fs::write(&path, contents).await {
            tracing::error!(path = %path.display(), error = %e, "Failed to write merge debug artifact");
        } else {
            tracing::info!(path = %path.display(), "Wrote merge debug artifact");
        }
    }
}

/// Full ffmpeg argument list for a merge (without the implicit `-y`).
pub fn merge_args(video1: &Path, video2: &Path, graph: &str, output: &Path) -> Vec<String> {
    vec![
        "-i".into(),
        video1.to_string_lossy().to_string(),
        "-i".into(),
        video2.to_string_lossy().to_string(),
        "-filter_complex".into(),
        graph.to_string(),
        "-map".into(),
        "[v]".into(),
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        "veryfast".into(),
        "-crf".into(),
        "23".into(),
        "-movflags".into(),
        "+faststart".into(),
        output.to_string_lossy().to_string(),
    ]
}

/// Exponential backoff between attempts: `2^attempt` seconds.
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt))
}

/// Where the postmortem dump for a failed merge lands.
pub fn debug_artifact_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".merge_debug.txt");
    output.with_file_name(name)
}
