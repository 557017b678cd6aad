//! Single-shot repair for inputs that fail container validation.
//!
//! A camera process killed mid-write can leave an MP4 without its trailer.
//! One remux pass with error tolerance often recovers the frames. The
//! original is snapshotted first and restored if the repair produces
//! nothing usable, so repair never makes an input worse.

use std::path::{Path, PathBuf};
use std::time::Duration;

use courtcam_core::ffmpeg;

use crate::MergeError;

/// Attempt an in-place remux repair of `input`.
///
/// On success the repaired file sits at `input` and the backup is
/// removed. On failure the original bytes are restored and an error is
/// returned.
pub async fn attempt_repair(
    input: &Path,
    min_bytes: u64,
    timeout: Duration,
) -> Result<(), MergeError> {
    let backup = backup_path(input);
    tokio::fs::copy(input, &backup).await?;

    let repaired = input.with_extension("repaired.mp4");
    let result = run_repair(input, &repaired, min_bytes, timeout).await;

    match result {
        Ok(()) => {
            tokio::fs::rename(&repaired, input).await?;
            tokio::fs::remove_file(&backup).await.ok();
            tracing::info!(input = %input.display(), "Input repaired by remux");
            Ok(())
        }
        Err(e) => {
            tokio::fs::remove_file(&repaired).await.ok();
            // Restore the snapshot so later diagnostics see the original.
            if let Err(restore_err) = tokio::fs::rename(&backup, input).await {
                tracing::error!(
                    input = %input.display(),
                    error = %restore_err,
                    "Failed to restore backup after repair failure",
                );
            }
            Err(e)
        }
    }
}

async fn run_repair(
    input: &Path,
    repaired: &Path,
    min_bytes: u64,
    timeout: Duration,
) -> Result<(), MergeError> {
    let args: Vec<String> = vec![
        "-err_detect".into(),
        "ignore_err".into(),
        "-i".into(),
        input.to_string_lossy().to_string(),
        "-c".into(),
        "copy".into(),
        "-movflags".into(),
        "+faststart".into(),
        repaired.to_string_lossy().to_string(),
    ];
    ffmpeg::run_ffmpeg(&args, timeout).await?;

    ffmpeg::validate_video_file(repaired, min_bytes)
        .await
        .map_err(|e| MergeError::InputUnusable(format!("repair produced invalid file: {e}")))?;
    Ok(())
}

/// Backup snapshot path for a repair attempt.
pub fn backup_path(input: &Path) -> PathBuf {
    let mut name = input
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".bak");
    input.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_path_appends_bak() {
        assert_eq!(
            backup_path(Path::new("/rec/143000-143500_cam1.mp4")),
            Path::new("/rec/143000-143500_cam1.mp4.bak")
        );
    }

    #[tokio::test]
    async fn failed_repair_restores_original() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("broken.mp4");
        // Garbage bytes: ffmpeg (if present) fails to remux, and if ffmpeg
        // is absent the spawn error takes the same restore path.
        std::fs::write(&input, b"definitely not an mp4").unwrap();

        let result = attempt_repair(&input, 1024, Duration::from_secs(30)).await;
        assert!(result.is_err());

        let restored = std::fs::read(&input).unwrap();
        assert_eq!(restored, b"definitely not an mp4");
        assert!(!backup_path(&input).exists());
    }
}
