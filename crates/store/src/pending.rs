//! Durable queue of uploads deferred while the appliance is offline.
//!
//! An entry stays in the queue until its upload and the remote metadata
//! insert both succeed. Removal rewrites the whole file atomically so a
//! crash mid-removal can duplicate work (the upload is keyed, so a rerun
//! overwrites the same object) but never lose an entry.

use std::path::{Path, PathBuf};

use courtcam_core::delivery::VideoMetadata;
use serde::{Deserialize, Serialize};

use crate::bookings::write_atomic;
use crate::error::StoreError;

/// One deferred upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingUpload {
    /// Finished local file awaiting transfer.
    pub final_file: PathBuf,
    /// Object storage key it will be uploaded under.
    pub s3_key: String,
    /// Metadata row to insert once the upload lands.
    pub meta: VideoMetadata,
}

/// Handle to the pending-upload queue file.
#[derive(Debug, Clone)]
pub struct PendingUploadQueue {
    path: PathBuf,
}

impl PendingUploadQueue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all queued entries. Missing file is an empty queue.
    pub fn load(&self) -> Result<Vec<PendingUpload>, StoreError> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&data)?)
    }

    /// Append an entry.
    pub fn push(&self, entry: PendingUpload) -> Result<(), StoreError> {
        let mut entries = self.load()?;
        entries.push(entry);
        self.replace(&entries)
    }

    /// Rewrite the queue with exactly `entries`.
    pub fn replace(&self, entries: &[PendingUpload]) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(entries)?;
        write_atomic(&self.path, json.as_bytes())
    }

    /// Number of queued entries.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.load()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.load()?.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(key: &str) -> PendingUpload {
        PendingUpload {
            final_file: PathBuf::from(format!("/processed/{key}")),
            s3_key: format!("u1/2025-01-01/{key}"),
            meta: VideoMetadata {
                user_id: "u1".into(),
                video_url: format!("https://cdn.example.com/{key}"),
                date: "2025-01-01".into(),
                recording_id: "143000-143500".into(),
                duration_seconds: 300.0,
                filename: key.into(),
                storage_path: format!("u1/2025-01-01/{key}"),
                booking_id: "b1".into(),
                uploaded_at: Utc::now(),
            },
        }
    }

    fn queue() -> (tempfile::TempDir, PendingUploadQueue) {
        let dir = tempfile::tempdir().unwrap();
        let queue = PendingUploadQueue::new(dir.path().join("pending.json"));
        (dir, queue)
    }

    #[test]
    fn missing_file_is_empty() {
        let (_dir, queue) = queue();
        assert!(queue.load().unwrap().is_empty());
        assert!(queue.is_empty().unwrap());
    }

    #[test]
    fn push_appends() {
        let (_dir, queue) = queue();
        queue.push(entry("a.mp4")).unwrap();
        queue.push(entry("b.mp4")).unwrap();
        let entries = queue.load().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].s3_key, "u1/2025-01-01/a.mp4");
        assert_eq!(entries[1].s3_key, "u1/2025-01-01/b.mp4");
    }

    #[test]
    fn replace_rewrites_exactly() {
        let (_dir, queue) = queue();
        queue.push(entry("a.mp4")).unwrap();
        queue.push(entry("b.mp4")).unwrap();
        queue.push(entry("c.mp4")).unwrap();

        // Simulate delivering the middle entry.
        let remaining: Vec<PendingUpload> = queue
            .load()
            .unwrap()
            .into_iter()
            .filter(|e| e.s3_key != "u1/2025-01-01/b.mp4")
            .collect();
        queue.replace(&remaining).unwrap();

        let keys: Vec<String> = queue.load().unwrap().into_iter().map(|e| e.s3_key).collect();
        assert_eq!(keys, vec!["u1/2025-01-01/a.mp4", "u1/2025-01-01/c.mp4"]);
    }

    #[test]
    fn entries_survive_reopen() {
        let (_dir, queue) = queue();
        queue.push(entry("a.mp4")).unwrap();
        let reopened = PendingUploadQueue::new(queue.path());
        assert_eq!(reopened.len().unwrap(), 1);
    }
}
