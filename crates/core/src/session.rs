//! Recording session naming and sidecar metadata.
//!
//! A session is the on-disk artifact set for one booking's capture: the raw
//! video file(s), a JSON sidecar, and the marker files. All names derive
//! from a `HHMMSS-HHMMSS` stem (booking start/end, UTC) inside a
//! `YYYY-MM-DD` directory.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Suffix for the first camera of a dual rig.
pub const CAM1_SUFFIX: &str = "_cam1";
/// Suffix for the second camera of a dual rig.
pub const CAM2_SUFFIX: &str = "_cam2";
/// Suffix for a merged dual-camera output.
pub const MERGED_SUFFIX: &str = "_merged";

/// Container extension used for every recording artifact.
pub const VIDEO_EXT: &str = "mp4";

// ---------------------------------------------------------------------------
// Naming
// ---------------------------------------------------------------------------

/// Stem for a session: `HHMMSS-HHMMSS` from the booking window (UTC).
pub fn session_stem(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    format!("{}-{}", start.format("%H%M%S"), end.format("%H%M%S"))
}

/// Name of the date-partitioned directory a session lives in.
///
/// Uses the local date so an operator browsing the SD card sees the
/// calendar day the recording happened on.
pub fn date_dir_name(at: DateTime<Local>) -> String {
    at.format("%Y-%m-%d").to_string()
}

/// Which camera position a raw file belongs to, parsed from its filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraRole {
    /// Single-camera session, no suffix.
    Single,
    /// Left/first camera of a dual rig.
    Cam1,
    /// Right/second camera of a dual rig.
    Cam2,
    /// Already-merged dual output.
    Merged,
}

/// Split a file stem into its session base and camera role.
///
/// `"143000-143500_cam1"` → `("143000-143500", Cam1)`;
/// a stem without a recognized suffix is a single-camera session.
pub fn parse_stem(stem: &str) -> (&str, CameraRole) {
    if let Some(base) = stem.strip_suffix(CAM1_SUFFIX) {
        (base, CameraRole::Cam1)
    } else if let Some(base) = stem.strip_suffix(CAM2_SUFFIX) {
        (base, CameraRole::Cam2)
    } else if let Some(base) = stem.strip_suffix(MERGED_SUFFIX) {
        (base, CameraRole::Merged)
    } else {
        (stem, CameraRole::Single)
    }
}

/// Camera role of a raw file path.
pub fn role_of(path: &Path) -> CameraRole {
    match path.file_stem().and_then(|s| s.to_str()) {
        Some(stem) => parse_stem(stem).1,
        None => CameraRole::Single,
    }
}

/// Session base stem of a raw file path (suffix stripped).
pub fn base_stem_of(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    Some(parse_stem(stem).0.to_string())
}

/// Path of the other camera's raw file, if this file is half of a pair.
pub fn sibling_path(path: &Path) -> Option<PathBuf> {
    let stem = path.file_stem()?.to_str()?;
    let (base, role) = parse_stem(stem);
    let sibling_suffix = match role {
        CameraRole::Cam1 => CAM2_SUFFIX,
        CameraRole::Cam2 => CAM1_SUFFIX,
        CameraRole::Single | CameraRole::Merged => return None,
    };
    Some(path.with_file_name(format!("{base}{sibling_suffix}.{VIDEO_EXT}")))
}

/// Path the merged output of a dual pair is written to.
pub fn merged_path(raw: &Path) -> Option<PathBuf> {
    let base = base_stem_of(raw)?;
    Some(raw.with_file_name(format!("{base}{MERGED_SUFFIX}.{VIDEO_EXT}")))
}

/// Path of the session's JSON sidecar (shared by both halves of a pair).
pub fn sidecar_path(raw: &Path) -> Option<PathBuf> {
    let base = base_stem_of(raw)?;
    Some(raw.with_file_name(format!("{base}.json")))
}

// ---------------------------------------------------------------------------
// Sidecar metadata
// ---------------------------------------------------------------------------

/// Metadata written next to a raw recording so the worker can attribute the
/// file to its booking after the scheduler has moved on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSidecar {
    pub user_id: String,
    pub camera_id: String,
    pub booking_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl SessionSidecar {
    /// Write the sidecar as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a sidecar, returning `Ok(None)` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>, CoreError> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&data)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn stem_from_booking_window() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 14, 30, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 1, 14, 35, 0).unwrap();
        assert_eq!(session_stem(start, end), "143000-143500");
    }

    #[test]
    fn stem_pads_with_zeros() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 1).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 1, 0, 2, 1).unwrap();
        assert_eq!(session_stem(start, end), "000001-000201");
    }

    #[test]
    fn parse_stem_roles() {
        assert_eq!(parse_stem("143000-143500_cam1"), ("143000-143500", CameraRole::Cam1));
        assert_eq!(parse_stem("143000-143500_cam2"), ("143000-143500", CameraRole::Cam2));
        assert_eq!(parse_stem("143000-143500_merged"), ("143000-143500", CameraRole::Merged));
        assert_eq!(parse_stem("143000-143500"), ("143000-143500", CameraRole::Single));
    }

    #[test]
    fn sibling_of_cam1_is_cam2() {
        let p = Path::new("/rec/2025-01-01/143000-143500_cam1.mp4");
        let sib = sibling_path(p).unwrap();
        assert_eq!(sib, Path::new("/rec/2025-01-01/143000-143500_cam2.mp4"));
    }

    #[test]
    fn sibling_of_cam2_is_cam1() {
        let p = Path::new("/rec/2025-01-01/143000-143500_cam2.mp4");
        let sib = sibling_path(p).unwrap();
        assert_eq!(sib, Path::new("/rec/2025-01-01/143000-143500_cam1.mp4"));
    }

    #[test]
    fn single_camera_has_no_sibling() {
        assert!(sibling_path(Path::new("/rec/143000-143500.mp4")).is_none());
        assert!(sibling_path(Path::new("/rec/143000-143500_merged.mp4")).is_none());
    }

    #[test]
    fn merged_path_strips_camera_suffix() {
        let p = Path::new("/rec/2025-01-01/143000-143500_cam1.mp4");
        assert_eq!(
            merged_path(p).unwrap(),
            Path::new("/rec/2025-01-01/143000-143500_merged.mp4")
        );
    }

    #[test]
    fn sidecar_path_shared_by_pair() {
        let cam1 = Path::new("/rec/143000-143500_cam1.mp4");
        let cam2 = Path::new("/rec/143000-143500_cam2.mp4");
        assert_eq!(sidecar_path(cam1), sidecar_path(cam2));
        assert_eq!(
            sidecar_path(cam1).unwrap(),
            Path::new("/rec/143000-143500.json")
        );
    }

    #[test]
    fn sidecar_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("143000-143500.json");
        let sidecar = SessionSidecar {
            user_id: "u1".into(),
            camera_id: "cam0".into(),
            booking_id: "b1".into(),
            start_time: Utc.with_ymd_and_hms(2025, 1, 1, 14, 30, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2025, 1, 1, 14, 35, 0).unwrap(),
        };
        sidecar.save(&path).unwrap();

        let loaded = SessionSidecar::load(&path).unwrap().unwrap();
        assert_eq!(loaded.booking_id, "b1");
        assert_eq!(loaded.start_time, sidecar.start_time);
    }

    #[test]
    fn sidecar_load_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(SessionSidecar::load(&missing).unwrap().is_none());
    }
}
