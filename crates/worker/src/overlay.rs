//! Branding overlay composition.
//!
//! One contract, two strategies: `WithIntro` overlays logos on the main
//! recording and then concatenates a clean intro in front (copy-mux, so
//! the intro is never re-composited frame by frame); `Direct` is a single
//! overlay pass. The intro asset is pre-encoded to the rig's format, a
//! requirement enforced at asset-provisioning time, not here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use courtcam_cloud::BrandingAssets;
use courtcam_core::ffmpeg::{self, FfmpegError};

/// Which composition pipeline a recording takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposePlan {
    /// Overlay logos, then concatenate the intro in front.
    WithIntro,
    /// Single overlay pass.
    Direct,
}

/// Pick the pipeline for the available assets.
pub fn compose_plan(assets: &BrandingAssets) -> ComposePlan {
    if assets.intro_video.is_some() {
        ComposePlan::WithIntro
    } else {
        ComposePlan::Direct
    }
}

/// Logo inputs in the order they are fed to ffmpeg after the main video.
#[derive(Debug, Clone, Default)]
pub struct LogoStack {
    pub static_logo: Option<PathBuf>,
    pub user_logo: Option<PathBuf>,
    pub sponsor_logos: Vec<PathBuf>,
}

impl LogoStack {
    /// Collect the logos that actually exist on disk.
    pub fn resolve(static_logo_path: &Path, assets: &BrandingAssets) -> Self {
        Self {
            static_logo: static_logo_path.exists().then(|| static_logo_path.to_path_buf()),
            user_logo: assets.user_logo.clone(),
            sponsor_logos: assets.sponsor_logos.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.static_logo.is_none() && self.user_logo.is_none() && self.sponsor_logos.is_empty()
    }

    fn inputs(&self) -> Vec<&PathBuf> {
        self.static_logo
            .iter()
            .chain(self.user_logo.iter())
            .chain(self.sponsor_logos.iter())
            .collect()
    }
}

/// Build the overlay filtergraph for a logo stack.
///
/// Input 0 is the main video; logo inputs follow in [`LogoStack`] order.
/// Placement: static logo bottom-right, user logo top-left, sponsor
/// logos in a row along the bottom-left. Returns `None` when there is
/// nothing to overlay.
pub fn build_overlay_filter(stack: &LogoStack) -> Option<String> {
    if stack.is_empty() {
        return None;
    }

    let mut positions: Vec<String> = Vec::new();
    if stack.static_logo.is_some() {
        positions.push("W-w-20:H-h-20".to_string());
    }
    if stack.user_logo.is_some() {
        positions.push("20:20".to_string());
    }
    for i in 0..stack.sponsor_logos.len() {
        positions.push(format!("20+{}:H-h-20", i * 170));
    }

    let last = positions.len() - 1;
    let mut filters = Vec::new();
    let mut current = "0:v".to_string();
    for (stage, expr) in positions.iter().enumerate() {
        let out = if stage == last {
            "vout".to_string()
        } else {
            format!("v{stage}")
        };
        filters.push(format!(
            "[{current}][{}:v]overlay={expr}[{out}]",
            stage + 1
        ));
        current = out;
    }
    Some(filters.join(";"))
}

/// Compose the finished deliverable from a validated recording.
///
/// Applies whatever overlays resolve, prepends the intro when one is
/// cached, and writes the result to `output`. With no assets at all the
/// recording is copied through untouched.
pub async fn compose(
    raw: &Path,
    assets: &BrandingAssets,
    static_logo_path: &Path,
    output: &Path,
    timeout: Duration,
) -> Result<PathBuf, FfmpegError> {
    if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let stack = LogoStack::resolve(static_logo_path, assets);

    match compose_plan(assets) {
        ComposePlan::Direct => {
            overlay_pass(raw, &stack, output, timeout).await?;
        }
        ComposePlan::WithIntro => {
            let intro = assets.intro_video.as_deref().unwrap_or(raw);
            let branded = output.with_extension("branded.mp4");
            overlay_pass(raw, &stack, &branded, timeout).await?;
            let concat_result = concat_intro(intro, &branded, output, timeout).await;
            tokio::fs::remove_file(&branded).await.ok();
            concat_result?;
        }
    }

    Ok(output.to_path_buf())
}

/// Single overlay transcode, or a plain copy when nothing overlays.
async fn overlay_pass(
    raw: &Path,
    stack: &LogoStack,
    output: &Path,
    timeout: Duration,
) -> Result<(), FfmpegError> {
    let Some(graph) = build_overlay_filter(stack) else {
        tokio::fs::copy(raw, output).await?;
        return Ok(());
    };

    let mut args: Vec<String> = vec!["-i".into(), raw.to_string_lossy().to_string()];
    for logo in stack.inputs() {
        args.push("-i".into());
        args.push(logo.to_string_lossy().to_string());
    }
    args.extend([
        "-filter_complex".into(),
        graph,
        "-map".into(),
        "[vout]".into(),
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        "veryfast".into(),
        "-crf".into(),
        "23".into(),
        "-movflags".into(),
        "+faststart".into(),
        output.to_string_lossy().to_string(),
    ]);

    ffmpeg::run_ffmpeg(&args, timeout).await
}

/// Concatenate `intro` in front of `main` with the concat demuxer.
async fn concat_intro(
    intro: &Path,
    main: &Path,
    output: &Path,
    timeout: Duration,
) -> Result<(), FfmpegError> {
    let manifest = output.with_extension("concat.txt");
    let contents = format!(
        "file '{}'\nfile '{}'\n",
        intro.to_string_lossy(),
        main.to_string_lossy()
    );
    tokio::fs::write(&manifest, contents).await?;

    let args: Vec<String> = vec![
        "-f".into(),
        "concat".into(),
        "-safe".into(),
        "0".into(),
        "-i".into(),
        manifest.to_string_lossy().to_string(),
        "-c".into(),
        "copy".into(),
        output.to_string_lossy().to_string(),
    ];
    let result = ffmpeg::run_ffmpeg(&args, timeout).await;
    tokio::fs::remove_file(&manifest).await.ok();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack(static_logo: bool, user_logo: bool, sponsors: usize) -> LogoStack {
        LogoStack {
            static_logo: static_logo.then(|| PathBuf::from("/etc/courtcam/logo.png")),
            user_logo: user_logo.then(|| PathBuf::from("/cache/u1/logo.png")),
            sponsor_logos: (0..sponsors)
                .map(|i| PathBuf::from(format!("/cache/u1/sponsor{i}.png")))
                .collect(),
        }
    }

    #[test]
    fn plan_with_intro() {
        let assets = BrandingAssets {
            intro_video: Some(PathBuf::from("/cache/u1/intro.mp4")),
            ..Default::default()
        };
        assert_eq!(compose_plan(&assets), ComposePlan::WithIntro);
    }

    #[test]
    fn plan_direct_without_intro() {
        assert_eq!(compose_plan(&BrandingAssets::default()), ComposePlan::Direct);
    }

    #[test]
    fn empty_stack_builds_no_filter() {
        assert!(build_overlay_filter(&stack(false, false, 0)).is_none());
    }

    #[test]
    fn static_only_filter() {
        let graph = build_overlay_filter(&stack(true, false, 0)).unwrap();
        assert_eq!(graph, "[0:v][1:v]overlay=W-w-20:H-h-20[vout]");
    }

    #[test]
    fn full_stack_chains_all_logos() {
        let graph = build_overlay_filter(&stack(true, true, 3)).unwrap();
        // 5 overlays: static, user, 3 sponsors.
        assert_eq!(graph.matches("overlay=").count(), 5);
        assert!(graph.contains("[0:v][1:v]overlay=W-w-20:H-h-20[v0]"));
        assert!(graph.contains("[v0][2:v]overlay=20:20[v1]"));
        // Sponsor row advances 170px per logo.
        assert!(graph.contains("overlay=20+0:H-h-20"));
        assert!(graph.contains("overlay=20+170:H-h-20"));
        assert!(graph.contains("overlay=20+340:H-h-20"));
        assert!(graph.ends_with("[vout]"));
    }

    #[test]
    fn sponsor_only_filter_labels_output() {
        let graph = build_overlay_filter(&stack(false, false, 1)).unwrap();
        assert_eq!(graph, "[0:v][1:v]overlay=20+0:H-h-20[vout]");
    }

    #[tokio::test]
    async fn no_assets_copies_through() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("143000-143500.mp4");
        std::fs::write(&raw, b"raw video bytes").unwrap();
        let output = dir.path().join("out").join("143000-143500.mp4");

        let produced = compose(
            &raw,
            &BrandingAssets::default(),
            Path::new("/missing/logo.png"),
            &output,
            Duration::from_secs(10),
        )
        .await
        .unwrap();

        assert_eq!(produced, output);
        assert_eq!(std::fs::read(&output).unwrap(), b"raw video bytes");
    }
}
