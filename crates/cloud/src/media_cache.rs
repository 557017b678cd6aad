//! Local cache of per-user branding assets.
//!
//! Branding assets (intro video, user logo, sponsor logos) live in object
//! storage and are referenced by URL from the remote database. The worker
//! materializes them into a per-user cache directory before composing
//! overlays. A miss or a corrupt download degrades to "skip that overlay"
//! — branding never fails a recording.

use std::path::{Path, PathBuf};
use std::time::Duration;

use courtcam_core::delivery::{UserMediaRecord, MAX_SPONSOR_LOGOS};

use crate::CloudError;

/// Branding assets resolved to local files, ready for ffmpeg.
#[derive(Debug, Clone, Default)]
pub struct BrandingAssets {
    pub intro_video: Option<PathBuf>,
    pub user_logo: Option<PathBuf>,
    pub sponsor_logos: Vec<PathBuf>,
}

impl BrandingAssets {
    /// Whether any overlay work exists at all.
    pub fn is_empty(&self) -> bool {
        self.intro_video.is_none() && self.user_logo.is_none() && self.sponsor_logos.is_empty()
    }
}

/// Download-through cache keyed by `user_id`.
#[derive(Debug, Clone)]
pub struct MediaCache {
    cache_dir: PathBuf,
    http: reqwest::Client,
}

impl MediaCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self {
            cache_dir: cache_dir.into(),
            http,
        }
    }

    /// Resolve a user's branding record to local files.
    ///
    /// Each asset is fetched independently; failures are logged and the
    /// asset is simply absent from the result.
    pub async fn branding_for(&self, user_id: &str, record: &UserMediaRecord) -> BrandingAssets {
        let mut assets = BrandingAssets::default();

        if let Some(url) = &record.intro_video_url {
            assets.intro_video = self.fetch(user_id, url).await;
        }
        if let Some(url) = &record.logo_url {
            assets.user_logo = self.fetch(user_id, url).await;
        }
        for url in record.sponsor_logo_urls.iter().take(MAX_SPONSOR_LOGOS) {
            if let Some(path) = self.fetch(user_id, url).await {
                assets.sponsor_logos.push(path);
            }
        }

        assets
    }

    /// Fetch one asset through the cache. `None` on any failure.
    async fn fetch(&self, user_id: &str, url: &str) -> Option<PathBuf> {
        let filename = filename_from_url(url)?;
        let local = self.cache_dir.join(user_id).join(&filename);

        if is_cached(&local) {
            return Some(local);
        }

        match self.download(url, &local).await {
            Ok(()) => Some(local),
            Err(e) => {
                tracing::warn!(
                    user_id,
                    url,
                    error = %e,
                    "Branding asset unavailable; skipping overlay",
                );
                // A zero-byte or partial download must not poison the
                // cache for the next pass.
                tokio::fs::remove_file(&local).await.ok();
                None
            }
        }
    }

    async fn download(&self, url: &str, local: &Path) -> Result<(), CloudError> {
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| CloudError::Download(format!("{url}: {e}")))?;

        if !response.status().is_success() {
            return Err(CloudError::Download(format!(
                "{url}: status {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| CloudError::Download(format!("{url}: {e}")))?;

        if bytes.is_empty() {
            return Err(CloudError::Download(format!("{url}: empty body")));
        }

        tokio::fs::write(local, &bytes).await?;
        tracing::info!(url, local = %local.display(), "Cached branding asset");
        Ok(())
    }
}

/// A cached asset is usable when it exists and is non-empty.
fn is_cached(local: &Path) -> bool {
    std::fs::metadata(local).map(|m| m.len() > 0).unwrap_or(false)
}

/// Filename component of an asset URL, without query parameters.
fn filename_from_url(url: &str) -> Option<String> {
    let without_query = url.split(['?', '#']).next()?;
    let name = without_query.rsplit('/').next()?;
    if name.is_empty() {
        return None;
    }
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_from_plain_url() {
        assert_eq!(
            filename_from_url("https://cdn.example.com/u1/logo.png").as_deref(),
            Some("logo.png")
        );
    }

    #[test]
    fn filename_strips_query() {
        assert_eq!(
            filename_from_url("https://cdn.example.com/u1/intro.mp4?X-Amz-Signature=abc").as_deref(),
            Some("intro.mp4")
        );
    }

    #[test]
    fn filename_rejects_trailing_slash() {
        assert!(filename_from_url("https://cdn.example.com/u1/").is_none());
    }

    #[test]
    fn empty_cached_file_not_usable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logo.png");
        std::fs::write(&path, b"").unwrap();
        assert!(!is_cached(&path));
        std::fs::write(&path, b"png bytes").unwrap();
        assert!(is_cached(&path));
    }

    #[tokio::test]
    async fn cached_asset_skips_download() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MediaCache::new(dir.path());
        let local = dir.path().join("u1").join("logo.png");
        std::fs::create_dir_all(local.parent().unwrap()).unwrap();
        std::fs::write(&local, b"png bytes").unwrap();

        // Unroutable URL: would fail if a download were attempted.
        let record = UserMediaRecord {
            logo_url: Some("http://192.0.2.1/u1/logo.png".into()),
            ..Default::default()
        };
        let assets = cache.branding_for("u1", &record).await;
        assert_eq!(assets.user_logo, Some(local));
    }

    #[tokio::test]
    async fn failed_download_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MediaCache::new(dir.path());
        let record = UserMediaRecord {
            logo_url: Some("http://192.0.2.1/u1/logo.png".into()),
            ..Default::default()
        };
        let assets = cache.branding_for("u1", &record).await;
        assert!(assets.user_logo.is_none());
        assert!(assets.is_empty());
    }

    #[tokio::test]
    async fn sponsor_logos_capped_at_three() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MediaCache::new(dir.path());
        // Pre-seed four cached sponsor logos; only three may be used.
        let user_dir = dir.path().join("u1");
        std::fs::create_dir_all(&user_dir).unwrap();
        let mut urls = Vec::new();
        for i in 0..4 {
            let name = format!("sponsor{i}.png");
            std::fs::write(user_dir.join(&name), b"png").unwrap();
            urls.push(format!("https://cdn.example.com/u1/{name}"));
        }
        let record = UserMediaRecord {
            sponsor_logo_urls: urls,
            ..Default::default()
        };
        let assets = cache.branding_for("u1", &record).await;
        assert_eq!(assets.sponsor_logos.len(), 3);
    }
}
