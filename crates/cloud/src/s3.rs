//! S3 uploads with multipart transfer for large recordings.

use std::path::Path;

use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use courtcam_core::config::env_u64;

use crate::CloudError;

/// Content type every deliverable is uploaded with.
pub const VIDEO_CONTENT_TYPE: &str = "video/mp4";

/// Default size above which uploads switch to multipart (8 MiB).
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 8 * 1024 * 1024;

/// Default multipart chunk size (8 MiB; S3 requires >= 5 MiB per part).
pub const DEFAULT_PART_SIZE: u64 = 8 * 1024 * 1024;

/// Object storage configuration.
///
/// | Env Var                   | Required | Default          |
/// |---------------------------|----------|------------------|
/// | `S3_BUCKET`               | yes      | --               |
/// | `S3_ENDPOINT_URL`         | no       | (AWS default)    |
/// | `S3_PUBLIC_BASE_URL`      | no       | endpoint/bucket  |
/// | `S3_MULTIPART_THRESHOLD`  | no       | `8388608`        |
/// | `S3_PART_SIZE`            | no       | `8388608`        |
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub endpoint_url: Option<String>,
    /// Base URL recorded as `video_url` in delivery metadata.
    pub public_base_url: Option<String>,
    pub multipart_threshold: u64,
    pub part_size: u64,
}

impl S3Config {
    pub fn from_env() -> Result<Self, CloudError> {
        let bucket = std::env::var("S3_BUCKET")
            .ok()
            .filter(|b| !b.trim().is_empty())
            .ok_or_else(|| CloudError::Config("S3_BUCKET environment variable is required".into()))?;

        Ok(Self {
            bucket,
            endpoint_url: std::env::var("S3_ENDPOINT_URL").ok(),
            public_base_url: std::env::var("S3_PUBLIC_BASE_URL").ok(),
            multipart_threshold: env_u64("S3_MULTIPART_THRESHOLD", DEFAULT_MULTIPART_THRESHOLD),
            part_size: env_u64("S3_PART_SIZE", DEFAULT_PART_SIZE).max(5 * 1024 * 1024),
        })
    }
}

/// Key convention for delivered recordings: `{user_id}/{date}/{filename}`.
pub fn object_key(user_id: &str, date: &str, filename: &str) -> String {
    format!("{user_id}/{date}/{filename}")
}

/// S3 uploader bound to one bucket.
#[derive(Debug, Clone)]
pub struct Uploader {
    client: Client,
    config: S3Config,
}

impl Uploader {
    /// Build a client from the ambient AWS environment plus `config`.
    pub async fn connect(config: S3Config) -> Self {
        let base = aws_config::load_from_env().await;
        let client = match &config.endpoint_url {
            Some(endpoint) => {
                let s3_config = aws_sdk_s3::config::Builder::from(&base)
                    .endpoint_url(endpoint)
                    .force_path_style(true)
                    .build();
                Client::from_conf(s3_config)
            }
            None => Client::new(&base),
        };
        Self { client, config }
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    /// Public URL the uploaded object will be reachable under.
    pub fn public_url(&self, key: &str) -> String {
        match &self.config.public_base_url {
            Some(base) => format!("{}/{key}", base.trim_end_matches('/')),
            None => match &self.config.endpoint_url {
                Some(endpoint) => format!(
                    "{}/{}/{key}",
                    endpoint.trim_end_matches('/'),
                    self.config.bucket
                ),
                None => format!("https://{}.s3.amazonaws.com/{key}", self.config.bucket),
            },
        }
    }

    /// Upload a finished recording under `key`.
    ///
    /// Files above the multipart threshold are transferred in parts, with
    /// the multipart upload aborted on any failure so no orphaned parts
    /// accumulate against the bucket.
    pub async fn upload_video(&self, local: &Path, key: &str) -> Result<(), CloudError> {
        let size = tokio::fs::metadata(local).await?.len();

        if size <= self.config.multipart_threshold {
            self.put_single(local, key).await
        } else {
            self.put_multipart(local, key, size).await
        }
    }

    async fn put_single(&self, local: &Path, key: &str) -> Result<(), CloudError> {
        let body = ByteStream::from_path(local)
            .await
            .map_err(|e| CloudError::Upload(format!("failed to read {}: {e}", local.display())))?;

        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(key)
            .content_type(VIDEO_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| CloudError::Upload(format!("put_object {key}: {e}")))?;

        tracing::info!(key, "Uploaded (single put)");
        Ok(())
    }

    async fn put_multipart(&self, local: &Path, key: &str, size: u64) -> Result<(), CloudError> {
        let create = self
            .client
            .create_multipart_upload()
            .bucket(&self.config.bucket)
            .key(key)
            .content_type(VIDEO_CONTENT_TYPE)
            .send()
            .await
            .map_err(|e| CloudError::Upload(format!("create_multipart_upload {key}: {e}")))?;

        let upload_id = create
            .upload_id()
            .ok_or_else(|| CloudError::Upload("multipart upload returned no upload id".into()))?
            .to_string();

        match self.upload_parts(local, key, &upload_id, size).await {
            Ok(parts) => {
                self.client
                    .complete_multipart_upload()
                    .bucket(&self.config.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(
                        CompletedMultipartUpload::builder()
                            .set_parts(Some(parts))
                            .build(),
                    )
                    .send()
                    .await
                    .map_err(|e| {
                        CloudError::Upload(format!("complete_multipart_upload {key}: {e}"))
                    })?;
                tracing::info!(key, size, "Uploaded (multipart)");
                Ok(())
            }
            Err(e) => {
                // Abort so the bucket does not accumulate orphaned parts.
                self.client
                    .abort_multipart_upload()
                    .bucket(&self.config.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                    .ok();
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        local: &Path,
        key: &str,
        upload_id: &str,
        size: u64,
    ) -> Result<Vec<CompletedPart>, CloudError> {
        use tokio::io::AsyncReadExt;

        let mut file = tokio::fs::File::open(local).await?;
        let mut parts = Vec::new();
        let mut part_number = 1i32;
        let mut remaining = size;

        while remaining > 0 {
            let chunk_len = remaining.min(self.config.part_size) as usize;
            let mut buf = vec![0u8; chunk_len];
            file.read_exact(&mut buf).await?;
            remaining -= chunk_len as u64;

            let part = self
                .client
                .upload_part()
                .bucket(&self.config.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(buf))
                .send()
                .await
                .map_err(|e| {
                    CloudError::Upload(format!("upload_part {part_number} for {key}: {e}"))
                })?;

            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .set_e_tag(part.e_tag().map(|t| t.to_string()))
                    .build(),
            );
            part_number += 1;
        }

        Ok(parts)
    }
}
