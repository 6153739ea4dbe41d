use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};
use std::sync::Arc;
use uuid::Uuid;

/// Object storage that serves uploaded keys from a public base URL.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `data` at `key`, replacing any existing object.
    async fn upload(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError>;

    fn public_url(&self, key: &str) -> String;
}

/// Client for Cloudflare R2 object storage (S3-compatible).
pub struct R2Client {
    bucket: Box<Bucket>,
    public_base_url: String,
}

impl R2Client {
    pub fn new(
        bucket_name: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        public_base_url: &str,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: "auto".to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials =
            Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self {
            bucket,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ObjectStore for R2Client {
    async fn upload(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError> {
        let response = self
            .bucket
            .put_object_with_content_type(key, data, content_type)
            .await
            .map_err(|e| StorageError::PublishFailed {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        let code = response.status_code();
        if !(200..300).contains(&code) {
            return Err(StorageError::PublishFailed {
                key: key.to_string(),
                reason: format!("storage returned HTTP {code}"),
            });
        }
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("publish failed for {key}: {reason}")]
    PublishFailed { key: String, reason: String },

    #[error("Storage configuration error: {0}")]
    Config(String),
}

/// Uploads images under deterministic keys and resolves their public URLs.
#[derive(Clone)]
pub struct ResultPublisher {
    store: Arc<dyn ObjectStore>,
}

impl ResultPublisher {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Publish a queued job's result. The key depends only on user, job and
    /// image format, so retrying the same job overwrites the same object.
    pub async fn publish(
        &self,
        job_id: Uuid,
        user_id: &str,
        bytes: &[u8],
    ) -> Result<String, StorageError> {
        self.put(&format!("results/{user_id}/{job_id}"), bytes).await
    }

    /// Input of a synchronous request, keyed by user and request stamp.
    pub async fn publish_input(
        &self,
        user_id: &str,
        stamp: &str,
        bytes: &[u8],
    ) -> Result<String, StorageError> {
        self.put(&format!("inputs/{user_id}/{stamp}"), bytes).await
    }

    /// Output of a synchronous request.
    pub async fn publish_output(
        &self,
        user_id: &str,
        stamp: &str,
        bytes: &[u8],
    ) -> Result<String, StorageError> {
        self.put(&format!("outputs/{user_id}/{stamp}"), bytes).await
    }

    async fn put(&self, stem: &str, bytes: &[u8]) -> Result<String, StorageError> {
        let (content_type, extension) = image_kind(bytes);
        let key = format!("{stem}.{extension}");
        self.store.upload(&key, bytes, content_type).await?;
        tracing::debug!(key = %key, size = bytes.len(), "Image published");
        Ok(self.store.public_url(&key))
    }
}

/// Content type and file extension sniffed from the payload, JPEG if unknown.
pub fn image_kind(bytes: &[u8]) -> (&'static str, &'static str) {
    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Png) => ("image/png", "png"),
        Ok(image::ImageFormat::WebP) => ("image/webp", "webp"),
        _ => ("image/jpeg", "jpg"),
    }
}
