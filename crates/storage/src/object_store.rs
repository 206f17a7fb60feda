//! Object storage access for rasters and vector archives (S3 compatible).

use async_trait::async_trait;
use bytes::Bytes;
use object_store::{aws::AmazonS3, aws::AmazonS3Builder, path::Path, signer::Signer, ObjectStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::range::ResolvedRange;
use tile_common::{TileError, TileResult};

/// Configuration for object storage connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStorageConfig {
    /// S3-compatible endpoint URL (GCS interoperability, MinIO, ...)
    pub endpoint: String,
    /// Bucket name
    pub bucket: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Signing region
    pub region: String,
    /// Allow HTTP (for local MinIO)
    pub allow_http: bool,
}

impl Default for ObjectStorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://storage.googleapis.com".to_string(),
            bucket: "imagery".to_string(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            region: "auto".to_string(),
            allow_http: false,
        }
    }
}

/// Size and change token of a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub size: u64,
    pub e_tag: Option<String>,
}

/// Read access to stored objects.
#[async_trait]
pub trait ObjectReader: Send + Sync {
    /// Size and validator of an object.
    async fn head(&self, key: &str) -> TileResult<ObjectMetadata>;

    /// Bytes `range.start..=range.end` of an object.
    async fn read_range(&self, key: &str, range: ResolvedRange) -> TileResult<Bytes>;
}

/// Issues time-limited read URLs for objects.
#[async_trait]
pub trait UrlSigner: Send + Sync {
    async fn signed_url(&self, key: &str, expires_in: Duration) -> TileResult<String>;
}

/// Object storage client for the imagery bucket.
pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
    signer: Option<Arc<AmazonS3>>,
    bucket: String,
}

impl ObjectStorage {
    /// Create a new object storage client from config.
    pub fn new(config: &ObjectStorageConfig) -> TileResult<Self> {
        if config.access_key_id.is_empty() || config.secret_access_key.is_empty() {
            return Err(TileError::CredentialError(
                "object storage access key and secret are required".into(),
            ));
        }

        let mut builder = AmazonS3Builder::new()
            .with_endpoint(&config.endpoint)
            .with_bucket_name(&config.bucket)
            .with_access_key_id(&config.access_key_id)
            .with_secret_access_key(&config.secret_access_key)
            .with_region(&config.region)
            .with_virtual_hosted_style_request(false);

        if config.allow_http {
            builder = builder.with_allow_http(true);
        }

        let store = Arc::new(
            builder
                .build()
                .map_err(|e| TileError::CredentialError(format!("Failed to create S3 client: {}", e)))?,
        );

        Ok(Self {
            store: store.clone(),
            signer: Some(store),
            bucket: config.bucket.clone(),
        })
    }

    /// Wrap an existing store. Such a client cannot sign URLs.
    pub fn from_store(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            signer: None,
            bucket: bucket.into(),
        }
    }

    pub fn store(&self) -> Arc<dyn ObjectStore> {
        self.store.clone()
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// URL signer backed by this client's credentials, if it has any.
    pub fn url_signer(&self) -> Option<Arc<dyn UrlSigner>> {
        self.signer.clone().map(|s3| {
            Arc::new(S3UrlSigner {
                s3,
                bucket: self.bucket.clone(),
            }) as Arc<dyn UrlSigner>
        })
    }
}

fn map_store_error(key: &str, error: object_store::Error) -> TileError {
    match error {
        object_store::Error::NotFound { .. } => TileError::NotFound(key.to_string()),
        other => TileError::RemoteRead(format!("{}: {}", key, other)),
    }
}

#[async_trait]
impl ObjectReader for ObjectStorage {
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn head(&self, key: &str) -> TileResult<ObjectMetadata> {
        let meta = self
            .store
            .head(&Path::from(key))
            .await
            .map_err(|e| map_store_error(key, e))?;

        debug!(size = meta.size, "Fetched object metadata");
        Ok(ObjectMetadata {
            size: meta.size as u64,
            e_tag: meta.e_tag,
        })
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn read_range(&self, key: &str, range: ResolvedRange) -> TileResult<Bytes> {
        let bytes = self
            .store
            .get_range(&Path::from(key), range.start as usize..range.end as usize + 1)
            .await
            .map_err(|e| map_store_error(key, e))?;

        if bytes.len() as u64 != range.len() {
            return Err(TileError::RemoteRead(format!(
                "{}: expected {} bytes, got {}",
                key,
                range.len(),
                bytes.len()
            )));
        }
        Ok(bytes)
    }
}

/// Presigned GET URLs from the S3 client.
struct S3UrlSigner {
    s3: Arc<AmazonS3>,
    bucket: String,
}

#[async_trait]
impl UrlSigner for S3UrlSigner {
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn signed_url(&self, key: &str, expires_in: Duration) -> TileResult<String> {
        let url = self
            .s3
            .signed_url(reqwest::Method::GET, &Path::from(key), expires_in)
            .await
            .map_err(|e| TileError::CredentialError(format!("Failed to sign {}: {}", key, e)))?;
        Ok(url.to_string())
    }
}
