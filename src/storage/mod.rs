//! Object storage for persisted images
//!
//! A narrow `ObjectStore` seam (put + capped list) backed by the
//! `object_store` crate. The S3 backend talks to Cloudflare R2 in
//! production and MinIO locally.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::{StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::{Attribute, ClientOptions, PutOptions, PutPayload};
use thiserror::Error;
use tracing::debug;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bucket not configured")]
    NotConfigured,

    #[error("failed to build storage client: {0}")]
    Client(#[source] object_store::Error),

    #[error("invalid object key {key:?}: {source}")]
    InvalidKey {
        key: String,
        #[source]
        source: object_store::path::Error,
    },

    #[error("object store error: {0}")]
    Backend(#[from] object_store::Error),
}

/// Metadata of a stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub size: i64,
    pub last_modified: DateTime<Utc>,
}

/// Durable key/value binary storage
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload `data` under `key` with the given content type, returning the
    /// key the object is stored under
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<String, StorageError>;

    /// List at most `limit` objects, optionally under `prefix`
    async fn list(
        &self,
        prefix: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StoredObject>, StorageError>;
}

/// Builds an object store client on demand
pub trait StoreConnector: Send + Sync {
    fn connect(&self) -> Result<Arc<dyn ObjectStore>, StorageError>;
}

/// S3-compatible storage settings
#[derive(Clone)]
pub struct StorageSettings {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub account_id: String,
    /// Public base URL objects are served from
    pub public_url: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for StorageSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageSettings")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("public_url", &self.public_url)
            .finish_non_exhaustive()
    }
}

impl StorageSettings {
    /// Base URL for public links to stored objects
    ///
    /// Uses the configured public URL, otherwise the R2 account endpoint.
    pub fn public_base_url(&self) -> String {
        if !self.public_url.is_empty() {
            return self.public_url.trim_end_matches('/').to_string();
        }
        if !self.account_id.is_empty() {
            format!(
                "https://{}.r2.cloudflarestorage.com/{}",
                self.account_id, self.bucket
            )
        } else {
            format!("https://r2.cloudflarestorage.com/{}", self.bucket)
        }
    }

    /// Public URL of a single object
    pub fn public_url_for(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url(), key)
    }
}

impl StoreConnector for StorageSettings {
    fn connect(&self) -> Result<Arc<dyn ObjectStore>, StorageError> {
        if self.bucket.is_empty() {
            return Err(StorageError::NotConfigured);
        }

        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&self.bucket)
            .with_region(&self.region)
            .with_access_key_id(&self.access_key_id)
            .with_secret_access_key(&self.secret_access_key)
            .with_virtual_hosted_style_request(false)
            .with_client_options(ClientOptions::new().with_timeout(self.timeout));

        if let Some(endpoint) = &self.endpoint {
            builder = builder.with_endpoint(endpoint);
            if endpoint.starts_with("http://") {
                builder = builder.with_allow_http(true);
            }
        }

        let store = builder.build().map_err(StorageError::Client)?;
        Ok(Arc::new(BucketClient::new(store)))
    }
}

/// `ObjectStore` over any `object_store` backend
#[derive(Debug, Clone)]
pub struct BucketClient(Arc<dyn object_store::ObjectStore>);

impl BucketClient {
    pub fn new(store: impl object_store::ObjectStore) -> Self {
        Self(Arc::new(store))
    }

    /// Bucket held entirely in memory
    pub fn in_memory() -> Self {
        Self::new(object_store::memory::InMemory::new())
    }
}

#[async_trait]
impl ObjectStore for BucketClient {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<String, StorageError> {
        // Path::from would percent-encode the key; the stored location must
        // match the key handed back to callers verbatim.
        let path = Path::parse(key).map_err(|source| StorageError::InvalidKey {
            key: key.to_string(),
            source,
        })?;
        let size = data.len();
        let mut opts = PutOptions::default();
        opts.attributes
            .insert(Attribute::ContentType, content_type.to_string().into());

        self.0
            .put_opts(&path, PutPayload::from(data), opts)
            .await?;
        debug!("Stored object {} ({} bytes)", path, size);
        Ok(path.to_string())
    }

    async fn list(
        &self,
        prefix: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StoredObject>, StorageError> {
        let prefix = prefix.filter(|p| !p.is_empty()).map(Path::from);
        let objects: Vec<object_store::ObjectMeta> = self
            .0
            .list(prefix.as_ref())
            .take(limit)
            .try_collect()
            .await?;

        Ok(objects
            .into_iter()
            .map(|meta| StoredObject {
                key: meta.location.to_string(),
                size: meta.size as i64,
                last_modified: meta.last_modified,
            })
            .collect())
    }
}
