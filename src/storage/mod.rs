//! Object storage integration
//!
//! Moves uploaded images into an S3-compatible bucket (MinIO in the usual
//! deployment). One client is bound to one endpoint and bucket for the
//! lifetime of the relay.

pub mod client;
pub mod mime;
pub mod mock;

pub use client::S3ObjectStore;
pub use mime::content_type_for;
pub use mock::MockObjectStore;

use crate::Result;
use async_trait::async_trait;

/// Where a stored object ended up.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub bucket: String,
    pub key: String,
    pub etag: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn bucket(&self) -> &str;

    /// `Ok(false)` only when the bucket is reported missing; any other
    /// failure (credentials, network) is an error.
    async fn bucket_exists(&self) -> Result<bool>;

    async fn create_bucket(&self) -> Result<()>;

    /// Store `data` under `key` with a public-read ACL.
    async fn put_object(&self, key: &str, data: Vec<u8>, content_type: &str)
        -> Result<StoredObject>;
}

/// Create the bucket if it is missing. Returns `true` when it was created.
pub async fn ensure_bucket(store: &dyn ObjectStore) -> Result<bool> {
    if store.bucket_exists().await? {
        tracing::debug!("Bucket {} already exists", store.bucket());
        return Ok(false);
    }

    tracing::info!("Bucket {} not found, creating it", store.bucket());
    store.create_bucket().await?;
    Ok(true)
}
