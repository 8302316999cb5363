//! Moves uploaded files from local disk into the bucket.

use crate::models::UploadResult;
use crate::storage::{content_type_for, ObjectStore};
use crate::{Error, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub struct UploadRelocator {
    store: Arc<dyn ObjectStore>,
    public_endpoint: String,
    upload_timeout: Duration,
}

impl UploadRelocator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        public_endpoint: &str,
        upload_timeout: Duration,
    ) -> Self {
        Self {
            store,
            public_endpoint: public_endpoint.trim_end_matches('/').to_string(),
            upload_timeout,
        }
    }

    pub fn bucket(&self) -> &str {
        self.store.bucket()
    }

    /// Upload `local_path` under a fresh unique name and return its public URL.
    ///
    /// The whole file is read into memory before the upload starts.
    pub async fn relocate(
        &self,
        local_path: &Path,
        original_name: &str,
        folder: Option<&str>,
    ) -> Result<UploadResult> {
        let data = tokio::fs::read(local_path)
            .await
            .map_err(|e| Error::upload(e.into()))?;

        let generated_name = unique_name(original_name, local_path);
        let storage_key = storage_key(folder, &generated_name);
        let content_type = content_type_for(&generated_name);

        tracing::debug!(
            "Uploading {} ({} bytes, {}) as {}",
            local_path.display(),
            data.len(),
            content_type,
            storage_key
        );

        let put = self.store.put_object(&storage_key, data, content_type);
        let stored = tokio::time::timeout(self.upload_timeout, put)
            .await
            .map_err(|_| {
                Error::upload(Error::Timeout {
                    operation: format!("upload {}", storage_key),
                    millis: self.upload_timeout.as_millis() as u64,
                })
            })?
            .map_err(Error::upload)?;

        let remote_url = self.public_url(&stored.bucket, &stored.key);
        tracing::info!(
            "Relocated {} to {} (etag {})",
            local_path.display(),
            remote_url,
            stored.etag.as_deref().unwrap_or("none")
        );

        Ok(UploadResult {
            remote_url,
            storage_key: stored.key,
            generated_name,
        })
    }

    /// URL clients use to fetch an object, built on the public endpoint
    /// rather than the one the store client talks to.
    pub fn public_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{}/{}", self.public_endpoint, bucket, key)
    }
}

/// Random name keeping the original extension (lowercased).
fn unique_name(original_name: &str, local_path: &Path) -> String {
    let ext = Path::new(original_name)
        .extension()
        .or_else(|| local_path.extension())
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext {
        Some(ext) if !ext.is_empty() => format!("{}.{}", Uuid::new_v4(), ext),
        _ => Uuid::new_v4().to_string(),
    }
}

fn storage_key(folder: Option<&str>, name: &str) -> String {
    match folder {
        Some(folder) if !folder.is_empty() => format!("{}/{}", folder, name),
        _ => name.to_string(),
    }
}
