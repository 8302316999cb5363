use super::{ObjectStore, StoredObject};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone)]
pub struct MockObjectStore {
    bucket: String,
    bucket_exists: Arc<Mutex<bool>>,
    objects: Arc<Mutex<HashMap<String, (Vec<u8>, String)>>>,
    create_count: Arc<Mutex<usize>>,
    put_count: Arc<Mutex<usize>>,
    head_error: Option<String>,
    put_error: Option<String>,
    put_delay: Option<Duration>,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self {
            bucket: "mock-bucket".to_string(),
            bucket_exists: Arc::new(Mutex::new(false)),
            objects: Arc::new(Mutex::new(HashMap::new())),
            create_count: Arc::new(Mutex::new(0)),
            put_count: Arc::new(Mutex::new(0)),
            head_error: None,
            put_error: None,
            put_delay: None,
        }
    }

    pub fn with_bucket(mut self, bucket: &str) -> Self {
        self.bucket = bucket.to_string();
        self
    }

    pub fn with_existing_bucket(self) -> Self {
        *self.bucket_exists.lock().unwrap() = true;
        self
    }

    /// Bucket checks fail with something other than "not found".
    pub fn with_head_error(mut self, reason: &str) -> Self {
        self.head_error = Some(reason.to_string());
        self
    }

    pub fn with_put_error(mut self, reason: &str) -> Self {
        self.put_error = Some(reason.to_string());
        self
    }

    pub fn with_put_delay(mut self, delay: Duration) -> Self {
        self.put_delay = Some(delay);
        self
    }

    pub fn get_create_count(&self) -> usize {
        *self.create_count.lock().unwrap()
    }

    pub fn get_put_count(&self) -> usize {
        *self.put_count.lock().unwrap()
    }

    /// Stored object body and content type by key.
    pub fn get_object(&self, key: &str) -> Option<(Vec<u8>, String)> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn get_keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

impl Default for MockObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn bucket_exists(&self) -> Result<bool> {
        if let Some(reason) = &self.head_error {
            return Err(Error::S3(reason.clone()));
        }
        Ok(*self.bucket_exists.lock().unwrap())
    }

    async fn create_bucket(&self) -> Result<()> {
        *self.create_count.lock().unwrap() += 1;
        *self.bucket_exists.lock().unwrap() = true;
        Ok(())
    }

    async fn put_object(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject> {
        *self.put_count.lock().unwrap() += 1;

        if let Some(delay) = self.put_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = &self.put_error {
            return Err(Error::S3(reason.clone()));
        }

        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (data, content_type.to_string()));

        Ok(StoredObject {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            etag: Some(format!("\"mock-{}\"", key.len())),
        })
    }
}
