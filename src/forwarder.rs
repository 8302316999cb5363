//! Forwards forum events to the broker.
//!
//! Posts are published as-is. Uploads are relocated first and published
//! only when relocation succeeded, enriched with the storage location; a
//! failed relocation leaves the forum with its local copy and the broker
//! with nothing.

use crate::broker::BrokerService;
use crate::models::{
    BrokerMessage, ImageReply, PostEvent, StorageLocation, UploadEvent, UploadOutcome,
    UploadResult,
};
use crate::relocator::UploadRelocator;
use crate::{Error, Result};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub struct EventForwarder {
    broker: Arc<dyn BrokerService>,
    relocator: UploadRelocator,
    posts_topic: String,
    images_topic: String,
    publish_timeout: Duration,
}

/// Everything the host needs after an upload was handled.
#[derive(Debug)]
pub struct UploadReport {
    pub outcome: UploadOutcome,
    /// What the forum should persist in place of its original reference.
    pub reply: ImageReply,
    /// Set when relocation succeeded but the broker did not take the event.
    pub publish_error: Option<Error>,
}

impl UploadReport {
    pub fn published(&self) -> bool {
        self.outcome.is_relocated() && self.publish_error.is_none()
    }
}

impl EventForwarder {
    pub fn new(
        broker: Arc<dyn BrokerService>,
        relocator: UploadRelocator,
        posts_topic: &str,
        images_topic: &str,
        publish_timeout: Duration,
    ) -> Self {
        Self {
            broker,
            relocator,
            posts_topic: posts_topic.to_string(),
            images_topic: images_topic.to_string(),
            publish_timeout,
        }
    }

    /// Publish a new post keyed by its pid. Failures reach the caller.
    pub async fn on_post(&self, event: &PostEvent) -> Result<()> {
        let message = BrokerMessage::json(&self.posts_topic, event.key(), event)?;
        self.publish(&message).await?;
        info!("Forwarded post {} to {}", message.key, message.topic);
        Ok(())
    }

    /// Relocate an uploaded image, then publish it keyed by storage key.
    ///
    /// Never fails: a relocation error falls back to the local reference and
    /// a publish error is reported alongside the relocated result.
    pub async fn on_upload(&self, event: &UploadEvent) -> UploadReport {
        let relocated = self
            .relocator
            .relocate(
                Path::new(&event.image.path),
                &event.image.name,
                event.folder.as_deref(),
            )
            .await;

        let result = match relocated {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    "Keeping {} local, relocation failed: {}",
                    event.image.path, e
                );
                return UploadReport {
                    outcome: UploadOutcome::FellBackToLocal {
                        reason: e.to_string(),
                    },
                    reply: event.local_reply(),
                    publish_error: None,
                };
            }
        };

        let publish_error = match self.publish_upload(event, &result).await {
            Ok(()) => {
                info!(
                    "Forwarded upload {} to {}",
                    result.storage_key, self.images_topic
                );
                None
            }
            Err(e) => {
                error!(
                    "Upload {} relocated but not forwarded: {}",
                    result.storage_key, e
                );
                Some(e)
            }
        };

        UploadReport {
            reply: ImageReply::from(&result),
            outcome: UploadOutcome::Relocated(result),
            publish_error,
        }
    }

    async fn publish_upload(&self, event: &UploadEvent, result: &UploadResult) -> Result<()> {
        let payload = enrich(event, result, self.relocator.bucket())?;
        let message =
            BrokerMessage::json(&self.images_topic, result.storage_key.clone(), &payload)?;
        self.publish(&message).await
    }

    async fn publish(&self, message: &BrokerMessage) -> Result<()> {
        tokio::time::timeout(self.publish_timeout, self.broker.publish(message))
            .await
            .map_err(|_| Error::Timeout {
                operation: format!("publish to {}", message.topic),
                millis: self.publish_timeout.as_millis() as u64,
            })?
    }
}

/// Original upload payload with the remote `url`, storage `path` and `bucket`
/// set at the top level, plus a `storage` object describing the copy.
fn enrich(event: &UploadEvent, result: &UploadResult, bucket: &str) -> Result<Value> {
    let mut payload = serde_json::to_value(event)?;
    let location = StorageLocation {
        url: result.remote_url.clone(),
        path: result.storage_key.clone(),
        bucket: bucket.to_string(),
        name: result.generated_name.clone(),
    };

    match payload.as_object_mut() {
        Some(object) => {
            object.insert("url".to_string(), Value::from(location.url.clone()));
            object.insert("path".to_string(), Value::from(location.path.clone()));
            object.insert("bucket".to_string(), Value::from(location.bucket.clone()));
            object.insert("storage".to_string(), serde_json::to_value(location)?);
            Ok(payload)
        }
        None => Err(Error::InvalidEvent(
            "upload payload did not serialize to an object".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MockBroker;
    use crate::storage::MockObjectStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    const PUBLIC: &str = "https://forum.example.com/s3";

    fn forwarder(broker: &MockBroker, store: &MockObjectStore) -> EventForwarder {
        EventForwarder::new(
            Arc::new(broker.clone()),
            UploadRelocator::new(Arc::new(store.clone()), PUBLIC, Duration::from_secs(5)),
            "posts",
            "images",
            Duration::from_secs(5),
        )
    }

    fn upload_event(path: &Path, folder: Option<&str>) -> UploadEvent {
        let mut event: UploadEvent = serde_json::from_value(json!({
            "image": {
                "path": path.to_string_lossy(),
                "name": "a.png",
                "url": "/assets/uploads/a.png"
            },
            "folder": folder,
            "uid": 5
        }))
        .unwrap();
        event.validate().unwrap();
        event
    }

    #[tokio::test]
    async fn test_on_post_publishes_once_keyed_by_pid() {
        let broker = MockBroker::new();
        let store = MockObjectStore::new();
        let event: PostEvent =
            serde_json::from_value(json!({"post": {"pid": 17, "content": "hi"}})).unwrap();

        forwarder(&broker, &store).on_post(&event).await.unwrap();

        let published = broker.get_published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "posts");
        assert_eq!(published[0].key, "17");
        let value: Value = serde_json::from_str(&published[0].value).unwrap();
        assert_eq!(value, json!({"post": {"pid": 17, "content": "hi"}}));
    }

    #[tokio::test]
    async fn test_on_post_propagates_publish_failure() {
        let broker = MockBroker::new().failing("no leader");
        let store = MockObjectStore::new();
        let event: PostEvent = serde_json::from_value(json!({"post": {"pid": 1}})).unwrap();

        let err = forwarder(&broker, &store).on_post(&event).await.unwrap_err();
        assert!(matches!(err, Error::Broker(_)));
    }

    #[tokio::test]
    async fn test_on_post_times_out() {
        let broker = MockBroker::new().with_delay(Duration::from_millis(200));
        let store = MockObjectStore::new();
        let forwarder = EventForwarder::new(
            Arc::new(broker),
            UploadRelocator::new(Arc::new(store), PUBLIC, Duration::from_secs(5)),
            "posts",
            "images",
            Duration::from_millis(20),
        );
        let event: PostEvent = serde_json::from_value(json!({"post": {"pid": 1}})).unwrap();

        let err = forwarder.on_post(&event).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_on_upload_relocates_then_publishes_enriched_payload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.png");
        std::fs::write(&path, b"png").unwrap();
        let broker = MockBroker::new();
        let store = MockObjectStore::new().with_bucket("uploads");

        let report = forwarder(&broker, &store)
            .on_upload(&upload_event(&path, Some("avatars")))
            .await;

        let result = match &report.outcome {
            UploadOutcome::Relocated(result) => result.clone(),
            other => panic!("expected relocation, got {:?}", other),
        };
        assert!(report.published());
        assert_eq!(report.reply.url, result.remote_url);
        assert_eq!(report.reply.path, result.storage_key);
        assert_eq!(report.reply.name, result.generated_name);
        assert_eq!(
            result.remote_url,
            format!("{}/uploads/{}", PUBLIC, result.storage_key)
        );

        let published = broker.get_published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "images");
        assert_eq!(published[0].key, result.storage_key);

        let value: Value = serde_json::from_str(&published[0].value).unwrap();
        assert_eq!(value["url"], json!(result.remote_url));
        assert_eq!(value["path"], json!(result.storage_key));
        assert_eq!(value["bucket"], json!("uploads"));
        assert_eq!(value["storage"]["url"], json!(result.remote_url));
        assert_eq!(value["storage"]["path"], json!(result.storage_key));
        assert_eq!(value["storage"]["bucket"], json!("uploads"));
        assert_eq!(value["image"]["url"], json!("/assets/uploads/a.png"));
        assert_eq!(value["uid"], json!(5));
    }

    #[tokio::test]
    async fn test_on_upload_falls_back_without_publishing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.png");
        std::fs::write(&path, b"png").unwrap();
        let broker = MockBroker::new();
        let store = MockObjectStore::new().with_put_error("bucket missing");
        let event = upload_event(&path, None);

        let report = forwarder(&broker, &store).on_upload(&event).await;

        assert!(matches!(
            report.outcome,
            UploadOutcome::FellBackToLocal { ref reason } if reason.contains("bucket missing")
        ));
        assert_eq!(report.reply, event.local_reply());
        assert!(!report.published());
        assert_eq!(broker.get_publish_count(), 0);
    }

    #[tokio::test]
    async fn test_on_upload_keeps_relocation_when_publish_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.png");
        std::fs::write(&path, b"png").unwrap();
        let broker = MockBroker::new().failing("broker down");
        let store = MockObjectStore::new();

        let report = forwarder(&broker, &store)
            .on_upload(&upload_event(&path, None))
            .await;

        assert!(report.outcome.is_relocated());
        assert!(report.publish_error.is_some());
        assert!(!report.published());
        assert!(report.reply.url.starts_with(PUBLIC));
        assert_eq!(store.get_put_count(), 1);
    }
}
