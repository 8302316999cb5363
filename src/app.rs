//! Service context built once at startup and shared by every event.

use crate::broker::{BrokerService, KafkaBroker};
use crate::config::Config;
use crate::forwarder::{EventForwarder, UploadReport};
use crate::models::{HostEvent, PostEvent, UploadEvent, UploadOutcome};
use crate::relocator::UploadRelocator;
use crate::storage::{ensure_bucket, ObjectStore, S3ObjectStore};
use crate::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Owns the broker and object-store handles for the process lifetime.
pub struct App {
    forwarder: EventForwarder,
}

/// Injectable service bundle used to construct [`App`] in tests/harnesses.
pub struct AppServices {
    pub broker: Arc<dyn BrokerService>,
    pub store: Arc<dyn ObjectStore>,
}

/// JSON line written back to the host for each handled event.
#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "hook", rename_all = "lowercase")]
pub enum EventReply {
    Post {
        key: String,
        published: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Upload {
        url: String,
        path: String,
        name: String,
        relocated: bool,
        published: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl From<&UploadReport> for EventReply {
    fn from(report: &UploadReport) -> Self {
        let error = match (&report.outcome, &report.publish_error) {
            (_, Some(e)) => Some(e.to_string()),
            (UploadOutcome::FellBackToLocal { reason }, None) => Some(reason.clone()),
            _ => None,
        };

        EventReply::Upload {
            url: report.reply.url.clone(),
            path: report.reply.path.clone(),
            name: report.reply.name.clone(),
            relocated: report.outcome.is_relocated(),
            published: report.published(),
            error,
        }
    }
}

impl App {
    /// Build an app from concrete service dependencies.
    pub fn with_services(services: AppServices, config: &Config) -> Self {
        let relocator = UploadRelocator::new(
            services.store,
            &config.public_endpoint,
            config.upload_timeout,
        );

        Self {
            forwarder: EventForwarder::new(
                services.broker,
                relocator,
                &config.posts_topic,
                &config.images_topic,
                config.publish_timeout,
            ),
        }
    }

    /// Connect to Kafka and S3 from configuration.
    ///
    /// An unreachable broker aborts startup. A failed bucket check does not:
    /// the relay starts and uploads fall back to local storage until the
    /// bucket becomes usable.
    pub async fn new(config: &Config) -> Result<Self> {
        let broker = KafkaBroker::connect(config).await?;
        let store = S3ObjectStore::new(config).await?;

        Self::init(
            AppServices {
                broker: Arc::new(broker),
                store: Arc::new(store),
            },
            config,
        )
        .await
    }

    /// Run the startup bucket check against the given services.
    pub async fn init(services: AppServices, config: &Config) -> Result<Self> {
        match ensure_bucket(services.store.as_ref()).await {
            Ok(true) => info!("Created bucket {}", config.s3_bucket),
            Ok(false) => info!("Using bucket {}", config.s3_bucket),
            Err(e) => warn!(
                "Bucket {} unavailable, uploads will stay local: {}",
                config.s3_bucket, e
            ),
        }

        Ok(Self::with_services(services, config))
    }

    pub async fn handle_post(&self, event: PostEvent) -> Result<String> {
        event.validate()?;
        self.forwarder.on_post(&event).await?;
        Ok(event.key())
    }

    pub async fn handle_upload(&self, mut event: UploadEvent) -> Result<UploadReport> {
        event.validate()?;
        Ok(self.forwarder.on_upload(&event).await)
    }

    /// Dispatch a tagged event. Errors are folded into the reply.
    pub async fn handle(&self, event: HostEvent) -> EventReply {
        match event {
            HostEvent::Post(post) => {
                let key = post.key();
                match self.handle_post(post).await {
                    Ok(key) => EventReply::Post {
                        key,
                        published: true,
                        error: None,
                    },
                    Err(e) => {
                        warn!("Post {} not forwarded: {}", key, e);
                        EventReply::Post {
                            key,
                            published: false,
                            error: Some(e.to_string()),
                        }
                    }
                }
            }
            HostEvent::Upload(upload) => {
                let local = upload.local_reply();
                match self.handle_upload(upload).await {
                    Ok(report) => EventReply::from(&report),
                    Err(e) => {
                        warn!("Rejected upload event: {}", e);
                        EventReply::Upload {
                            url: local.url,
                            path: local.path,
                            name: local.name,
                            relocated: false,
                            published: false,
                            error: Some(e.to_string()),
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{App, AppServices, EventReply};
    use crate::broker::MockBroker;
    use crate::config::{Config, Settings};
    use crate::models::HostEvent;
    use crate::storage::MockObjectStore;
    use serde_json::json;
    use std::sync::Arc;

    fn test_config() -> Config {
        let settings = Settings::new()
            .with("s3_access_key_id", "key")
            .with("s3_secret_access_key", "secret")
            .with("s3_bucket", "mock-bucket")
            .with("s3_public_endpoint", "https://cdn.test");
        Config::resolve(&settings, |_: &str| None).unwrap()
    }

    #[tokio::test]
    async fn test_init_creates_missing_bucket() {
        let store = MockObjectStore::new();
        let services = AppServices {
            broker: Arc::new(MockBroker::new()),
            store: Arc::new(store.clone()),
        };

        App::init(services, &test_config()).await.unwrap();
        assert_eq!(store.get_create_count(), 1);
    }

    #[tokio::test]
    async fn test_init_tolerates_bucket_check_failure() {
        let store = MockObjectStore::new().with_head_error("InvalidAccessKeyId");
        let services = AppServices {
            broker: Arc::new(MockBroker::new()),
            store: Arc::new(store.clone()),
        };

        assert!(App::init(services, &test_config()).await.is_ok());
        assert_eq!(store.get_create_count(), 0);
    }

    #[tokio::test]
    async fn test_handle_rejects_invalid_upload_with_local_reply() {
        let broker = MockBroker::new();
        let store = MockObjectStore::new().with_existing_bucket();
        let app = App::with_services(
            AppServices {
                broker: Arc::new(broker.clone()),
                store: Arc::new(store.clone()),
            },
            &test_config(),
        );

        let event: HostEvent = serde_json::from_value(json!({
            "hook": "upload",
            "image": {"path": "/tmp/a.png", "name": " ", "url": "/assets/a.png"}
        }))
        .unwrap();

        let reply = app.handle(event).await;
        match reply {
            EventReply::Upload {
                url,
                relocated,
                published,
                error,
                ..
            } => {
                assert_eq!(url, "/assets/a.png");
                assert!(!relocated);
                assert!(!published);
                assert!(error.unwrap().contains("image.name"));
            }
            other => panic!("unexpected reply {:?}", other),
        }
        assert_eq!(store.get_put_count(), 0);
        assert_eq!(broker.get_publish_count(), 0);
    }

    #[tokio::test]
    async fn test_handle_post_reports_broker_failure() {
        let app = App::with_services(
            AppServices {
                broker: Arc::new(MockBroker::new().failing("broker down")),
                store: Arc::new(MockObjectStore::new()),
            },
            &test_config(),
        );

        let event: HostEvent =
            serde_json::from_value(json!({"hook": "post", "post": {"pid": "12"}})).unwrap();

        let reply = app.handle(event).await;
        assert_eq!(
            reply,
            EventReply::Post {
                key: "12".to_string(),
                published: false,
                error: Some("Broker error: broker down".to_string()),
            }
        );
    }
}
