use super::BrokerService;
use crate::config::Config;
use crate::models::BrokerMessage;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::time::Duration;

pub struct KafkaBroker {
    producer: FutureProducer,
    send_timeout: Duration,
}

impl KafkaBroker {
    /// Create the producer and confirm the cluster answers a metadata request.
    ///
    /// An unreachable broker is fatal: the relay has nothing to do without it.
    pub async fn connect(config: &Config) -> Result<Self> {
        let brokers = config.kafka_brokers.join(",");

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("client.id", &config.kafka_client_id)
            .set(
                "message.timeout.ms",
                config.publish_timeout.as_millis().to_string(),
            )
            .create()
            .map_err(|e| Error::Initialization(format!("Failed to create producer: {}", e)))?;

        let probe = producer.clone();
        let timeout = config.publish_timeout;
        let metadata = tokio::task::spawn_blocking(move || {
            probe
                .client()
                .fetch_metadata(None, Timeout::After(timeout))
                .map(|m| m.brokers().len())
        })
        .await
        .map_err(|e| Error::Initialization(format!("Metadata task join error: {}", e)))?;

        let broker_count = metadata.map_err(|e| {
            Error::Initialization(format!("Kafka brokers {} unreachable: {}", brokers, e))
        })?;

        tracing::info!(
            "Connected to Kafka at {} ({} brokers, client id {})",
            brokers,
            broker_count,
            config.kafka_client_id
        );

        Ok(Self {
            producer,
            send_timeout: config.publish_timeout,
        })
    }
}

#[async_trait]
impl BrokerService for KafkaBroker {
    async fn publish(&self, message: &BrokerMessage) -> Result<()> {
        let record = FutureRecord::to(&message.topic)
            .key(&message.key)
            .payload(&message.value)
            .timestamp(Utc::now().timestamp_millis());

        let (partition, offset) = self
            .producer
            .send(record, Timeout::After(self.send_timeout))
            .await
            .map_err(|(e, _)| {
                Error::Broker(format!("Failed to publish to {}: {}", message.topic, e))
            })?;

        tracing::debug!(
            "Published key {} to {} (partition {}, offset {})",
            message.key,
            message.topic,
            partition,
            offset
        );
        Ok(())
    }
}
