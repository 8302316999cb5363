//! Message broker integration
//!
//! Publishes forwarded forum events to Kafka topics. One producer is
//! connected at startup and shared by every event handler.

pub mod client;
pub mod mock;

pub use client::KafkaBroker;
pub use mock::MockBroker;

use crate::models::BrokerMessage;
use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait BrokerService: Send + Sync {
    async fn publish(&self, message: &BrokerMessage) -> Result<()>;
}
