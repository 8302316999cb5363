use super::BrokerService;
use crate::models::BrokerMessage;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone)]
pub struct MockBroker {
    published: Arc<Mutex<Vec<BrokerMessage>>>,
    publish_count: Arc<Mutex<usize>>,
    fail_with: Option<String>,
    delay: Option<Duration>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self {
            published: Arc::new(Mutex::new(Vec::new())),
            publish_count: Arc::new(Mutex::new(0)),
            fail_with: None,
            delay: None,
        }
    }

    /// Every publish fails with the given reason.
    pub fn failing(mut self, reason: &str) -> Self {
        self.fail_with = Some(reason.to_string());
        self
    }

    /// Every publish sleeps first, for exercising timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn get_publish_count(&self) -> usize {
        *self.publish_count.lock().unwrap()
    }

    /// Successfully published messages, in order.
    pub fn get_published(&self) -> Vec<BrokerMessage> {
        self.published.lock().unwrap().clone()
    }
}

impl Default for MockBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerService for MockBroker {
    async fn publish(&self, message: &BrokerMessage) -> Result<()> {
        *self.publish_count.lock().unwrap() += 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(reason) = &self.fail_with {
            return Err(Error::Broker(reason.clone()));
        }

        self.published.lock().unwrap().push(message.clone());
        Ok(())
    }
}
