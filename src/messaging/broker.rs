//! Broker abstraction used by the relay.
//!
//! A [`Broker`] opens [`BrokerSession`]s (one connection plus one channel). Deliveries carry
//! their own acknowledgement handle so the relay can settle them after the handler runs.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use super::RelayError;

/// Per-publish settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOptions {
    /// Ask the broker to write the message to disk.
    pub persistent: bool,
    pub priority: Option<u8>,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            persistent: true,
            priority: None,
        }
    }
}

pub type DeliveryStream = BoxStream<'static, Result<Delivery, RelayError>>;

#[async_trait]
pub trait Broker: Send + Sync {
    fn name(&self) -> &'static str;

    async fn open(&self) -> Result<Box<dyn BrokerSession>, RelayError>;
}

#[async_trait]
pub trait BrokerSession: Send + Sync {
    async fn declare_queue(&self, queue: &str) -> Result<(), RelayError>;

    async fn publish(
        &self,
        queue: &str,
        body: Bytes,
        options: PublishOptions,
    ) -> Result<(), RelayError>;

    /// Starts a manual-ack consumer on `queue`.
    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream, RelayError>;

    async fn close_channel(&self) -> Result<(), RelayError>;

    async fn close_connection(&self) -> Result<(), RelayError>;
}

#[async_trait]
pub trait Acknowledge: Send + Sync {
    async fn ack(&self) -> Result<(), RelayError>;

    async fn nack(&self, requeue: bool) -> Result<(), RelayError>;
}

pub struct Delivery {
    pub body: Bytes,
    acker: Box<dyn Acknowledge>,
}

impl Delivery {
    pub fn new(body: Bytes, acker: impl Acknowledge + 'static) -> Self {
        Self {
            body,
            acker: Box::new(acker),
        }
    }

    pub async fn ack(&self) -> Result<(), RelayError> {
        self.acker.ack().await
    }

    pub async fn nack(&self, requeue: bool) -> Result<(), RelayError> {
        self.acker.nack(requeue).await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("len", &self.body.len())
            .finish_non_exhaustive()
    }
}
