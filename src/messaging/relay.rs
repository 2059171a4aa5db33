//! Message relay: publishes JSON events to named queues and drives a consumer loop.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, instrument, warn};

use super::{
    QueueName, RelayError,
    broker::{Broker, BrokerSession, Delivery, PublishOptions},
    message::{envelope, generate_message_id},
};

/// What happens to a message whose handler failed or whose body was not JSON.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Nack without requeue: the message is discarded (at-most-once).
    #[default]
    Drop,
    /// Nack with requeue: the broker redelivers it.
    Requeue,
}

impl FailurePolicy {
    pub fn requeue(self) -> bool {
        matches!(self, FailurePolicy::Requeue)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailurePolicy::Drop => "drop",
            FailurePolicy::Requeue => "requeue",
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(FailurePolicy::Drop),
            "requeue" => Ok(FailurePolicy::Requeue),
            other => Err(format!("expected `drop` or `requeue`, got `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Consuming,
    Processing,
}

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Value) -> Result<(), HandlerError>;
}

#[derive(Debug, Clone)]
pub struct RelayOptions {
    pub failure_policy: FailurePolicy,
    pub consumer_tag: String,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::Drop,
            consumer_tag: "itsm-worker".to_string(),
        }
    }
}

pub struct MessageRelay {
    broker: Arc<dyn Broker>,
    options: RelayOptions,
    session: Mutex<Option<Arc<dyn BrokerSession>>>,
    state: watch::Sender<ConsumerState>,
}

impl MessageRelay {
    pub fn new(broker: Arc<dyn Broker>, options: RelayOptions) -> Self {
        let (state, _) = watch::channel(ConsumerState::Idle);
        Self {
            broker,
            options,
            session: Mutex::new(None),
            state,
        }
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.options.failure_policy
    }

    pub fn state(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    pub async fn is_connected(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Opens the session and declares every queue. Later calls reuse the open session.
    #[instrument(skip(self), fields(broker = self.broker.name()))]
    pub async fn connect(&self) -> Result<(), RelayError> {
        self.session().await.map(|_| ())
    }

    async fn session(&self) -> Result<Arc<dyn BrokerSession>, RelayError> {
        let mut slot = self.session.lock().await;
        if let Some(session) = slot.as_ref() {
            return Ok(session.clone());
        }

        let session: Arc<dyn BrokerSession> = Arc::from(self.broker.open().await?);
        for queue in QueueName::ALL {
            session.declare_queue(queue.as_str()).await?;
        }
        info!(
            target = "itsm::messaging::relay",
            broker = self.broker.name(),
            queues = QueueName::ALL.len(),
            "message relay connected"
        );
        *slot = Some(session.clone());
        Ok(session)
    }

    /// Publishes `message` with `timestamp` and `messageId` added; returns the id.
    #[instrument(skip(self, message), fields(queue = %queue, message_id = tracing::field::Empty))]
    pub async fn publish_message(
        &self,
        queue: QueueName,
        message: Value,
        options: PublishOptions,
    ) -> Result<String, RelayError> {
        let message_id = generate_message_id();
        tracing::Span::current().record("message_id", message_id.as_str());

        let body = serde_json::to_vec(&envelope(message, &message_id)?)?;
        let result = match self.session().await {
            Ok(session) => {
                let published = session
                    .publish(queue.as_str(), Bytes::from(body), options)
                    .await;
                if published.is_err() {
                    self.discard_session(&session).await;
                }
                published
            }
            Err(err) => Err(err),
        };

        match result {
            Ok(()) => {
                metrics::counter!("itsm_queue_published_total", "queue" => queue.as_str())
                    .increment(1);
                debug!(target = "itsm::messaging::relay", "message published");
                Ok(message_id)
            }
            Err(err) => {
                metrics::counter!("itsm_queue_publish_errors_total", "queue" => queue.as_str())
                    .increment(1);
                error!(target = "itsm::messaging::relay", error = %err, "failed to publish message");
                Err(err)
            }
        }
    }

    /// Forgets a session that failed so the next call opens a fresh one.
    async fn discard_session(&self, failed: &Arc<dyn BrokerSession>) {
        let mut slot = self.session.lock().await;
        if slot
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, failed))
        {
            slot.take();
            warn!(target = "itsm::messaging::relay", "broker session failed; reconnecting on next use");
        }
    }

    /// Consumes `queue` until `shutdown` resolves or the broker ends the stream.
    ///
    /// Each message is parsed as JSON and handed to `handler`. Success acks; a parse or
    /// handler failure nacks according to the failure policy.
    #[instrument(skip(self, handler, shutdown), fields(queue = %queue, policy = %self.options.failure_policy))]
    pub async fn consume_messages<H, S>(
        &self,
        queue: QueueName,
        handler: &H,
        shutdown: S,
    ) -> Result<(), RelayError>
    where
        H: MessageHandler + ?Sized,
        S: Future<Output = ()>,
    {
        let session = self.session().await?;
        let mut deliveries = session
            .consume(queue.as_str(), &self.options.consumer_tag)
            .await?;
        self.state.send_replace(ConsumerState::Consuming);
        info!(target = "itsm::messaging::relay", "consumer started");

        tokio::pin!(shutdown);
        let outcome = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(target = "itsm::messaging::relay", "shutdown requested; consumer stopping");
                    break Ok(());
                }
                next = deliveries.next() => match next {
                    Some(Ok(delivery)) => {
                        self.state.send_replace(ConsumerState::Processing);
                        self.process(queue, handler, &delivery).await;
                        self.state.send_replace(ConsumerState::Consuming);
                    }
                    Some(Err(err)) => break Err(err),
                    None => {
                        warn!(target = "itsm::messaging::relay", "broker closed the consumer stream");
                        break Ok(());
                    }
                }
            }
        };

        self.state.send_replace(ConsumerState::Idle);
        outcome
    }

    /// Runs the handler and settles the delivery. Settlement failures are logged and
    /// counted; they never stop the consumer.
    async fn process<H>(&self, queue: QueueName, handler: &H, delivery: &Delivery)
    where
        H: MessageHandler + ?Sized,
    {
        let result = match serde_json::from_slice::<Value>(&delivery.body) {
            Ok(message) => handler.handle(message).await,
            Err(err) => Err(HandlerError::from(err)),
        };

        let (outcome, settled) = match result {
            Ok(()) => ("ack", delivery.ack().await),
            Err(err) => {
                let requeue = self.options.failure_policy.requeue();
                error!(
                    target = "itsm::messaging::relay",
                    error = %err,
                    requeue,
                    "message processing failed"
                );
                ("nack", delivery.nack(requeue).await)
            }
        };

        match settled {
            Ok(()) => {
                metrics::counter!("itsm_queue_consumed_total", "queue" => queue.as_str(), "outcome" => outcome)
                    .increment(1);
                debug!(target = "itsm::messaging::relay", outcome, "message settled");
            }
            Err(err) => {
                metrics::counter!("itsm_queue_settle_errors_total", "queue" => queue.as_str(), "outcome" => outcome)
                    .increment(1);
                error!(
                    target = "itsm::messaging::relay",
                    error = %err,
                    outcome,
                    "failed to settle message"
                );
            }
        }
    }

    /// Closes the channel, then the connection. Safe to call when never connected.
    pub async fn close(&self) {
        let Some(session) = self.session.lock().await.take() else {
            return;
        };
        if let Err(err) = session.close_channel().await {
            warn!(target = "itsm::messaging::relay", error = %err, "failed to close channel");
        }
        if let Err(err) = session.close_connection().await {
            warn!(target = "itsm::messaging::relay", error = %err, "failed to close connection");
        }
        info!(target = "itsm::messaging::relay", "message relay closed");
    }
}
