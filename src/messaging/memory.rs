//! In-process broker for tests and local runs without RabbitMQ.
//!
//! Queues are FIFO buffers shared by every session opened from the same [`MemoryBroker`].
//! Every publish is also kept in a log, and every ack/nack and close is recorded, so tests
//! can assert on what the relay did.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream};
use serde_json::Value;
use tokio::sync::Notify;

use crate::util::lock;

use super::{
    RelayError,
    broker::{Acknowledge, Broker, BrokerSession, Delivery, DeliveryStream, PublishOptions},
};

const OWNER: &str = "messaging::memory";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Acked,
    Nacked { requeue: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Opened,
    ChannelClosed,
    ConnectionClosed,
}

#[derive(Default)]
struct State {
    queues: Mutex<HashMap<String, VecDeque<Bytes>>>,
    declared: Mutex<HashSet<String>>,
    published: Mutex<Vec<(String, Bytes)>>,
    settlements: Mutex<Vec<(Bytes, Settlement)>>,
    events: Mutex<Vec<SessionEvent>>,
    fail_publish: AtomicBool,
    fail_settle: AtomicBool,
    arrivals: Notify,
}

impl State {
    fn push(&self, queue: &str, body: Bytes, front: bool) {
        {
            let mut queues = lock::lock(&self.queues, OWNER, "push");
            let buffer = queues.entry(queue.to_string()).or_default();
            if front {
                buffer.push_front(body);
            } else {
                buffer.push_back(body);
            }
        }
        self.arrivals.notify_waiters();
    }

    fn pop(&self, queue: &str) -> Option<Bytes> {
        lock::lock(&self.queues, OWNER, "pop")
            .get_mut(queue)
            .and_then(VecDeque::pop_front)
    }
}

#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<State>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent publish fail, to exercise error paths.
    pub fn fail_publishes(&self, fail: bool) {
        self.state.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent ack and nack fail as if the channel had closed.
    pub fn fail_settlements(&self, fail: bool) {
        self.state.fail_settle.store(fail, Ordering::SeqCst);
    }

    /// Enqueues a raw body directly, bypassing the relay envelope.
    pub fn inject(&self, queue: &str, body: impl Into<Bytes>) {
        self.state.push(queue, body.into(), false);
    }

    pub fn declared_queues(&self) -> Vec<String> {
        let mut queues: Vec<String> = lock::lock(&self.state.declared, OWNER, "declared")
            .iter()
            .cloned()
            .collect();
        queues.sort();
        queues
    }

    /// Every JSON message ever published to `queue`, in order.
    pub fn published(&self, queue: &str) -> Vec<Value> {
        lock::lock(&self.state.published, OWNER, "published")
            .iter()
            .filter(|(name, _)| name == queue)
            .filter_map(|(_, body)| serde_json::from_slice(body).ok())
            .collect()
    }

    /// Messages still waiting in `queue`.
    pub fn pending(&self, queue: &str) -> usize {
        lock::lock(&self.state.queues, OWNER, "pending")
            .get(queue)
            .map_or(0, VecDeque::len)
    }

    pub fn settlements(&self) -> Vec<(Bytes, Settlement)> {
        lock::lock(&self.state.settlements, OWNER, "settlements").clone()
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        lock::lock(&self.state.events, OWNER, "events").clone()
    }

    fn record(&self, event: SessionEvent) {
        lock::lock(&self.state.events, OWNER, "record").push(event);
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn open(&self) -> Result<Box<dyn BrokerSession>, RelayError> {
        self.record(SessionEvent::Opened);
        Ok(Box::new(MemorySession {
            broker: self.clone(),
        }))
    }
}

struct MemorySession {
    broker: MemoryBroker,
}

#[async_trait]
impl BrokerSession for MemorySession {
    async fn declare_queue(&self, queue: &str) -> Result<(), RelayError> {
        lock::lock(&self.broker.state.declared, OWNER, "declare").insert(queue.to_string());
        Ok(())
    }

    async fn publish(
        &self,
        queue: &str,
        body: Bytes,
        _options: PublishOptions,
    ) -> Result<(), RelayError> {
        let state = &self.broker.state;
        if state.fail_publish.load(Ordering::SeqCst) {
            return Err(RelayError::Channel {
                op: "publish",
                message: "broker unavailable".to_string(),
            });
        }
        lock::lock(&state.published, OWNER, "publish.log").push((queue.to_string(), body.clone()));
        state.push(queue, body, false);
        Ok(())
    }

    async fn consume(&self, queue: &str, _consumer_tag: &str) -> Result<DeliveryStream, RelayError> {
        let state = self.broker.state.clone();
        let queue = queue.to_string();
        let deliveries = stream::unfold((state, queue), |(state, queue)| async move {
            let waiter = state.clone();
            loop {
                let arrived = waiter.arrivals.notified();
                if let Some(body) = state.pop(&queue) {
                    let acker = MemoryAcker {
                        state: state.clone(),
                        queue: queue.clone(),
                        body: body.clone(),
                    };
                    return Some((Ok(Delivery::new(body, acker)), (state, queue)));
                }
                arrived.await;
            }
        });
        Ok(deliveries.boxed())
    }

    async fn close_channel(&self) -> Result<(), RelayError> {
        self.broker.record(SessionEvent::ChannelClosed);
        Ok(())
    }

    async fn close_connection(&self) -> Result<(), RelayError> {
        self.broker.record(SessionEvent::ConnectionClosed);
        Ok(())
    }
}

struct MemoryAcker {
    state: Arc<State>,
    queue: String,
    body: Bytes,
}

impl MemoryAcker {
    fn settle(&self, op: &'static str, settlement: Settlement) -> Result<(), RelayError> {
        if self.state.fail_settle.load(Ordering::SeqCst) {
            return Err(RelayError::Channel {
                op,
                message: "channel closed".to_string(),
            });
        }
        lock::lock(&self.state.settlements, OWNER, "settle").push((self.body.clone(), settlement));
        Ok(())
    }
}

#[async_trait]
impl Acknowledge for MemoryAcker {
    async fn ack(&self) -> Result<(), RelayError> {
        self.settle("basic_ack", Settlement::Acked)
    }

    async fn nack(&self, requeue: bool) -> Result<(), RelayError> {
        self.settle("basic_nack", Settlement::Nacked { requeue })?;
        if requeue {
            self.state.push(&self.queue, self.body.clone(), true);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn consumer_receives_messages_published_later() {
        let broker = MemoryBroker::new();
        let session = broker.open().await.expect("open");
        let mut deliveries = session.consume("q", "test").await.expect("consume");

        let publisher = broker.open().await.expect("open");
        let waiter = tokio::spawn(async move { deliveries.next().await });
        tokio::task::yield_now().await;
        publisher
            .publish("q", Bytes::from_static(b"{}"), PublishOptions::default())
            .await
            .expect("publish");

        let delivery = waiter.await.expect("join").expect("item").expect("delivery");
        assert_eq!(delivery.body, Bytes::from_static(b"{}"));
        delivery.ack().await.expect("ack");
        assert_eq!(broker.settlements()[0].1, Settlement::Acked);
    }

    #[tokio::test]
    async fn requeued_nack_returns_message_to_queue() {
        let broker = MemoryBroker::new();
        broker.inject("q", "payload");
        let session = broker.open().await.expect("open");
        let mut deliveries = session.consume("q", "test").await.expect("consume");

        let delivery = deliveries.next().await.expect("item").expect("delivery");
        delivery.nack(true).await.expect("nack");
        assert_eq!(broker.pending("q"), 1);
    }
}
