//! RabbitMQ broker over AMQP 0-9-1.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties,
    acker::Acker,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        BasicQosOptions, QueueDeclareOptions,
    },
    types::FieldTable,
};
use tracing::info;

use super::{
    RelayError,
    broker::{Acknowledge, Broker, BrokerSession, Delivery, DeliveryStream, PublishOptions},
};

const CLOSE_REPLY_CODE: u16 = 200;
const PERSISTENT_DELIVERY_MODE: u8 = 2;

pub struct AmqpBroker {
    url: String,
    prefetch: u16,
}

impl AmqpBroker {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            prefetch: 1,
        }
    }

    pub fn with_prefetch(mut self, prefetch: u16) -> Self {
        self.prefetch = prefetch;
        self
    }
}

fn channel_error(op: &'static str) -> impl FnOnce(lapin::Error) -> RelayError {
    move |err| RelayError::Channel {
        op,
        message: err.to_string(),
    }
}

#[async_trait]
impl Broker for AmqpBroker {
    fn name(&self) -> &'static str {
        "amqp"
    }

    async fn open(&self) -> Result<Box<dyn BrokerSession>, RelayError> {
        let connection = Connection::connect(&self.url, ConnectionProperties::default())
            .await
            .map_err(|err| RelayError::Connection(err.to_string()))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(channel_error("create_channel"))?;
        channel
            .basic_qos(self.prefetch, BasicQosOptions::default())
            .await
            .map_err(channel_error("basic_qos"))?;
        info!(target = "itsm::messaging::amqp", "connected to broker");
        Ok(Box::new(AmqpSession {
            connection,
            channel,
        }))
    }
}

struct AmqpSession {
    connection: Connection,
    channel: Channel,
}

#[async_trait]
impl BrokerSession for AmqpSession {
    async fn declare_queue(&self, queue: &str) -> Result<(), RelayError> {
        let options = QueueDeclareOptions {
            durable: true,
            ..QueueDeclareOptions::default()
        };
        self.channel
            .queue_declare(queue, options, FieldTable::default())
            .await
            .map_err(channel_error("queue_declare"))?;
        Ok(())
    }

    async fn publish(
        &self,
        queue: &str,
        body: Bytes,
        options: PublishOptions,
    ) -> Result<(), RelayError> {
        let mut properties = BasicProperties::default().with_content_type("application/json".into());
        if options.persistent {
            properties = properties.with_delivery_mode(PERSISTENT_DELIVERY_MODE);
        }
        if let Some(priority) = options.priority {
            properties = properties.with_priority(priority);
        }
        self.channel
            .basic_publish("", queue, BasicPublishOptions::default(), &body, properties)
            .await
            .map_err(channel_error("basic_publish"))?
            .await
            .map_err(channel_error("publisher_confirm"))?;
        Ok(())
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream, RelayError> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(channel_error("basic_consume"))?;

        let stream = consumer.map(|delivery| {
            delivery
                .map(|delivery| {
                    Delivery::new(
                        Bytes::from(delivery.data),
                        AmqpAcker {
                            acker: delivery.acker,
                        },
                    )
                })
                .map_err(channel_error("delivery"))
        });
        Ok(stream.boxed())
    }

    async fn close_channel(&self) -> Result<(), RelayError> {
        self.channel
            .close(CLOSE_REPLY_CODE, "closing")
            .await
            .map_err(channel_error("channel_close"))
    }

    async fn close_connection(&self) -> Result<(), RelayError> {
        self.connection
            .close(CLOSE_REPLY_CODE, "closing")
            .await
            .map_err(channel_error("connection_close"))
    }
}

struct AmqpAcker {
    acker: Acker,
}

#[async_trait]
impl Acknowledge for AmqpAcker {
    async fn ack(&self) -> Result<(), RelayError> {
        self.acker
            .ack(BasicAckOptions::default())
            .await
            .map_err(channel_error("basic_ack"))
    }

    async fn nack(&self, requeue: bool) -> Result<(), RelayError> {
        let options = BasicNackOptions {
            requeue,
            ..BasicNackOptions::default()
        };
        self.acker
            .nack(options)
            .await
            .map_err(channel_error("basic_nack"))
    }
}
