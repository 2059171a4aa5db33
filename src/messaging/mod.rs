//! Asynchronous messaging: queue definitions, the relay, and its broker backends.

mod amqp;
mod broker;
mod memory;
mod message;
mod queues;
mod relay;

use thiserror::Error;

pub use amqp::AmqpBroker;
pub use broker::{
    Acknowledge, Broker, BrokerSession, Delivery, DeliveryStream, PublishOptions,
};
pub use memory::{MemoryBroker, SessionEvent, Settlement};
pub use message::generate_message_id;
pub use queues::{QueueName, UnknownQueue};
pub use relay::{
    ConsumerState, FailurePolicy, HandlerError, MessageHandler, MessageRelay, RelayOptions,
};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to connect to broker: {0}")]
    Connection(String),
    #[error("broker operation `{op}` failed: {message}")]
    Channel { op: &'static str, message: String },
    #[error("queue messages must be JSON objects")]
    NotAnObject,
    #[error("failed to encode message: {0}")]
    Encode(String),
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Encode(err.to_string())
    }
}
