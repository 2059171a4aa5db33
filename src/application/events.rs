//! Typed publishers for the domain events carried by the message relay.

use std::sync::Arc;

use itsm_api_types::{NotificationPayload, ServiceCreatedEvent, UserRegisteredEvent};

use crate::domain::entities::{ServiceRecord, UserRecord};
use crate::messaging::{MessageRelay, PublishOptions, QueueName, RelayError};

pub const SERVICE_CREATED_EVENT: &str = "service_created";
pub const USER_REGISTERED_EVENT: &str = "user_registered";
pub const SEND_NOTIFICATION_EVENT: &str = "send_notification";

#[derive(Clone)]
pub struct EventPublisher {
    relay: Arc<MessageRelay>,
}

impl EventPublisher {
    pub fn new(relay: Arc<MessageRelay>) -> Self {
        Self { relay }
    }

    pub fn relay(&self) -> &Arc<MessageRelay> {
        &self.relay
    }

    pub async fn publish_service_created(
        &self,
        service: &ServiceRecord,
        created_by: &str,
    ) -> Result<String, RelayError> {
        let event = ServiceCreatedEvent {
            event: SERVICE_CREATED_EVENT.to_string(),
            service_id: service.id,
            service_name: service.name.clone(),
            created_by: created_by.to_string(),
            created_at: service.created_at,
        };
        self.publish(QueueName::ServiceCreated, &event).await
    }

    pub async fn publish_user_registered(&self, user: &UserRecord) -> Result<String, RelayError> {
        let event = UserRegisteredEvent {
            event: USER_REGISTERED_EVENT.to_string(),
            user_id: user.id,
            user_name: user.name.clone(),
            user_email: user.email.clone(),
            registered_at: user.created_at,
        };
        self.publish(QueueName::UserRegistered, &event).await
    }

    /// Queues a chat notification for the worker. `event` is always `send_notification`.
    pub async fn send_notification(
        &self,
        mut payload: NotificationPayload,
    ) -> Result<String, RelayError> {
        payload.event = Some(SEND_NOTIFICATION_EVENT.to_string());
        payload.metadata.get_or_insert_with(Default::default);
        self.publish(QueueName::NotificationSend, &payload).await
    }

    async fn publish<T: serde::Serialize>(
        &self,
        queue: QueueName,
        body: &T,
    ) -> Result<String, RelayError> {
        let message = serde_json::to_value(body)?;
        self.relay
            .publish_message(queue, message, PublishOptions::default())
            .await
    }
}
