//! Consumer of `notification.send`: enriches each payload and forwards it to Slack.

use std::sync::Arc;

use async_trait::async_trait;
use itsm_api_types::NotificationPayload;
use serde_json::{Map, Value};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::{info, warn};

use crate::domain::notifications::{DEFAULT_MESSAGE, DEFAULT_TITLE, NotificationRequest};
use crate::messaging::{HandlerError, MessageHandler};

use super::slack::SlackClient;

pub const WORKER_SOURCE: &str = "notification-worker";

pub struct NotificationWorker {
    slack: Arc<SlackClient>,
}

impl NotificationWorker {
    pub fn new(slack: Arc<SlackClient>) -> Self {
        Self { slack }
    }

    /// Fills defaults and prepends `timestamp`/`source` to the metadata. Payload metadata
    /// keys override the worker's own.
    pub fn enrich(payload: NotificationPayload) -> (NotificationRequest, Option<String>) {
        let channel = payload.channel.clone();
        let mut request = NotificationRequest::from(payload);
        request.title.get_or_insert_with(|| DEFAULT_TITLE.to_string());
        request
            .message
            .get_or_insert_with(|| DEFAULT_MESSAGE.to_string());

        let mut metadata = Map::new();
        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        metadata.insert("timestamp".to_string(), Value::String(timestamp));
        metadata.insert("source".to_string(), Value::String(WORKER_SOURCE.to_string()));
        metadata.extend(std::mem::take(&mut request.metadata));
        request.metadata = metadata;

        (request, channel)
    }
}

#[async_trait]
impl MessageHandler for NotificationWorker {
    async fn handle(&self, message: Value) -> Result<(), HandlerError> {
        let payload: NotificationPayload = serde_json::from_value(message)?;
        let user = payload.user_id.as_ref().map(ToString::to_string);
        info!(
            target = "itsm::notifications::worker",
            kind = payload.kind.as_deref().unwrap_or("info"),
            user = user.as_deref().unwrap_or("-"),
            "processing notification"
        );

        if !self.slack.is_configured() {
            warn!(target = "itsm::notifications::worker", "slack not configured; notification skipped");
            return Ok(());
        }

        let (request, channel) = Self::enrich(payload);
        // Delivery failures are logged only; the message is still acknowledged.
        match self.slack.send_notification(&request, channel.as_deref()).await {
            Ok(_) => {
                info!(target = "itsm::notifications::worker", user = user.as_deref().unwrap_or("-"), "notification delivered");
            }
            Err(err) => {
                warn!(target = "itsm::notifications::worker", error = %err, "failed to deliver notification");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::notifications::NotificationKind;

    #[test]
    fn enrich_fills_defaults_and_metadata() {
        let payload: NotificationPayload = serde_json::from_value(json!({
            "type": "warning",
            "metadata": {"ticket": "INC-42", "source": "monitoring"},
            "channel": "#ops"
        }))
        .expect("payload");

        let (request, channel) = NotificationWorker::enrich(payload);
        assert_eq!(channel.as_deref(), Some("#ops"));
        assert_eq!(request.kind, NotificationKind::Warning);
        assert_eq!(request.title.as_deref(), Some(DEFAULT_TITLE));
        assert_eq!(request.message.as_deref(), Some(DEFAULT_MESSAGE));

        let keys: Vec<&str> = request.metadata.keys().map(String::as_str).collect();
        assert_eq!(keys[0], "timestamp");
        assert_eq!(request.metadata["source"], json!("monitoring"));
        assert_eq!(request.metadata["ticket"], json!("INC-42"));
    }
}
