//! Slack Web API client (`chat.postMessage`).

use std::time::Duration;

use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::domain::notifications::NotificationRequest;

use super::format::notification_text;

pub const DEFAULT_API_BASE: &str = "https://slack.com/api/";
pub const DEFAULT_CHANNEL: &str = "#notifications";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum SlackError {
    #[error("invalid Slack API URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("slack rejected the message: {0}")]
    Api(String),
}

#[derive(Debug, Clone)]
pub struct SlackSettings {
    pub bot_token: Option<String>,
    pub default_channel: String,
    pub api_base_url: Url,
}

/// Optional `chat.postMessage` fields.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MessageOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_emoji: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
}

/// Where Slack stored a posted message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PostedMessage {
    pub channel: String,
    pub ts: String,
}

#[derive(Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    blocks: Option<&'a [Value]>,
    #[serde(flatten)]
    options: &'a MessageOptions,
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

#[derive(Clone)]
pub struct SlackClient {
    client: Client,
    endpoint: Url,
    token: Option<String>,
    default_channel: String,
}

impl SlackClient {
    pub fn new(settings: &SlackSettings) -> Result<Self, SlackError> {
        let client = Client::builder()
            .user_agent(concat!("itsm/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let endpoint = settings.api_base_url.join("chat.postMessage")?;
        let token = settings
            .bot_token
            .clone()
            .filter(|token| !token.trim().is_empty());
        if token.is_none() {
            warn!(target = "itsm::notifications::slack", "slack bot token not configured; notifications are disabled");
        }
        Ok(Self {
            client,
            endpoint,
            token,
            default_channel: settings.default_channel.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.token.is_some()
    }

    pub fn default_channel(&self) -> &str {
        &self.default_channel
    }

    /// Posts plain text. Returns `Ok(None)` without calling Slack when no token is set.
    #[instrument(skip(self, text, options), fields(text_len = text.len()))]
    pub async fn send_message(
        &self,
        text: &str,
        channel: Option<&str>,
        options: &MessageOptions,
    ) -> Result<Option<PostedMessage>, SlackError> {
        let channel = channel.unwrap_or(&self.default_channel);
        self.post(PostMessage {
            channel,
            text: Some(text),
            blocks: None,
            options,
        })
        .await
    }

    /// Posts a Block Kit message.
    #[instrument(skip(self, blocks, options), fields(blocks = blocks.len()))]
    pub async fn send_blocks(
        &self,
        blocks: &[Value],
        channel: Option<&str>,
        options: &MessageOptions,
    ) -> Result<Option<PostedMessage>, SlackError> {
        let channel = channel.unwrap_or(&self.default_channel);
        self.post(PostMessage {
            channel,
            text: None,
            blocks: Some(blocks),
            options,
        })
        .await
    }

    #[instrument(skip(self, request), fields(kind = %request.kind))]
    pub async fn send_notification(
        &self,
        request: &NotificationRequest,
        channel: Option<&str>,
    ) -> Result<Option<PostedMessage>, SlackError> {
        let text = notification_text(request);
        self.send_message(&text, channel, &MessageOptions::default())
            .await
    }

    async fn post(&self, message: PostMessage<'_>) -> Result<Option<PostedMessage>, SlackError> {
        let Some(token) = self.token.as_deref() else {
            warn!(target = "itsm::notifications::slack", channel = message.channel, "slack not configured; message not sent");
            return Ok(None);
        };

        let result = self.call(token, &message).await;
        match &result {
            Ok(posted) => {
                metrics::counter!("itsm_notifications_sent_total").increment(1);
                info!(target = "itsm::notifications::slack", channel = %posted.channel, ts = %posted.ts, "message sent to slack");
            }
            Err(err) => {
                metrics::counter!("itsm_notifications_failed_total").increment(1);
                warn!(target = "itsm::notifications::slack", channel = message.channel, error = %err, "failed to send message to slack");
            }
        }
        result.map(Some)
    }

    async fn call(&self, token: &str, message: &PostMessage<'_>) -> Result<PostedMessage, SlackError> {
        let response: ApiResponse = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(token)
            .json(message)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !response.ok {
            return Err(SlackError::Api(
                response.error.unwrap_or_else(|| "unknown_error".to_string()),
            ));
        }
        Ok(PostedMessage {
            channel: response.channel.unwrap_or_else(|| message.channel.to_string()),
            ts: response.ts.unwrap_or_default(),
        })
    }
}
