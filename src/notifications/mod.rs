//! Chat notifications: Slack client, text formatting and the queue worker.

mod format;
mod slack;
mod worker;

pub use format::notification_text;
pub use slack::{
    DEFAULT_API_BASE, DEFAULT_CHANNEL, MessageOptions, PostedMessage, SlackClient, SlackError,
    SlackSettings,
};
pub use worker::{NotificationWorker, WORKER_SOURCE};
