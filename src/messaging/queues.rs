use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Durable queues declared on every connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueName {
    ServiceCreated,
    UserRegistered,
    NotificationSend,
    ReportGenerate,
}

impl QueueName {
    pub const ALL: [QueueName; 4] = [
        QueueName::ServiceCreated,
        QueueName::UserRegistered,
        QueueName::NotificationSend,
        QueueName::ReportGenerate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QueueName::ServiceCreated => "service.created",
            QueueName::UserRegistered => "user.registered",
            QueueName::NotificationSend => "notification.send",
            QueueName::ReportGenerate => "report.generate",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown queue `{0}`")]
pub struct UnknownQueue(pub String);

impl FromStr for QueueName {
    type Err = UnknownQueue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        QueueName::ALL
            .into_iter()
            .find(|queue| queue.as_str() == value)
            .ok_or_else(|| UnknownQueue(value.to_string()))
    }
}
