//! Notification requests routed from the queue to the chat channel.

use std::fmt;

use itsm_api_types::{NotificationPayload, UserRef};
use serde_json::{Map, Value};

pub const DEFAULT_TITLE: &str = "System notification";
pub const DEFAULT_MESSAGE: &str = "You have a new notification";

/// Severity of a notification. Unknown labels are kept so they can still be displayed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Warning,
    Error,
    #[default]
    Info,
    Other(String),
}

impl NotificationKind {
    /// Blank labels count as `info`.
    pub fn parse(label: &str) -> Self {
        match label.trim() {
            "" => NotificationKind::Info,
            "success" => NotificationKind::Success,
            "warning" => NotificationKind::Warning,
            "error" => NotificationKind::Error,
            "info" => NotificationKind::Info,
            _ => NotificationKind::Other(label.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            NotificationKind::Success => "success",
            NotificationKind::Warning => "warning",
            NotificationKind::Error => "error",
            NotificationKind::Info => "info",
            NotificationKind::Other(label) => label,
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            NotificationKind::Success => "✅",
            NotificationKind::Warning => "⚠️",
            NotificationKind::Error => "❌",
            NotificationKind::Info => "ℹ️",
            NotificationKind::Other(_) => "📌",
        }
    }

    /// Upper-cased label shown next to the emoji.
    pub fn label(&self) -> String {
        self.as_str().to_uppercase()
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRequest {
    pub title: Option<String>,
    pub message: Option<String>,
    pub kind: NotificationKind,
    pub user: Option<UserRef>,
    pub metadata: Map<String, Value>,
}

impl NotificationRequest {
    pub fn new(kind: NotificationKind) -> Self {
        Self {
            title: None,
            message: None,
            kind,
            user: None,
            metadata: Map::new(),
        }
    }
}

impl From<NotificationPayload> for NotificationRequest {
    fn from(payload: NotificationPayload) -> Self {
        let kind = payload
            .kind
            .as_deref()
            .map(NotificationKind::parse)
            .unwrap_or_default();
        Self {
            title: payload.title,
            message: payload.message,
            kind,
            user: payload.user_id,
            metadata: payload.metadata.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_kinds_fall_back_to_pin() {
        let kind = NotificationKind::parse("welcome");
        assert_eq!(kind.emoji(), "📌");
        assert_eq!(kind.label(), "WELCOME");
    }

    #[test]
    fn blank_type_is_info() {
        let payload = NotificationPayload {
            kind: Some(String::new()),
            ..NotificationPayload::default()
        };
        let request = NotificationRequest::from(payload);
        assert_eq!(request.kind, NotificationKind::Info);
        assert_eq!(request.kind.label(), "INFO");
        assert_eq!(NotificationKind::parse("  "), NotificationKind::Info);
    }

    #[test]
    fn payload_without_type_is_info() {
        let request = NotificationRequest::from(NotificationPayload::default());
        assert_eq!(request.kind, NotificationKind::Info);
        assert!(request.metadata.is_empty());
    }
}
