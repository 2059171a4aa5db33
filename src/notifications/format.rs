//! Plain-text rendering of notifications for chat.

use std::fmt::Write as _;

use serde_json::Value;

use crate::domain::notifications::{DEFAULT_MESSAGE, DEFAULT_TITLE, NotificationRequest};

/// `<emoji> [<LABEL>] <title>\n\n<message>`, then the metadata list and the user mention.
pub fn notification_text(request: &NotificationRequest) -> String {
    let kind = &request.kind;
    let mut text = format!(
        "{} [{}] {}\n\n{}",
        kind.emoji(),
        kind.label(),
        non_empty(request.title.as_deref()).unwrap_or(DEFAULT_TITLE),
        non_empty(request.message.as_deref()).unwrap_or(DEFAULT_MESSAGE),
    );

    if !request.metadata.is_empty() {
        text.push_str("\n\n_Additional details:_\n");
        for (key, value) in &request.metadata {
            let _ = writeln!(text, "• {key}: {}", display_value(value));
        }
    }

    if let Some(user) = &request.user {
        let _ = write!(text, "\n_User: <@{user}>_");
    }

    text
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
