//! Wire types shared by the ITSM HTTP API, its queue publishers and the notification worker.
//!
//! Field names follow the JSON conventions of the public API (`camelCase`). Service catalogue
//! enumerations keep their stored values verbatim, including the Portuguese labels used by
//! existing databases and clients.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

// ----- Service catalogue enumerations -----

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceCategory {
    #[serde(rename = "Infraestrutura")]
    Infrastructure,
    #[serde(rename = "Software")]
    Software,
    #[serde(rename = "Hardware")]
    Hardware,
    #[serde(rename = "Suporte")]
    Support,
    #[default]
    #[serde(rename = "Geral")]
    General,
}

impl ServiceCategory {
    pub const ALL: [ServiceCategory; 5] = [
        ServiceCategory::Infrastructure,
        ServiceCategory::Software,
        ServiceCategory::Hardware,
        ServiceCategory::Support,
        ServiceCategory::General,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceCategory::Infrastructure => "Infraestrutura",
            ServiceCategory::Software => "Software",
            ServiceCategory::Hardware => "Hardware",
            ServiceCategory::Support => "Suporte",
            ServiceCategory::General => "Geral",
        }
    }
}

impl fmt::Display for ServiceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceCategory {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == value)
            .ok_or_else(|| UnknownVariant::new("category", value))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceStatus {
    #[default]
    #[serde(rename = "Ativo")]
    Active,
    #[serde(rename = "Inativo")]
    Inactive,
    #[serde(rename = "Em Manutenção")]
    Maintenance,
}

impl ServiceStatus {
    pub const ALL: [ServiceStatus; 3] = [
        ServiceStatus::Active,
        ServiceStatus::Inactive,
        ServiceStatus::Maintenance,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceStatus::Active => "Ativo",
            ServiceStatus::Inactive => "Inativo",
            ServiceStatus::Maintenance => "Em Manutenção",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceStatus {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == value)
            .ok_or_else(|| UnknownVariant::new("status", value))
    }
}

/// Returned when a stored or submitted label matches no enumeration variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub field: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(field: &'static str, value: &str) -> Self {
        Self {
            field,
            value: value.to_string(),
        }
    }
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} `{}`", self.field, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

// ----- Users -----

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Partial update; absent or empty fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEnvelope<U> {
    pub message: String,
    pub user: U,
}

// ----- Services -----

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateServiceRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub status: Option<String>,
    pub owner: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateServiceRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub status: Option<String>,
    pub owner: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceListQuery {
    pub category: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceView {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub category: ServiceCategory,
    pub status: ServiceStatus,
    pub owner: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEnvelope {
    pub message: String,
    pub service: ServiceView,
}

// ----- Auth and generic bodies -----

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignInRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignInResponse {
    pub message: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

// ----- Queue payloads -----

/// A user reference as carried in notification payloads: numeric ids from the API,
/// or a raw chat handle from other producers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserRef {
    Id(i64),
    Handle(String),
}

impl fmt::Display for UserRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRef::Id(id) => write!(f, "{id}"),
            UserRef::Handle(handle) => f.write_str(handle),
        }
    }
}

impl From<i64> for UserRef {
    fn from(id: i64) -> Self {
        UserRef::Id(id)
    }
}

/// Body published on `service.created`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCreatedEvent {
    pub event: String,
    pub service_id: i64,
    pub service_name: String,
    pub created_by: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Body published on `user.registered`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRegisteredEvent {
    pub event: String,
    pub user_id: i64,
    pub user_name: String,
    pub user_email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub registered_at: OffsetDateTime,
}

/// Body published on `notification.send` and consumed by the notification worker.
///
/// Every field is optional on the consuming side; `type` falls back to `info`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn service_enums_use_stored_labels() {
        let value = serde_json::to_value(ServiceStatus::Maintenance).expect("serialize");
        assert_eq!(value, json!("Em Manutenção"));
        assert_eq!(
            "Suporte".parse::<ServiceCategory>(),
            Ok(ServiceCategory::Support)
        );
        assert!("Support".parse::<ServiceCategory>().is_err());
    }

    #[test]
    fn notification_payload_accepts_numeric_and_string_users() {
        let numeric: NotificationPayload =
            serde_json::from_value(json!({"userId": 5, "type": "error"})).expect("numeric");
        assert_eq!(numeric.user_id, Some(UserRef::Id(5)));
        assert_eq!(numeric.kind.as_deref(), Some("error"));

        let handle: NotificationPayload =
            serde_json::from_value(json!({"userId": "U123"})).expect("handle");
        assert_eq!(handle.user_id, Some(UserRef::Handle("U123".into())));
        assert!(handle.kind.is_none());
    }

    #[test]
    fn error_body_omits_empty_details() {
        let body = ErrorBody {
            error: "User not found.".into(),
            details: Vec::new(),
        };
        assert_eq!(
            serde_json::to_value(body).expect("serialize"),
            json!({"error": "User not found."})
        );
    }
}
