//! Domain entities mirrored from persistent storage.

use itsm_api_types::{ServiceCategory, ServiceStatus, ServiceView, UserSummary, UserView};
use time::OffsetDateTime;

/// A registered user. `password_hash` never leaves the application layer.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl UserRecord {
    pub fn view(&self) -> UserView {
        UserView {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

/// A service catalogue entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRecord {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub category: ServiceCategory,
    pub status: ServiceStatus,
    pub owner: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl ServiceRecord {
    pub fn view(&self) -> ServiceView {
        ServiceView {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            category: self.category,
            status: self.status,
            owner: self.owner.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
