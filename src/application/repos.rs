//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use itsm_api_types::{ServiceCategory, ServiceStatus};
use thiserror::Error;

use crate::domain::entities::{ServiceRecord, UserRecord};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

/// Fields to overwrite; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.password_hash.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct NewService {
    pub name: String,
    pub description: Option<String>,
    pub category: ServiceCategory,
    pub status: ServiceStatus,
    pub owner: String,
}

#[derive(Debug, Clone, Default)]
pub struct ServiceChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<ServiceCategory>,
    pub status: Option<ServiceStatus>,
    pub owner: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceFilter {
    pub category: Option<ServiceCategory>,
    pub status: Option<ServiceStatus>,
}

impl ServiceFilter {
    pub fn matches(&self, service: &ServiceRecord) -> bool {
        self.category.is_none_or(|category| service.category == category)
            && self.status.is_none_or(|status| service.status == status)
    }
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn list_users(&self) -> Result<Vec<UserRecord>, RepoError>;

    async fn find_user(&self, id: i64) -> Result<Option<UserRecord>, RepoError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError>;

    /// Fails with [`RepoError::Duplicate`] when the email is taken.
    async fn create_user(&self, user: NewUser) -> Result<UserRecord, RepoError>;

    /// Fails with [`RepoError::NotFound`] when no user has `id`.
    async fn update_user(&self, id: i64, changes: UserChanges) -> Result<UserRecord, RepoError>;

    async fn delete_user(&self, id: i64) -> Result<(), RepoError>;
}

#[async_trait]
pub trait ServicesRepo: Send + Sync {
    /// Newest first.
    async fn list_services(&self, filter: ServiceFilter) -> Result<Vec<ServiceRecord>, RepoError>;

    async fn find_service(&self, id: i64) -> Result<Option<ServiceRecord>, RepoError>;

    async fn create_service(&self, service: NewService) -> Result<ServiceRecord, RepoError>;

    async fn update_service(
        &self,
        id: i64,
        changes: ServiceChanges,
    ) -> Result<ServiceRecord, RepoError>;

    async fn delete_service(&self, id: i64) -> Result<(), RepoError>;
}
