use std::sync::Arc;

use itsm_api_types::{CreateUserRequest, NotificationPayload, UpdateUserRequest, UserRef};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::application::events::EventPublisher;
use crate::application::repos::{NewUser, RepoError, UserChanges, UsersRepo};
use crate::cache::{CacheHelper, CachedResource};
use crate::domain::entities::UserRecord;
use crate::domain::error::DomainError;
use crate::domain::validation::{Violations, check_email, check_password, check_user_name};
use crate::messaging::RelayError;

pub const DEFAULT_BCRYPT_COST: u32 = 10;
const WELCOME_KIND: &str = "welcome";

#[derive(Debug, Error)]
pub enum UserServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("email is already in use")]
    DuplicateEmail,
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Relay(#[from] RelayError),
}

#[derive(Clone)]
pub struct UserService {
    repo: Arc<dyn UsersRepo>,
    cache: CacheHelper,
    events: EventPublisher,
    bcrypt_cost: u32,
}

impl UserService {
    pub fn new(
        repo: Arc<dyn UsersRepo>,
        cache: CacheHelper,
        events: EventPublisher,
        bcrypt_cost: u32,
    ) -> Self {
        Self {
            repo,
            cache,
            events,
            bcrypt_cost,
        }
    }

    pub async fn list(&self) -> Result<Vec<UserRecord>, UserServiceError> {
        Ok(self.repo.list_users().await?)
    }

    pub async fn get(&self, id: i64) -> Result<UserRecord, UserServiceError> {
        self.repo
            .find_user(id)
            .await?
            .ok_or_else(|| DomainError::not_found("user").into())
    }

    /// Registers a user, then announces it on `user.registered` and queues a welcome
    /// notification. Publish failures fail the call after the user has been stored.
    #[instrument(skip(self, request))]
    pub async fn create(&self, request: CreateUserRequest) -> Result<UserRecord, UserServiceError> {
        let name = request.name.unwrap_or_default();
        let email = request.email.unwrap_or_default();
        let password = request.password.unwrap_or_default();

        let mut violations = Violations::new();
        check_user_name(&name, &mut violations);
        check_email(&email, &mut violations);
        check_password(&password, &mut violations);
        violations.into_result()?;

        let password_hash = hash_password(password, self.bcrypt_cost).await?;
        let user = self
            .repo
            .create_user(NewUser {
                name: name.trim().to_string(),
                email: email.trim().to_string(),
                password_hash,
            })
            .await
            .map_err(duplicate_email)?;

        self.cache
            .invalidate_resource(CachedResource::Users, None)
            .await;

        self.events.publish_user_registered(&user).await?;
        self.events.send_notification(welcome_notification(&user)).await?;

        info!(target = "itsm::application::users", user_id = user.id, "user created");
        Ok(user)
    }

    /// Applies the non-empty fields of `request`.
    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        id: i64,
        request: UpdateUserRequest,
    ) -> Result<UserRecord, UserServiceError> {
        let name = request.name.filter(|v| !v.is_empty());
        let email = request.email.filter(|v| !v.is_empty());
        let password = request.password.filter(|v| !v.is_empty());

        let mut violations = Violations::new();
        if let Some(name) = &name {
            check_user_name(name, &mut violations);
        }
        if let Some(email) = &email {
            check_email(email, &mut violations);
        }
        violations.into_result()?;

        let password_hash = match password {
            Some(password) => Some(hash_password(password, self.bcrypt_cost).await?),
            None => None,
        };
        let changes = UserChanges {
            name: name.map(|v| v.trim().to_string()),
            email: email.map(|v| v.trim().to_string()),
            password_hash,
        };

        let user = self
            .repo
            .update_user(id, changes)
            .await
            .map_err(|err| match err {
                RepoError::NotFound => DomainError::not_found("user").into(),
                other => duplicate_email(other),
            })?;

        self.cache
            .invalidate_resource(CachedResource::Users, Some(id))
            .await;
        info!(target = "itsm::application::users", user_id = id, "user updated");
        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<(), UserServiceError> {
        match self.repo.delete_user(id).await {
            Ok(()) => {}
            Err(RepoError::NotFound) => {
                warn!(target = "itsm::application::users", user_id = id, "delete requested for unknown user");
                return Err(DomainError::not_found("user").into());
            }
            Err(err) => return Err(err.into()),
        }
        self.cache
            .invalidate_resource(CachedResource::Users, Some(id))
            .await;
        info!(target = "itsm::application::users", user_id = id, "user deleted");
        Ok(())
    }
}

fn duplicate_email(err: RepoError) -> UserServiceError {
    match err {
        RepoError::Duplicate { .. } => UserServiceError::DuplicateEmail,
        other => UserServiceError::Repo(other),
    }
}

fn welcome_notification(user: &UserRecord) -> NotificationPayload {
    let mut metadata = Map::new();
    metadata.insert("isWelcome".to_string(), Value::Bool(true));
    NotificationPayload {
        kind: Some(WELCOME_KIND.to_string()),
        user_id: Some(UserRef::Id(user.id)),
        title: Some("Welcome!".to_string()),
        message: Some(format!("Hello {}, welcome to the service desk!", user.name)),
        metadata: Some(metadata),
        ..NotificationPayload::default()
    }
}

pub(crate) async fn hash_password(password: String, cost: u32) -> Result<String, UserServiceError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|err| UserServiceError::Hashing(err.to_string()))?
        .map_err(|err| UserServiceError::Hashing(err.to_string()))
}
