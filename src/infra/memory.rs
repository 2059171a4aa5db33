//! In-memory repositories.
//!
//! Not durable: state lives for the lifetime of the process. Used by tests and by
//! `serve --in-memory` for local runs without Postgres.

use std::collections::BTreeMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::application::repos::{
    NewService, NewUser, RepoError, ServiceChanges, ServiceFilter, ServicesRepo, UserChanges,
    UsersRepo,
};
use crate::domain::entities::{ServiceRecord, UserRecord};

const USERS_EMAIL_CONSTRAINT: &str = "users_email_key";

struct Table<T> {
    next_id: i64,
    rows: BTreeMap<i64, T>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            rows: BTreeMap::new(),
        }
    }
}

impl<T> Table<T> {
    fn allocate(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct InMemoryRepositories {
    users: RwLock<Table<UserRecord>>,
    services: RwLock<Table<ServiceRecord>>,
}

impl InMemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsersRepo for InMemoryRepositories {
    async fn list_users(&self) -> Result<Vec<UserRecord>, RepoError> {
        Ok(self.users.read().await.rows.values().cloned().collect())
    }

    async fn find_user(&self, id: i64) -> Result<Option<UserRecord>, RepoError> {
        Ok(self.users.read().await.rows.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError> {
        Ok(self
            .users
            .read()
            .await
            .rows
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<UserRecord, RepoError> {
        let mut table = self.users.write().await;
        if table.rows.values().any(|existing| existing.email == user.email) {
            return Err(RepoError::Duplicate {
                constraint: USERS_EMAIL_CONSTRAINT.to_string(),
            });
        }
        let now = OffsetDateTime::now_utc();
        let record = UserRecord {
            id: table.allocate(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            created_at: now,
            updated_at: now,
        };
        table.rows.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_user(&self, id: i64, changes: UserChanges) -> Result<UserRecord, RepoError> {
        let mut table = self.users.write().await;
        let email_taken = changes.email.as_deref().is_some_and(|email| {
            table
                .rows
                .values()
                .any(|other| other.id != id && other.email == email)
        });
        if email_taken {
            return Err(RepoError::Duplicate {
                constraint: USERS_EMAIL_CONSTRAINT.to_string(),
            });
        }

        let record = table.rows.get_mut(&id).ok_or(RepoError::NotFound)?;
        if let Some(name) = changes.name {
            record.name = name;
        }
        if let Some(email) = changes.email {
            record.email = email;
        }
        if let Some(password_hash) = changes.password_hash {
            record.password_hash = password_hash;
        }
        record.updated_at = OffsetDateTime::now_utc();
        Ok(record.clone())
    }

    async fn delete_user(&self, id: i64) -> Result<(), RepoError> {
        self.users
            .write()
            .await
            .rows
            .remove(&id)
            .map(|_| ())
            .ok_or(RepoError::NotFound)
    }
}

#[async_trait]
impl ServicesRepo for InMemoryRepositories {
    async fn list_services(&self, filter: ServiceFilter) -> Result<Vec<ServiceRecord>, RepoError> {
        let table = self.services.read().await;
        let mut services: Vec<ServiceRecord> = table
            .rows
            .values()
            .filter(|service| filter.matches(service))
            .cloned()
            .collect();
        services.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(services)
    }

    async fn find_service(&self, id: i64) -> Result<Option<ServiceRecord>, RepoError> {
        Ok(self.services.read().await.rows.get(&id).cloned())
    }

    async fn create_service(&self, service: NewService) -> Result<ServiceRecord, RepoError> {
        let mut table = self.services.write().await;
        let now = OffsetDateTime::now_utc();
        let record = ServiceRecord {
            id: table.allocate(),
            name: service.name,
            description: service.description,
            category: service.category,
            status: service.status,
            owner: service.owner,
            created_at: now,
            updated_at: now,
        };
        table.rows.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_service(
        &self,
        id: i64,
        changes: ServiceChanges,
    ) -> Result<ServiceRecord, RepoError> {
        let mut table = self.services.write().await;
        let record = table.rows.get_mut(&id).ok_or(RepoError::NotFound)?;
        if let Some(name) = changes.name {
            record.name = name;
        }
        if let Some(description) = changes.description {
            record.description = Some(description);
        }
        if let Some(category) = changes.category {
            record.category = category;
        }
        if let Some(status) = changes.status {
            record.status = status;
        }
        if let Some(owner) = changes.owner {
            record.owner = owner;
        }
        record.updated_at = OffsetDateTime::now_utc();
        Ok(record.clone())
    }

    async fn delete_service(&self, id: i64) -> Result<(), RepoError> {
        self.services
            .write()
            .await
            .rows
            .remove(&id)
            .map(|_| ())
            .ok_or(RepoError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use itsm_api_types::{ServiceCategory, ServiceStatus};

    use super::*;

    fn new_service(name: &str, category: ServiceCategory) -> NewService {
        NewService {
            name: name.to_string(),
            description: None,
            category,
            status: ServiceStatus::Active,
            owner: "ops".to_string(),
        }
    }

    #[tokio::test]
    async fn duplicate_emails_are_rejected() {
        let repo = InMemoryRepositories::new();
        let user = NewUser {
            name: "Ana".to_string(),
            email: "ana@example.com".to_string(),
            password_hash: "hash".to_string(),
        };
        repo.create_user(user.clone()).await.expect("first");
        assert!(matches!(
            repo.create_user(user).await,
            Err(RepoError::Duplicate { .. })
        ));
    }

    #[tokio::test]
    async fn services_list_newest_first_with_filters() {
        let repo = InMemoryRepositories::new();
        repo.create_service(new_service("VPN", ServiceCategory::Infrastructure))
            .await
            .expect("vpn");
        repo.create_service(new_service("Email", ServiceCategory::Software))
            .await
            .expect("email");
        repo.create_service(new_service("Backup", ServiceCategory::Infrastructure))
            .await
            .expect("backup");

        let all = repo
            .list_services(ServiceFilter::default())
            .await
            .expect("list");
        let names: Vec<&str> = all.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Backup", "Email", "VPN"]);

        let infra = repo
            .list_services(ServiceFilter {
                category: Some(ServiceCategory::Infrastructure),
                status: None,
            })
            .await
            .expect("filtered");
        assert_eq!(infra.len(), 2);
    }

    #[tokio::test]
    async fn each_table_numbers_rows_from_one() {
        let repo = InMemoryRepositories::new();
        let first = repo
            .create_service(new_service("VPN", ServiceCategory::Infrastructure))
            .await
            .expect("vpn");
        let second = repo
            .create_service(new_service("Email", ServiceCategory::Software))
            .await
            .expect("email");
        let user = repo
            .create_user(NewUser {
                name: "Ana".to_string(),
                email: "ana@example.com".to_string(),
                password_hash: "hash".to_string(),
            })
            .await
            .expect("user");

        assert_eq!((first.id, second.id), (1, 2));
        assert_eq!(user.id, 1);
    }

    #[tokio::test]
    async fn missing_rows_report_not_found() {
        let repo = InMemoryRepositories::new();
        assert!(matches!(repo.delete_service(1).await, Err(RepoError::NotFound)));
        assert!(matches!(
            repo.update_user(1, UserChanges::default()).await,
            Err(RepoError::NotFound)
        ));
    }
}
