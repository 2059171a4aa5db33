//! Service catalogue use-cases.

use std::sync::Arc;

use itsm_api_types::{CreateServiceRequest, ServiceListQuery, UpdateServiceRequest};
use thiserror::Error;
use tracing::{info, instrument};

use crate::application::events::EventPublisher;
use crate::application::repos::{
    NewService, RepoError, ServiceChanges, ServiceFilter, ServicesRepo,
};
use crate::cache::{CacheHelper, CachedResource};
use crate::domain::entities::ServiceRecord;
use crate::domain::error::DomainError;
use crate::domain::validation::{
    Violations, check_owner, check_service_name, parse_category, parse_status,
};
use crate::messaging::RelayError;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Relay(#[from] RelayError),
}

#[derive(Clone)]
pub struct CatalogService {
    repo: Arc<dyn ServicesRepo>,
    cache: CacheHelper,
    events: EventPublisher,
}

impl CatalogService {
    pub fn new(repo: Arc<dyn ServicesRepo>, cache: CacheHelper, events: EventPublisher) -> Self {
        Self {
            repo,
            cache,
            events,
        }
    }

    pub async fn list(&self, query: ServiceListQuery) -> Result<Vec<ServiceRecord>, CatalogError> {
        let mut violations = Violations::new();
        let filter = ServiceFilter {
            category: non_empty(query.category)
                .and_then(|value| parse_category(&value, &mut violations)),
            status: non_empty(query.status).and_then(|value| parse_status(&value, &mut violations)),
        };
        violations.into_result()?;
        Ok(self.repo.list_services(filter).await?)
    }

    pub async fn get(&self, id: i64) -> Result<ServiceRecord, CatalogError> {
        self.repo
            .find_service(id)
            .await?
            .ok_or_else(|| DomainError::not_found("service").into())
    }

    /// Validates and stores a new entry, then publishes `service.created`.
    #[instrument(skip(self, request))]
    pub async fn create(
        &self,
        request: CreateServiceRequest,
        created_by: &str,
    ) -> Result<ServiceRecord, CatalogError> {
        let name = request.name.unwrap_or_default();
        let owner = request.owner.unwrap_or_default();

        let mut violations = Violations::new();
        check_service_name(&name, &mut violations);
        check_owner(&owner, &mut violations);
        let category = match non_empty(request.category) {
            Some(value) => parse_category(&value, &mut violations),
            None => Some(Default::default()),
        };
        let status = match non_empty(request.status) {
            Some(value) => parse_status(&value, &mut violations),
            None => Some(Default::default()),
        };
        violations.into_result()?;

        let service = self
            .repo
            .create_service(NewService {
                name: name.trim().to_string(),
                description: request.description,
                category: category.unwrap_or_default(),
                status: status.unwrap_or_default(),
                owner: owner.trim().to_string(),
            })
            .await?;

        self.cache
            .invalidate_resource(CachedResource::Services, None)
            .await;
        self.events
            .publish_service_created(&service, created_by)
            .await?;

        info!(target = "itsm::application::catalog", service_id = service.id, name = %service.name, "service created");
        Ok(service)
    }

    /// Applies every provided field; provided fields are validated like on create.
    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        id: i64,
        request: UpdateServiceRequest,
    ) -> Result<ServiceRecord, CatalogError> {
        let mut violations = Violations::new();
        if let Some(name) = &request.name {
            check_service_name(name, &mut violations);
        }
        if let Some(owner) = &request.owner {
            check_owner(owner, &mut violations);
        }
        let changes = ServiceChanges {
            category: request
                .category
                .as_deref()
                .and_then(|value| parse_category(value, &mut violations)),
            status: request
                .status
                .as_deref()
                .and_then(|value| parse_status(value, &mut violations)),
            name: request.name.map(|v| v.trim().to_string()),
            owner: request.owner.map(|v| v.trim().to_string()),
            description: request.description,
        };
        violations.into_result()?;

        let service = self
            .repo
            .update_service(id, changes)
            .await
            .map_err(not_found_as_domain)?;

        self.cache
            .invalidate_resource(CachedResource::Services, Some(id))
            .await;
        info!(target = "itsm::application::catalog", service_id = id, "service updated");
        Ok(service)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<(), CatalogError> {
        self.repo
            .delete_service(id)
            .await
            .map_err(not_found_as_domain)?;
        self.cache
            .invalidate_resource(CachedResource::Services, Some(id))
            .await;
        info!(target = "itsm::application::catalog", service_id = id, "service deleted");
        Ok(())
    }
}

fn not_found_as_domain(err: RepoError) -> CatalogError {
    match err {
        RepoError::NotFound => DomainError::not_found("service").into(),
        other => other.into(),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
