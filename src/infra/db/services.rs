use async_trait::async_trait;
use itsm_api_types::{ServiceCategory, ServiceStatus};
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::{
    application::repos::{
        NewService, RepoError, ServiceChanges, ServiceFilter, ServicesRepo,
    },
    domain::entities::ServiceRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

const SERVICE_COLUMNS: &str =
    "id, name, description, category, status, owner, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ServiceRow {
    id: i64,
    name: String,
    description: Option<String>,
    category: String,
    status: String,
    owner: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<ServiceRow> for ServiceRecord {
    type Error = RepoError;

    fn try_from(row: ServiceRow) -> Result<Self, Self::Error> {
        let category: ServiceCategory = row.category.parse().map_err(|err| RepoError::Integrity {
            message: format!("service {}: {err}", row.id),
        })?;
        let status: ServiceStatus = row.status.parse().map_err(|err| RepoError::Integrity {
            message: format!("service {}: {err}", row.id),
        })?;
        Ok(Self {
            id: row.id,
            name: row.name,
            description: row.description,
            category,
            status,
            owner: row.owner,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_records(rows: Vec<ServiceRow>) -> Result<Vec<ServiceRecord>, RepoError> {
    rows.into_iter().map(ServiceRecord::try_from).collect()
}

#[async_trait]
impl ServicesRepo for PostgresRepositories {
    async fn list_services(&self, filter: ServiceFilter) -> Result<Vec<ServiceRecord>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT ");
        qb.push(SERVICE_COLUMNS).push(" FROM services WHERE TRUE");
        if let Some(category) = filter.category {
            qb.push(" AND category = ").push_bind(category.as_str());
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        qb.push(" ORDER BY created_at DESC, id DESC");

        let rows = qb
            .build_query_as::<ServiceRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        into_records(rows)
    }

    async fn find_service(&self, id: i64) -> Result<Option<ServiceRecord>, RepoError> {
        let row = sqlx::query_as::<_, ServiceRow>(&format!(
            "SELECT {SERVICE_COLUMNS} FROM services WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(ServiceRecord::try_from).transpose()
    }

    async fn create_service(&self, service: NewService) -> Result<ServiceRecord, RepoError> {
        let row = sqlx::query_as::<_, ServiceRow>(&format!(
            "INSERT INTO services (name, description, category, status, owner) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {SERVICE_COLUMNS}"
        ))
        .bind(service.name)
        .bind(service.description)
        .bind(service.category.as_str())
        .bind(service.status.as_str())
        .bind(service.owner)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.try_into()
    }

    async fn update_service(
        &self,
        id: i64,
        changes: ServiceChanges,
    ) -> Result<ServiceRecord, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE services SET updated_at = now()");
        if let Some(name) = changes.name {
            qb.push(", name = ").push_bind(name);
        }
        if let Some(description) = changes.description {
            qb.push(", description = ").push_bind(description);
        }
        if let Some(category) = changes.category {
            qb.push(", category = ").push_bind(category.as_str());
        }
        if let Some(status) = changes.status {
            qb.push(", status = ").push_bind(status.as_str());
        }
        if let Some(owner) = changes.owner {
            qb.push(", owner = ").push_bind(owner);
        }
        qb.push(" WHERE id = ").push_bind(id);
        qb.push(" RETURNING ").push(SERVICE_COLUMNS);

        let row = qb
            .build_query_as::<ServiceRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.ok_or(RepoError::NotFound)?.try_into()
    }

    async fn delete_service(&self, id: i64) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM services WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
