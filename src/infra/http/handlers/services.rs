use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use itsm_api_types::{
    CreateServiceRequest, MessageResponse, ServiceEnvelope, ServiceListQuery,
    ServiceView, UpdateServiceRequest,
};

use super::{json_body, path_id};
use crate::application::auth::Claims;
use crate::infra::http::HttpState;
use crate::infra::http::error::ApiError;

pub async fn list_services(
    State(state): State<HttpState>,
    Query(query): Query<ServiceListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let services = state
        .catalog
        .list(query)
        .await
        .map_err(|err| ApiError::catalog(err, "Failed to list services."))?;
    let views: Vec<ServiceView> = services.iter().map(|service| service.view()).collect();
    Ok(Json(views))
}

pub async fn get_service(
    State(state): State<HttpState>,
    id: Result<Path<String>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = path_id(id)?;
    let service = state
        .catalog
        .get(id)
        .await
        .map_err(|err| ApiError::catalog(err, "Failed to fetch service."))?;
    Ok(Json(service.view()))
}

pub async fn create_service(
    State(state): State<HttpState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<CreateServiceRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request = json_body(payload)?;
    let service = state
        .catalog
        .create(request, &claims.email)
        .await
        .map_err(|err| ApiError::catalog(err, "Failed to create service."))?;

    Ok((
        StatusCode::CREATED,
        Json(ServiceEnvelope {
            message: "Service created successfully.".to_string(),
            service: service.view(),
        }),
    ))
}

pub async fn update_service(
    State(state): State<HttpState>,
    id: Result<Path<String>, PathRejection>,
    payload: Result<Json<UpdateServiceRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = path_id(id)?;
    let request = json_body(payload)?;
    let service = state
        .catalog
        .update(id, request)
        .await
        .map_err(|err| ApiError::catalog(err, "Failed to update service."))?;

    Ok(Json(ServiceEnvelope {
        message: "Service updated successfully.".to_string(),
        service: service.view(),
    }))
}

pub async fn delete_service(
    State(state): State<HttpState>,
    id: Result<Path<String>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = path_id(id)?;
    state
        .catalog
        .delete(id)
        .await
        .map_err(|err| ApiError::catalog(err, "Failed to delete service."))?;

    Ok(Json(MessageResponse {
        message: "Service deleted successfully.".to_string(),
    }))
}
