use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use itsm_api_types::{
    CreateUserRequest, MessageResponse, UpdateUserRequest, UserEnvelope, UserView,
};

use super::{json_body, path_id};
use crate::infra::http::HttpState;
use crate::infra::http::error::ApiError;

pub async fn list_users(State(state): State<HttpState>) -> Result<impl IntoResponse, ApiError> {
    let users = state
        .users
        .list()
        .await
        .map_err(|err| ApiError::users(err, "Failed to list users."))?;
    let views: Vec<UserView> = users.iter().map(|user| user.view()).collect();
    Ok(Json(views))
}

pub async fn get_user(
    State(state): State<HttpState>,
    id: Result<Path<String>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = path_id(id)?;
    let user = state
        .users
        .get(id)
        .await
        .map_err(|err| ApiError::users(err, "Failed to fetch user."))?;
    Ok(Json(user.view()))
}

pub async fn create_user(
    State(state): State<HttpState>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request = json_body(payload)?;
    let user = state
        .users
        .create(request)
        .await
        .map_err(|err| ApiError::users(err, "Failed to create user."))?;

    Ok((
        StatusCode::CREATED,
        Json(UserEnvelope {
            message: "User created successfully.".to_string(),
            user: user.view(),
        }),
    ))
}

pub async fn update_user(
    State(state): State<HttpState>,
    id: Result<Path<String>, PathRejection>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = path_id(id)?;
    let request = json_body(payload)?;
    let user = state
        .users
        .update(id, request)
        .await
        .map_err(|err| ApiError::users(err, "Failed to update user."))?;

    Ok(Json(UserEnvelope {
        message: "User updated successfully.".to_string(),
        user: user.summary(),
    }))
}

pub async fn delete_user(
    State(state): State<HttpState>,
    id: Result<Path<String>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = path_id(id)?;
    state
        .users
        .delete(id)
        .await
        .map_err(|err| ApiError::users(err, "Failed to delete user."))?;

    Ok(Json(MessageResponse {
        message: "User deleted successfully.".to_string(),
    }))
}
