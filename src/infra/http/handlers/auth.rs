use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::IntoResponse;
use itsm_api_types::{SignInRequest, SignInResponse};

use super::json_body;
use crate::infra::http::HttpState;
use crate::infra::http::error::ApiError;

pub async fn sign_in(
    State(state): State<HttpState>,
    payload: Result<Json<SignInRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request = json_body(payload)?;
    let email = request.email.unwrap_or_default();
    let password = request.password.unwrap_or_default();
    if email.trim().is_empty() || password.is_empty() {
        return Err(ApiError::bad_request("Email and password are required."));
    }

    let token = state
        .auth
        .sign_in(email.trim(), &password)
        .await
        .map_err(ApiError::auth)?;

    Ok(Json(SignInResponse {
        message: "Signed in successfully.".to_string(),
        token,
    }))
}
