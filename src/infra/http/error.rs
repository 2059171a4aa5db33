use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use itsm_api_types::ErrorBody;

use crate::application::auth::AuthError;
use crate::application::catalog::CatalogError;
use crate::application::error::ErrorReport;
use crate::application::repos::RepoError;
use crate::application::users::UserServiceError;
use crate::domain::error::DomainError;

/// JSON error response: `{error, details?}` plus an [`ErrorReport`] for the response logger.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: String,
    details: Vec<String>,
    report: ErrorReport,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>, report: ErrorReport) -> Self {
        Self {
            status,
            error: error.into(),
            details: Vec::new(),
            report,
        }
    }

    fn message(source: &'static str, status: StatusCode, error: &str) -> Self {
        Self::new(status, error, ErrorReport::from_message(source, status, error))
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn bad_request(error: &str) -> Self {
        Self::message("infra::http::request", StatusCode::BAD_REQUEST, error)
    }

    pub fn unauthorized(error: &str) -> Self {
        Self::message("infra::http::auth", StatusCode::UNAUTHORIZED, error)
    }

    pub fn not_found(error: &str) -> Self {
        Self::message("infra::http::request", StatusCode::NOT_FOUND, error)
    }

    /// 500 with a public `error` and the full cause chain kept for the logs only.
    pub fn internal(source: &'static str, error: &str, cause: &dyn std::error::Error) -> Self {
        let status = StatusCode::INTERNAL_SERVER_ERROR;
        Self::new(status, error, ErrorReport::from_error(source, status, cause))
    }

    pub fn invalid_json(rejection: JsonRejection) -> Self {
        let status = StatusCode::BAD_REQUEST;
        Self::new(
            status,
            "Invalid JSON body.",
            ErrorReport::from_error("infra::http::request", status, &rejection),
        )
        .with_details(vec![rejection.body_text()])
    }

    fn domain(source: &'static str, err: DomainError, not_found: &str) -> Self {
        match err {
            DomainError::NotFound { .. } => Self::message(source, StatusCode::NOT_FOUND, not_found),
            DomainError::Validation { ref details } => {
                let status = StatusCode::BAD_REQUEST;
                let details = details.clone();
                Self::new(
                    status,
                    "Invalid data.",
                    ErrorReport::from_error(source, status, &err),
                )
                .with_details(details)
            }
        }
    }

    fn repo(source: &'static str, err: RepoError, failure: &str) -> Self {
        let status = match err {
            RepoError::Timeout => StatusCode::SERVICE_UNAVAILABLE,
            RepoError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, failure, ErrorReport::from_error(source, status, &err))
    }

    /// Maps a user service failure; `failure` is the public message for unexpected errors.
    pub fn users(err: UserServiceError, failure: &str) -> Self {
        const SOURCE: &str = "application::users";
        match err {
            UserServiceError::Domain(err) => Self::domain(SOURCE, err, "User not found."),
            UserServiceError::DuplicateEmail => Self::message(
                SOURCE,
                StatusCode::BAD_REQUEST,
                "Email is already in use by another user.",
            ),
            UserServiceError::Repo(err) => Self::repo(SOURCE, err, failure),
            other => Self::internal(SOURCE, failure, &other),
        }
    }

    pub fn catalog(err: CatalogError, failure: &str) -> Self {
        const SOURCE: &str = "application::catalog";
        match err {
            CatalogError::Domain(err) => Self::domain(SOURCE, err, "Service not found."),
            CatalogError::Repo(err) => Self::repo(SOURCE, err, failure),
            other => Self::internal(SOURCE, failure, &other),
        }
    }

    pub fn auth(err: AuthError) -> Self {
        const SOURCE: &str = "application::auth";
        match err {
            AuthError::UnknownUser => Self::message(SOURCE, StatusCode::NOT_FOUND, "User not found."),
            AuthError::InvalidPassword => {
                Self::message(SOURCE, StatusCode::UNAUTHORIZED, "Invalid password.")
            }
            AuthError::InvalidToken(ref cause) => {
                let status = StatusCode::UNAUTHORIZED;
                Self::new(status, "Invalid token.", ErrorReport::from_error(SOURCE, status, cause))
            }
            other => Self::internal(SOURCE, "Failed to sign in.", &other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.error,
            details: self.details,
        };
        let mut response = (self.status, Json(body)).into_response();
        self.report.attach(&mut response);
        response
    }
}
