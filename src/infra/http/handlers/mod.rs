//! Route handlers. Each returns `Result<impl IntoResponse, ApiError>`.

pub mod auth;
pub mod services;
pub mod system;
pub mod users;

use axum::Json;
use axum::extract::Path;
use axum::extract::rejection::{JsonRejection, PathRejection};

use super::error::ApiError;

/// Unwraps a JSON body, turning extractor rejections into the JSON error shape.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(ApiError::invalid_json)
}

/// Parses an `{id}` segment. Only the canonical decimal form is accepted so that each
/// entity has exactly one cache key; `01` or `+1` are rejected.
pub(crate) fn path_id(path: Result<Path<String>, PathRejection>) -> Result<i64, ApiError> {
    let Path(raw) = path.map_err(|_| ApiError::bad_request("Invalid id."))?;
    parse_id(&raw).ok_or_else(|| ApiError::bad_request("Invalid id."))
}

fn parse_id(raw: &str) -> Option<i64> {
    raw.parse::<i64>()
        .ok()
        .filter(|id| id.to_string() == raw)
}

#[cfg(test)]
mod tests {
    use super::parse_id;

    #[test]
    fn ids_must_be_canonical() {
        assert_eq!(parse_id("42"), Some(42));
        assert_eq!(parse_id("-3"), Some(-3));
        assert_eq!(parse_id("042"), None);
        assert_eq!(parse_id("+42"), None);
        assert_eq!(parse_id("0"), Some(0));
        assert_eq!(parse_id("abc"), None);
    }
}
