use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, Request, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::application::auth::Claims;

use super::HttpState;
use super::error::ApiError;

/// Rejects requests without a valid token and attaches the decoded [`Claims`].
pub async fn require_auth(
    State(state): State<HttpState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = extract_token(request.headers().get(header::AUTHORIZATION)) else {
        return ApiError::unauthorized("Token not provided.").into_response();
    };

    let claims = match state.auth.verify(&token) {
        Ok(claims) => claims,
        Err(err) => return ApiError::auth(err).into_response(),
    };

    request.extensions_mut().insert(claims.clone());
    let mut response = next.run(request).await;
    response.extensions_mut().insert(claims);
    response
}

/// Accepts the raw token or one prefixed with the `Bearer` scheme (any case).
fn extract_token(header: Option<&HeaderValue>) -> Option<String> {
    let raw = header?.to_str().ok()?.trim();
    let token = match raw.get(..BEARER.len()) {
        Some(scheme) if scheme.eq_ignore_ascii_case(BEARER) => {
            let rest = &raw[BEARER.len()..];
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                rest.trim()
            } else {
                raw
            }
        }
        _ => raw,
    };
    (!token.is_empty()).then(|| token.to_string())
}

const BEARER: &str = "Bearer";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_may_be_raw_or_bearer() {
        let raw = HeaderValue::from_static("abc.def.ghi");
        let bearer = HeaderValue::from_static("Bearer abc.def.ghi");
        assert_eq!(extract_token(Some(&raw)).as_deref(), Some("abc.def.ghi"));
        assert_eq!(extract_token(Some(&bearer)).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn empty_header_counts_as_missing() {
        let empty = HeaderValue::from_static("Bearer ");
        assert_eq!(extract_token(Some(&empty)), None);
        assert_eq!(extract_token(None), None);
        let bare = HeaderValue::from_static("Bearer");
        assert_eq!(extract_token(Some(&bare)), None);
    }

    #[test]
    fn scheme_is_case_insensitive() {
        let lower = HeaderValue::from_static("bearer  abc.def.ghi");
        assert_eq!(extract_token(Some(&lower)).as_deref(), Some("abc.def.ghi"));
        let glued = HeaderValue::from_static("Bearerabc");
        assert_eq!(extract_token(Some(&glued)).as_deref(), Some("Bearerabc"));
    }
}
