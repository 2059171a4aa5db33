use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::infra::http::HttpState;

pub const BANNER: &str = "ITSM API is running.";

pub async fn root() -> &'static str {
    BANNER
}

/// Prometheus text exposition; 404 when no recorder was installed.
pub async fn metrics(State(state): State<HttpState>) -> Response {
    match state.metrics.as_ref() {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
