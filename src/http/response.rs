//! Plain-text response helpers shared by the mux, dispatcher and auth layer.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

/// `status` with a `text/plain` body.
pub fn text(status: StatusCode, body: impl Into<String>) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body.into(),
    )
        .into_response()
}

pub fn not_found() -> Response {
    text(StatusCode::NOT_FOUND, "Not found")
}

pub fn unauthorized() -> Response {
    text(StatusCode::UNAUTHORIZED, "Unauthorized")
}
