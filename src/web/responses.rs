//! HTTP response types
//!
//! Error envelopes with the stable code taxonomy, and validator-header
//! serving for image bodies (strong ETag over the payload, 304 on a
//! matching `If-None-Match`).

use axum::{
    body::Body,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, error};

use crate::errors::AppError;

/// JSON error envelope: `{code, message, status}`
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub code: &'static str,
    pub message: String,
    pub status: u16,
}

/// Builds the envelope response for an error reference.
///
/// Coalesced producers hand out `Arc<AppError>`, so the conversion cannot
/// consume the error.
pub fn error_response(error: &AppError) -> Response {
    let status =
        StatusCode::from_u16(error.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    if status.is_server_error() {
        error!("{}: {error}", error.code());
    } else {
        debug!("{}: {error}", error.code());
    }

    (
        status,
        Json(ApiError {
            code: error.code(),
            message: error.to_string(),
            status: error.status(),
        }),
    )
        .into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error_response(&self)
    }
}

/// Serves image bytes with validator headers.
///
/// Sets `Content-Type`, `Cache-Control` and a strong `ETag`; replies
/// `304 Not Modified` without a body when the request's `If-None-Match`
/// already carries the computed tag.
pub fn serve_with_etag(request_headers: &HeaderMap, data: Bytes, mime: &'static str) -> Response {
    let etag = format!("{:x}", Sha256::digest(&data));

    let matches = request_headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(|candidate| candidate.contains(&etag))
        .unwrap_or(false);

    let builder = Response::builder()
        .header(header::CONTENT_TYPE, mime)
        .header(header::CACHE_CONTROL, "public, max-age=86400")
        .header(header::ETAG, format!("\"{etag}\""));

    let result = if matches {
        builder.status(StatusCode::NOT_MODIFIED).body(Body::empty())
    } else {
        builder
            .header(header::CONTENT_LENGTH, data.len())
            .status(StatusCode::OK)
            .body(Body::from(data))
    };

    result.unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
