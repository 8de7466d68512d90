//! Request handlers, organized by surface

pub mod avatar;
pub mod console;
pub mod health;
pub mod upload;

use axum::http::HeaderMap;

use crate::config::Config;
use crate::errors::{AppError, AppResult};
use crate::utils::security::constant_time_eq;

/// Verifies the `X-Secret-Key` header against the configured secret in
/// constant time. Runs before any store access.
pub(crate) fn verify_secret(headers: &HeaderMap, config: &Config) -> AppResult<()> {
    let provided = headers
        .get("x-secret-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if constant_time_eq(provided, &config.security.upload_secret) {
        Ok(())
    } else {
        Err(AppError::InvalidCredentials)
    }
}
