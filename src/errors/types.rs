use thiserror::Error;

/// Top-level application error type
///
/// Every variant maps to a stable machine-readable code and an HTTP status,
/// so clients can rely on the `{code, message, status}` envelope staying
/// constant across releases.
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing or malformed query/form fields
    #[error("{message}")]
    InvalidParameters { message: String },

    /// Path is missing a required identifier
    #[error("{message}")]
    MissingKey { message: String },

    /// Request body exceeds the configured upload cap
    #[error("body exceeds the {limit} byte upload limit")]
    BodyTooLarge { limit: u64 },

    /// Sniffed content type is not an allowed image format
    #[error("{message}")]
    UnsupportedMedia { message: String },

    /// Per-IP token bucket is empty
    #[error("too many requests, please wait a moment")]
    RateLimitExceeded,

    /// Upload secret mismatch
    #[error("invalid secret key")]
    InvalidCredentials,

    /// Login/auth bucket is empty
    #[error("too many authentication attempts")]
    AuthRateLimitExceeded,

    /// Asset or alias lookup miss
    #[error("{resource} '{id}' not found")]
    NotFound { resource: &'static str, id: String },

    /// Alias already bound to a different asset
    #[error("{message}")]
    Conflict { message: String },

    /// Avatar renderer failure
    #[error("image generation failed: {message}")]
    GenerationFailed { message: String },

    /// Decode/encode failure on an uploaded image
    #[error("image processing failed: {message}")]
    ProcessingFailed { message: String },

    /// Remote avatar source failed after fallback
    #[error("upstream service failed: {message}")]
    Upstream { message: String },

    /// Another backup snapshot is already running
    #[error("another backup is currently in progress")]
    BackupInProgress,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    /// Stable machine-readable code for the JSON error envelope
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidParameters { .. } => "request/invalid_parameters",
            Self::MissingKey { .. } => "request/missing_key",
            Self::BodyTooLarge { .. } => "request/body_too_large",
            Self::UnsupportedMedia { .. } => "request/invalid_media",
            Self::RateLimitExceeded => "request/rate_limit_exceeded",
            Self::InvalidCredentials => "auth/invalid_credentials",
            Self::AuthRateLimitExceeded => "auth/rate_limit_exceeded",
            Self::NotFound { .. } => "resource/not_found",
            Self::Conflict { .. } => "resource/conflict",
            Self::GenerationFailed { .. } => "image/generation_failed",
            Self::ProcessingFailed { .. } => "image/processing_failed",
            Self::Upstream { .. } | Self::Http(_) => "upstream/service_failed",
            Self::BackupInProgress => "backup/concurrency_limit",
            Self::Database(_) | Self::Io(_) | Self::Internal { .. } => "server/internal_error",
        }
    }

    /// HTTP status the envelope is served with
    pub fn status(&self) -> u16 {
        match self {
            Self::InvalidParameters { .. }
            | Self::MissingKey { .. }
            | Self::ProcessingFailed { .. } => 400,
            Self::InvalidCredentials => 403,
            Self::NotFound { .. } => 404,
            Self::Conflict { .. } => 409,
            Self::BodyTooLarge { .. } => 413,
            Self::UnsupportedMedia { .. } => 415,
            Self::RateLimitExceeded | Self::AuthRateLimitExceeded | Self::BackupInProgress => 429,
            Self::GenerationFailed { .. }
            | Self::Database(_)
            | Self::Io(_)
            | Self::Internal { .. } => 500,
            Self::Upstream { .. } | Self::Http(_) => 502,
        }
    }

    pub fn invalid_parameters<S: Into<String>>(message: S) -> Self {
        Self::InvalidParameters {
            message: message.into(),
        }
    }

    pub fn missing_key<S: Into<String>>(message: S) -> Self {
        Self::MissingKey {
            message: message.into(),
        }
    }

    pub fn unsupported_media<S: Into<String>>(message: S) -> Self {
        Self::UnsupportedMedia {
            message: message.into(),
        }
    }

    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource,
            id: id.into(),
        }
    }

    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn generation<S: Into<String>>(message: S) -> Self {
        Self::GenerationFailed {
            message: message.into(),
        }
    }

    pub fn processing<S: Into<String>>(message: S) -> Self {
        Self::ProcessingFailed {
            message: message.into(),
        }
    }

    pub fn upstream<S: Into<String>>(message: S) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}
