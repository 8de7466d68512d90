//! Error types for the octa service
//!
//! A single application-level error enum carries the stable error code
//! taxonomy exposed over HTTP. The web layer turns these into JSON
//! envelopes; everything below the handlers just propagates with `?`.

pub mod types;

pub use types::AppError;

pub type AppResult<T> = Result<T, AppError>;
