//! Service-layer components shared across handlers

pub mod github;
pub mod stats;

pub use github::GithubClient;
pub use stats::ServiceStats;
