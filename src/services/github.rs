//! Remote-proxy avatar source
//!
//! Fetches GitHub profile pictures, shrinks them to the configured default
//! size, and re-encodes to JPEG. One attempt with a short transport
//! timeout, no retry: a slow or missing upstream degrades into the
//! deterministic generator instead of blocking the read path.

use std::time::Duration;

use bytes::Bytes;
use serde::Deserialize;
use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::utils::image_ops::{self, ProcessMode, ProcessOptions};

const API_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
pub struct GithubUser {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Result of resolving a username against the remote source.
pub enum RemoteAvatar {
    /// Downloaded and normalized image bytes (JPEG)
    Image(Bytes),
    /// Upstream unavailable; render this display name locally instead
    Fallback(String),
}

#[derive(Clone)]
pub struct GithubClient {
    http: reqwest::Client,
}

impl GithubClient {
    pub fn new(user_agent: &str) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(API_TIMEOUT)
            .user_agent(user_agent.to_string())
            .build()?;
        Ok(Self { http })
    }

    /// Resolves a username to a normalized avatar.
    ///
    /// Metadata or download failures yield `Fallback` with the best known
    /// display name. A payload that downloads but cannot be decoded or
    /// re-encoded is a hard upstream error.
    pub async fn resolve(&self, username: &str, size: u32, quality: u8) -> AppResult<RemoteAvatar> {
        let user = match self.fetch_user(username).await {
            Ok(user) => user,
            Err(e) => {
                debug!("github metadata fetch failed for '{username}': {e}");
                return Ok(RemoteAvatar::Fallback(username.to_string()));
            }
        };

        let display_name = user
            .name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| username.to_string());

        let Some(avatar_url) = user.avatar_url.filter(|u| !u.is_empty()) else {
            return Ok(RemoteAvatar::Fallback(display_name));
        };

        let raw = match self.download(&avatar_url).await {
            Ok(raw) => raw,
            Err(e) => {
                debug!("github avatar download failed for '{username}': {e}");
                return Ok(RemoteAvatar::Fallback(display_name));
            }
        };

        let img = image::load_from_memory(&raw)
            .map_err(|e| AppError::upstream(format!("undecodable avatar payload: {e}")))?;

        let opts = ProcessOptions {
            mode: ProcessMode::Fit,
            size,
            scale: 100,
            quality,
        };
        let (encoded, _, _) = image_ops::process_image(&img, &opts)
            .map_err(|e| AppError::upstream(e.to_string()))?;

        Ok(RemoteAvatar::Image(Bytes::from(encoded)))
    }

    async fn fetch_user(&self, username: &str) -> AppResult<GithubUser> {
        let url = format!("https://api.github.com/users/{username}");
        let response = self.http.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(AppError::upstream(format!(
                "github api status {}",
                response.status()
            )));
        }

        Ok(response.json().await?)
    }

    async fn download(&self, url: &str) -> AppResult<Vec<u8>> {
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(AppError::upstream(format!(
                "avatar download status {}",
                response.status()
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }
}
