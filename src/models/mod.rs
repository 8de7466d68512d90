//! Domain models and API DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Asset record without the binary payload.
#[derive(Debug, Clone)]
pub struct AssetMeta {
    pub id: String,
    pub width: i64,
    pub height: i64,
    pub format: String,
    pub size: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Whether an upload created a new asset or replaced an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertAction {
    Created,
    Updated,
}

impl UpsertAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
        }
    }
}

/// Outcome of a transactional upload upsert.
#[derive(Debug, Clone)]
pub struct UpsertResult {
    pub asset_id: String,
    pub action: UpsertAction,
    pub assigned_keys: Vec<String>,
    /// Size of the replaced payload; zero for newly created assets
    pub old_size: i64,
}

/// Lightweight asset representation for the console.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetSummary {
    pub id: String,
    /// Comma-joined alias keys, e.g. "avatar-1, user-x"
    pub keys: String,
    pub size: i64,
    pub width: i64,
    pub height: i64,
    pub created_at: String,
    pub updated_at: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total_count: i64,
    pub total_size: i64,
    pub uptime: String,
    pub uptime_seconds: i64,
    pub recent_uploads: Vec<AssetSummary>,
    pub max_upload_size: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedAssets {
    pub items: Vec<AssetSummary>,
    pub total_items: i64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub status: String,
    pub action: String,
    pub avatar_id: String,
    pub keys: Vec<String>,
    pub url: String,
    pub size_kb: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub status: String,
    pub action: String,
    pub target: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateKeysRequest {
    /// Comma-separated replacement keys, e.g. "new-key-1, new-key-2"
    pub keys: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    pub status: String,
    pub action: String,
    pub message: String,
}
