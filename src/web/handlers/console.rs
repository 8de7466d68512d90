//! Console API: stats, asset administration, and backup
//!
//! Every route in this group sits behind the auth gate: the stricter
//! login rate bucket first, then the constant-time secret check.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, Path, Query, Request, State},
    http::header,
    middleware::Next,
    response::Response,
    Json,
};
use chrono::Utc;
use futures::StreamExt;
use tokio_util::io::ReaderStream;
use tracing::info;

use crate::errors::{AppError, AppResult};
use crate::models::{
    ActionResponse, AssetMeta, AssetSummary, DeleteResponse, PaginatedAssets, StatsResponse,
    UpdateKeysRequest,
};
use crate::utils::keys::{is_valid_key, normalize_key};
use crate::web::extractors::ListParams;
use crate::web::handlers::verify_secret;
use crate::web::middleware::client_ip;
use crate::web::responses::error_response;
use crate::web::AppState;

const BACKUP_DEADLINE: Duration = Duration::from_secs(60);
const MAX_KEYS_BODY: usize = 2048;

/// Auth gate applied to the whole console router.
pub async fn auth_gate(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let ip = client_ip(request.headers(), peer);

    if state.rate_limits.enabled() && !state.rate_limits.check_login(&ip) {
        return error_response(&AppError::AuthRateLimitExceeded);
    }

    if let Err(e) = verify_secret(request.headers(), &state.config) {
        return error_response(&e);
    }

    next.run(request).await
}

async fn summarize(state: &AppState, meta: AssetMeta) -> AppResult<AssetSummary> {
    let keys = state.database.keys_for_asset(&meta.id).await?;
    let url_key = keys.first().cloned().unwrap_or_else(|| meta.id.clone());

    Ok(AssetSummary {
        keys: keys.join(", "),
        size: meta.size,
        width: meta.width,
        height: meta.height,
        created_at: meta.created_at.format("%Y-%m-%d %H:%M").to_string(),
        updated_at: meta.updated_at.format("%Y-%m-%d %H:%M").to_string(),
        url: format!(
            "{}/u/{}",
            state.config.base_url.trim_end_matches('/'),
            url_key
        ),
        id: meta.id,
    })
}

/// GET /console/api/stats
pub async fn get_stats(State(state): State<AppState>) -> AppResult<Json<StatsResponse>> {
    let (total_count, total_size) = state.stats.totals();
    let uptime_seconds = state.stats.uptime_seconds();

    let mut recent_uploads = Vec::new();
    for meta in state.database.list_recent(5, 0).await? {
        recent_uploads.push(summarize(&state, meta).await?);
    }

    Ok(Json(StatsResponse {
        total_count,
        total_size,
        uptime: humantime::format_duration(Duration::from_secs(uptime_seconds.max(0) as u64))
            .to_string(),
        uptime_seconds,
        recent_uploads,
        max_upload_size: state.config.image.max_upload_size.clone(),
    }))
}

/// GET /console/api/assets?page&limit&q
pub async fn list_assets(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<PaginatedAssets>> {
    let page = params.page();
    let limit = params.limit();

    let (metas, total_items) = match params.query() {
        None => {
            let (count, _) = state.stats.totals();
            let metas = state.database.list_recent(limit, params.offset()).await?;
            (metas, count)
        }
        Some(prefix) => {
            state
                .database
                .search_by_key_prefix(prefix, limit, params.offset())
                .await?
        }
    };

    let mut items = Vec::with_capacity(metas.len());
    for meta in metas {
        items.push(summarize(&state, meta).await?);
    }

    let total_pages = ((total_items.max(0) as u64 + limit as u64 - 1) / limit as u64) as u32;

    Ok(Json(PaginatedAssets {
        items,
        total_items,
        page,
        limit,
        total_pages,
    }))
}

/// DELETE /console/api/assets/{id}
pub async fn delete_asset(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<DeleteResponse>> {
    if id.is_empty() {
        return Err(AppError::invalid_parameters("asset id is required"));
    }

    let _permit = state
        .write_gate
        .acquire()
        .await
        .map_err(|_| AppError::internal("write admission gate closed"))?;

    let (size, keys) = state
        .database
        .delete_asset(&id)
        .await?
        .ok_or_else(|| AppError::not_found("asset", id.clone()))?;

    state.stats.remove_asset(size);
    state.cache.delete(&format!("img:{id}"));
    for key in keys {
        state.cache.delete(&format!("map:{key}"));
    }

    Ok(Json(DeleteResponse {
        status: "success".to_string(),
        action: "deleted".to_string(),
        target: id,
    }))
}

/// PUT /console/api/assets/{id} — replaces the asset's alias set
pub async fn update_asset_keys(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateKeysRequest>,
) -> AppResult<Json<ActionResponse>> {
    if id.is_empty() {
        return Err(AppError::invalid_parameters("asset id is required"));
    }
    if request.keys.len() > MAX_KEYS_BODY {
        return Err(AppError::invalid_parameters("key list is too long"));
    }

    let mut keys = Vec::new();
    for part in request.keys.split(',') {
        let key = normalize_key(part);
        if key.is_empty() {
            continue;
        }
        if !is_valid_key(&key) {
            return Err(AppError::invalid_parameters(format!(
                "key '{key}' contains invalid characters, allowed: a-z, 0-9, -, _, /, @"
            )));
        }
        if !keys.contains(&key) {
            keys.push(key);
        }
    }

    let _permit = state
        .write_gate
        .acquire()
        .await
        .map_err(|_| AppError::internal("write admission gate closed"))?;

    let assigned = state.database.reassign_aliases(&id, &keys).await?;

    for key in &assigned {
        state.cache.delete(&format!("map:{key}"));
    }

    Ok(Json(ActionResponse {
        status: "success".to_string(),
        action: "updated".to_string(),
        message: "asset keys updated successfully".to_string(),
    }))
}

/// GET /console/api/backup — streams a consistent snapshot of the store
pub async fn backup(State(state): State<AppState>) -> AppResult<Response> {
    // One backup at a time; a second request gets an immediate 429
    let Ok(guard) = state.backup_lock.clone().try_lock_owned() else {
        return Err(AppError::BackupInProgress);
    };

    let filename = format!("octa_vault_{}.db", Utc::now().format("%Y-%m-%d_%H-%M-%S"));
    let temp_path = std::env::temp_dir().join(&filename);

    match tokio::time::timeout(BACKUP_DEADLINE, state.database.snapshot_into(&temp_path)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e);
        }
        Err(_) => {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(AppError::internal("backup snapshot timed out"));
        }
    }

    let file = tokio::fs::File::open(&temp_path).await?;
    let size = file.metadata().await?.len();

    // Unlink immediately; the open handle keeps the snapshot readable
    // until streaming finishes.
    let _ = tokio::fs::remove_file(&temp_path).await;

    info!("streaming backup snapshot '{filename}' ({size} bytes)");

    // The stream owns the backup guard so a second backup stays locked
    // out until this one finishes transmitting.
    let stream = ReaderStream::new(file).map(move |chunk| {
        let _hold = &guard;
        chunk
    });

    Response::builder()
        .header(header::CONTENT_TYPE, "application/x-sqlite3")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )
        .header(header::CONTENT_LENGTH, size)
        .header("X-Content-Type-Options", "nosniff")
        .header(
            header::CACHE_CONTROL,
            "no-store, no-cache, must-revalidate, private",
        )
        .body(Body::from_stream(stream))
        .map_err(|e| AppError::internal(e.to_string()))
}
