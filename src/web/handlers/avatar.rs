//! Read pipeline: generated, stored, and remote-proxied avatars
//!
//! All three routes funnel through the coalescer so concurrent identical
//! requests share one render, one store fetch, or one upstream download.
//! A store miss (or store error) on `/u/{key}` is never a client error:
//! the request falls through to the deterministic generator with the key
//! as seed.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Response,
};
use bytes::Bytes;
use tracing::warn;

use crate::avatar::{self, RenderOptions};
use crate::errors::AppError;
use crate::services::github::RemoteAvatar;
use crate::utils::image_ops::mime_for_bytes;
use crate::web::responses::{error_response, serve_with_etag};
use crate::web::AppState;

/// Builds the cache/coalescing fingerprint for a generator request.
///
/// Query parameters are sorted so equivalent requests share one entry.
/// Requests overriding `bg` or `color` are marked non-cacheable: unbounded
/// user-chosen colors would otherwise let one client fill the cache.
fn fingerprint(prefix: &str, key: &str, query: &HashMap<String, String>) -> (String, bool) {
    let has_override = ["bg", "color"]
        .iter()
        .any(|name| query.get(*name).map(|v| !v.is_empty()).unwrap_or(false));

    let mut names: Vec<&String> = query.keys().collect();
    names.sort();

    let mut out = format!("{prefix}:{key}?");
    for name in names {
        out.push_str(name);
        out.push('=');
        out.push_str(&query[name]);
        out.push('&');
    }

    (out, !has_override)
}

/// Coalesced cache-or-render for the deterministic generator.
async fn generator_response(
    state: &AppState,
    seed: String,
    query: &HashMap<String, String>,
    headers: &HeaderMap,
) -> Response {
    let (key, cacheable) = fingerprint("gen", &seed, query);
    let opts = RenderOptions::from_query(query, state.config.image.default_size);
    let mime = opts.format.mime();

    let cache = Arc::clone(&state.cache);
    let fonts = Arc::clone(&state.fonts);
    let cache_key = key.clone();

    let outcome = state
        .coalescer
        .run(&key, async move {
            if cacheable {
                if let Some(hit) = cache.get(&cache_key) {
                    return Ok(hit);
                }
            }

            let (bytes, _) = avatar::render(&seed, &opts, &fonts)?;
            if cacheable {
                cache.set(&cache_key, bytes.clone());
            }
            Ok(bytes)
        })
        .await;

    match outcome {
        Ok(bytes) => serve_with_etag(headers, bytes, mime),
        Err(err) => error_response(err.as_ref()),
    }
}

/// GET /avatar/{seed}
pub async fn serve_direct_avatar(
    State(state): State<AppState>,
    Path(seed): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if seed.is_empty() {
        return error_response(&AppError::missing_key("avatar seed key is missing"));
    }

    generator_response(&state, seed, &query, &headers).await
}

/// GET /u/{key}
///
/// Two-tier lookup: alias to asset id (`map:` cache entries), then asset
/// bytes (`img:` cache entries) behind the coalescer. Unknown keys serve
/// a generated avatar instead of a 404.
pub async fn serve_user_avatar(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if key.is_empty() {
        return error_response(&AppError::missing_key("user identifier is missing"));
    }

    let map_key = format!("map:{key}");
    let asset_id = match state.cache.get(&map_key) {
        Some(cached) => Some(String::from_utf8_lossy(&cached).into_owned()),
        None => match state.database.alias_to_asset_id(&key).await {
            Ok(Some(id)) => {
                state.cache.set(&map_key, Bytes::from(id.clone().into_bytes()));
                Some(id)
            }
            Ok(None) => None,
            Err(e) => {
                // A store error is equivalent to a miss on the read path
                warn!("alias lookup failed for '{key}': {e}");
                None
            }
        },
    };

    let Some(asset_id) = asset_id else {
        return generator_response(&state, key, &query, &headers).await;
    };

    let img_key = format!("img:{asset_id}");
    let cache = Arc::clone(&state.cache);
    let database = state.database.clone();
    let cache_key = img_key.clone();
    let wanted_id = asset_id.clone();

    let outcome = state
        .coalescer
        .run(&format!("fetch_img:{asset_id}"), async move {
            if let Some(hit) = cache.get(&cache_key) {
                return Ok(hit);
            }

            match database.read_asset_bytes(&wanted_id).await? {
                Some(data) => {
                    let bytes = Bytes::from(data);
                    cache.set(&cache_key, bytes.clone());
                    Ok(bytes)
                }
                None => Err(AppError::not_found("asset", wanted_id)),
            }
        })
        .await;

    match outcome {
        Ok(bytes) => {
            let mime = mime_for_bytes(&bytes);
            serve_with_etag(&headers, bytes, mime)
        }
        Err(_) => generator_response(&state, key, &query, &headers).await,
    }
}

/// GET /avatar/github/{user}
///
/// One coalesced flight per username. Any upstream failure degrades into
/// a locally generated avatar for the user's display name; only a payload
/// that downloads but will not decode surfaces as a 502.
pub async fn serve_github_avatar(
    State(state): State<AppState>,
    Path(user): Path<String>,
    headers: HeaderMap,
) -> Response {
    if user.is_empty() {
        return error_response(&AppError::invalid_parameters("username is required"));
    }

    let flight_key = format!("gh:{user}");
    let cache = Arc::clone(&state.cache);
    let fonts = Arc::clone(&state.fonts);
    let github = state.github.clone();
    let cache_key = flight_key.clone();
    let default_size = state.config.image.default_size;
    let quality = state.config.image.quality;

    let outcome = state
        .coalescer
        .run(&flight_key, async move {
            if let Some(hit) = cache.get(&cache_key) {
                return Ok(hit);
            }

            let bytes = match github.resolve(&user, default_size, quality).await? {
                RemoteAvatar::Image(bytes) => bytes,
                RemoteAvatar::Fallback(display_name) => {
                    let opts = RenderOptions::defaults(default_size);
                    avatar::render(&display_name, &opts, &fonts)?.0
                }
            };

            cache.set(&cache_key, bytes.clone());
            Ok(bytes)
        })
        .await;

    match outcome {
        Ok(bytes) => {
            let mime = mime_for_bytes(&bytes);
            serve_with_etag(&headers, bytes, mime)
        }
        Err(err) => error_response(err.as_ref()),
    }
}
