//! Write pipeline: uploads and deletions
//!
//! The CPU-heavy normalization (decode, resize, re-encode) runs before the
//! write admission gate so requests queue only at the single database
//! writer. Cache invalidation happens strictly after commit.

use axum::{
    extract::{Multipart, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use bytes::Bytes;
use image::ImageFormat;
use serde::Deserialize;

use crate::database::AssetPayload;
use crate::errors::{AppError, AppResult};
use crate::models::{DeleteResponse, UploadResponse, UpsertAction};
use crate::utils::image_ops::{
    decode_header, process_image, sniff_supported_format, ProcessMode, ProcessOptions,
};
use crate::utils::keys::parse_key_list;
use crate::web::handlers::verify_secret;
use crate::web::AppState;

/// JPEG quality for normalized uploads.
const UPLOAD_JPEG_QUALITY: u8 = 85;

/// Leading bytes inspected for content sniffing.
const SNIFF_WINDOW: usize = 512;

fn parse_clamped(value: &str, default: i64, min: i64, max: i64) -> i64 {
    match value.parse::<i64>() {
        Ok(v) => v.clamp(min, max),
        Err(_) => default,
    }
}

fn format_label(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpeg",
        ImageFormat::Png => "png",
        ImageFormat::Gif => "gif",
        _ => "original",
    }
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

fn multipart_error(limit: u64) -> impl Fn(axum::extract::multipart::MultipartError) -> AppError {
    move |e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::BodyTooLarge { limit }
        } else {
            AppError::invalid_parameters(format!("invalid multipart body: {e}"))
        }
    }
}

/// POST /upload
pub async fn upload_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> AppResult<Json<UploadResponse>> {
    verify_secret(&headers, &state.config)?;

    let max_upload = state.config.max_upload_bytes();
    if let Some(length) = content_length(&headers) {
        if length > max_upload {
            return Err(AppError::BodyTooLarge { limit: max_upload });
        }
    }

    let mut avatar_bytes: Option<Bytes> = None;
    let mut keys_raw = String::new();
    let mut mode_raw = String::new();
    let mut size_raw = String::new();
    let mut scale_raw = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(multipart_error(max_upload))?
    {
        match field.name() {
            Some("avatar") => {
                avatar_bytes = Some(field.bytes().await.map_err(multipart_error(max_upload))?)
            }
            Some("keys") => keys_raw = field.text().await.map_err(multipart_error(max_upload))?,
            Some("mode") => mode_raw = field.text().await.map_err(multipart_error(max_upload))?,
            Some("size") => size_raw = field.text().await.map_err(multipart_error(max_upload))?,
            Some("scale") => scale_raw = field.text().await.map_err(multipart_error(max_upload))?,
            _ => {}
        }
    }

    let keys = parse_key_list(&keys_raw);
    if keys.is_empty() {
        return Err(AppError::invalid_parameters(
            "at least one valid key is required",
        ));
    }
    if keys.len() > state.config.image.max_key_limit {
        return Err(AppError::invalid_parameters("too many keys provided"));
    }

    let data = avatar_bytes
        .ok_or_else(|| AppError::invalid_parameters("missing 'avatar' file field"))?;
    if data.len() as u64 > max_upload {
        return Err(AppError::BodyTooLarge { limit: max_upload });
    }

    let head = &data[..data.len().min(SNIFF_WINDOW)];
    sniff_supported_format(head)
        .ok_or_else(|| AppError::unsupported_media("unsupported file type"))?;

    // Normalization is pure CPU work, done before taking a writer slot
    let mode = ProcessMode::parse(&mode_raw);
    let (final_data, width, height, format_name) = if mode == ProcessMode::Original {
        let (w, h, format) = decode_header(&data)?;
        (data.to_vec(), w as i64, h as i64, format_label(format))
    } else {
        let img = image::load_from_memory(&data)
            .map_err(|_| AppError::processing("corrupt image data"))?;
        let size = parse_clamped(&size_raw, 256, 16, 2048);
        let scale = parse_clamped(&scale_raw, 75, 1, 100);
        let opts = ProcessOptions {
            mode,
            size: size as u32,
            scale: scale as u32,
            quality: UPLOAD_JPEG_QUALITY,
        };
        let (buf, w, h) = process_image(&img, &opts)?;
        (buf, w as i64, h as i64, "jpeg")
    };
    let size = final_data.len() as i64;

    let _permit = state
        .write_gate
        .acquire()
        .await
        .map_err(|_| AppError::internal("write admission gate closed"))?;

    let result = state
        .database
        .upsert_asset(
            &keys,
            AssetPayload {
                data: &final_data,
                width,
                height,
                format: format_name,
            },
        )
        .await?;

    // Stats and invalidation only after a successful commit
    match result.action {
        UpsertAction::Created => state.stats.add_asset(size),
        UpsertAction::Updated => {
            state.stats.replace_asset(result.old_size, size);
            state.cache.delete(&format!("img:{}", result.asset_id));
        }
    }
    for key in &result.assigned_keys {
        state.cache.delete(&format!("map:{key}"));
    }

    Ok(Json(UploadResponse {
        status: "success".to_string(),
        action: result.action.as_str().to_string(),
        avatar_id: result.asset_id.clone(),
        keys: result.assigned_keys,
        url: format!(
            "{}/u/{}",
            state.config.base_url.trim_end_matches('/'),
            keys[0]
        ),
        size_kb: size / 1024,
    }))
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    pub key: Option<String>,
    pub id: Option<String>,
}

/// DELETE|POST /upload/delete?key=…&id=…
pub async fn delete_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    axum::extract::Query(params): axum::extract::Query<DeleteParams>,
) -> AppResult<Json<DeleteResponse>> {
    verify_secret(&headers, &state.config)?;

    let asset_id = match params.id.filter(|id| !id.is_empty()) {
        Some(id) => id,
        None => {
            let key = params
                .key
                .filter(|k| !k.is_empty())
                .ok_or_else(|| {
                    AppError::invalid_parameters("parameter 'key' or 'id' is required")
                })?;
            state
                .database
                .alias_to_asset_id(&key)
                .await?
                .ok_or_else(|| AppError::not_found("key", key))?
        }
    };

    let _permit = state
        .write_gate
        .acquire()
        .await
        .map_err(|_| AppError::internal("write admission gate closed"))?;

    let (size, keys) = state
        .database
        .delete_asset(&asset_id)
        .await?
        .ok_or_else(|| AppError::not_found("asset", asset_id.clone()))?;

    state.stats.remove_asset(size);
    state.cache.delete(&format!("img:{asset_id}"));
    for key in keys {
        state.cache.delete(&format!("map:{key}"));
    }

    Ok(Json(DeleteResponse {
        status: "success".to_string(),
        action: "deleted".to_string(),
        target: asset_id,
    }))
}
