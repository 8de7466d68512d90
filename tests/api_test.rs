//! End-to-end tests driving the full router without a socket

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use bytes::Bytes;
use serde_json::Value;
use tower::ServiceExt;

use octa::avatar::{self, FontStore, RenderOptions};
use octa::cache::MemoryCache;
use octa::coalescer::Coalescer;
use octa::config::Config;
use octa::database::Database;
use octa::services::{GithubClient, ServiceStats};
use octa::utils::image_ops::{process_image, ProcessMode, ProcessOptions};
use octa::web::middleware::RateLimits;
use octa::web::{AppState, WebServer, MAX_CONCURRENT_WRITES};

const SECRET: &str = "test-secret";
const BOUNDARY: &str = "octa-test-boundary";

struct TestApp {
    router: Router,
    state: AppState,
    _dir: tempfile::TempDir,
}

async fn test_app(mutate: impl FnOnce(&mut Config)) -> TestApp {
    let dir = tempfile::tempdir().unwrap();

    let mut config = Config::default();
    config.database.path = dir
        .path()
        .join("test.db")
        .to_str()
        .unwrap()
        .to_string();
    config.security.upload_secret = SECRET.to_string();
    config.security.rate_limit.enabled = false;
    config.base_url = "http://localhost:9980".to_string();
    mutate(&mut config);
    let config = Arc::new(config);

    let database = Database::new(&config.database.path).await.unwrap();
    database.migrate().await.unwrap();

    let stats = Arc::new(ServiceStats::new());
    let (count, bytes) = database.initial_stats().await.unwrap();
    stats.seed(count, bytes);

    let cache = Arc::new(MemoryCache::new(
        config.cache.enabled,
        config.cache_capacity_bytes(),
        config.cache_ttl(),
    ));

    let state = AppState {
        rate_limits: Arc::new(RateLimits::new(
            &config.security.rate_limit,
            config.rate_limit_window(),
        )),
        github: GithubClient::new("octa-test").unwrap(),
        coalescer: Arc::new(Coalescer::new()),
        write_gate: Arc::new(tokio::sync::Semaphore::new(MAX_CONCURRENT_WRITES)),
        backup_lock: Arc::new(tokio::sync::Mutex::new(())),
        fonts: Arc::new(FontStore::load(None)),
        database,
        cache,
        stats,
        config,
    };

    TestApp {
        router: WebServer::create_router(state.clone()),
        state,
        _dir: dir,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Bytes) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, body)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Bytes) {
    send(
        app,
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
}

fn sample_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut buf = Vec::new();
    img.write_to(
        &mut std::io::Cursor::new(&mut buf),
        image::ImageFormat::Jpeg,
    )
    .unwrap();
    buf
}

enum Part<'a> {
    File(&'a str, &'a [u8]),
    Text(&'a str, &'a str),
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::File(name, data) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"upload.jpg\"\r\nContent-Type: image/jpeg\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
                body.extend_from_slice(b"\r\n");
            }
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

async fn upload(
    app: &Router,
    secret: &str,
    jpeg: &[u8],
    keys: &str,
    extra: &[(&str, &str)],
) -> (StatusCode, Value) {
    let mut parts = vec![Part::File("avatar", jpeg), Part::Text("keys", keys)];
    for (name, value) in extra {
        parts.push(Part::Text(name, value));
    }
    let body = multipart_body(&parts);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header("x-secret-key", secret)
        .body(Body::from(body))
        .unwrap();

    let (status, _, body) = send(app, request).await;
    let json: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn generator_is_deterministic_with_etag_revalidation() {
    let app = test_app(|_| {}).await;
    let uri = "/avatar/octa?size=128&theme=gradient/vivid";

    let (status_a, headers_a, body_a) = get(&app.router, uri).await;
    let (status_b, headers_b, body_b) = get(&app.router, uri).await;

    assert_eq!(status_a, StatusCode::OK);
    assert_eq!(status_b, StatusCode::OK);
    assert_eq!(body_a, body_b);

    let etag = headers_a.get(header::ETAG).unwrap().to_str().unwrap();
    assert_eq!(etag, headers_b.get(header::ETAG).unwrap().to_str().unwrap());
    assert_eq!(
        headers_a.get(header::CACHE_CONTROL).unwrap(),
        "public, max-age=86400"
    );

    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header(header::IF_NONE_MATCH, etag)
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::NOT_MODIFIED);
    assert!(body.is_empty());
}

#[tokio::test]
async fn upload_then_read_your_write() {
    let app = test_app(|_| {}).await;
    let jpeg = sample_jpeg(100, 80);

    let (status, json) = upload(
        &app.router,
        SECRET,
        &jpeg,
        "a,b,c",
        &[("mode", "square"), ("size", "64")],
    )
    .await;

    assert_eq!(status, StatusCode::OK, "upload failed: {json}");
    assert_eq!(json["status"], "success");
    assert_eq!(json["action"], "created");
    assert_eq!(
        json["keys"],
        serde_json::json!(["a", "b", "c"]),
        "all three keys assigned"
    );
    assert!(json["url"].as_str().unwrap().ends_with("/u/a"));

    // The stored body is exactly the normalization of the input
    let decoded = image::load_from_memory(&jpeg).unwrap();
    let opts = ProcessOptions {
        mode: ProcessMode::Square,
        size: 64,
        scale: 75,
        quality: 85,
    };
    let (expected, _, _) = process_image(&decoded, &opts).unwrap();

    let (status, headers, body) = get(&app.router, "/u/b").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "image/jpeg");
    assert_eq!(body.as_ref(), expected.as_slice());

    let (count, bytes) = app.state.stats.totals();
    assert_eq!(count, 1);
    assert_eq!(bytes, expected.len() as i64);
}

#[tokio::test]
async fn repeat_upload_updates_in_place() {
    let app = test_app(|_| {}).await;

    let (_, first) = upload(&app.router, SECRET, &sample_jpeg(50, 50), "me", &[]).await;
    let (_, second) = upload(&app.router, SECRET, &sample_jpeg(80, 80), "me", &[]).await;

    assert_eq!(second["action"], "updated");
    assert_eq!(first["avatar_id"], second["avatar_id"]);

    let (count, _) = app.state.stats.totals();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn secondary_alias_is_not_stolen() {
    let app = test_app(|_| {}).await;
    let jpeg_one = sample_jpeg(40, 40);
    let jpeg_two = sample_jpeg(90, 30);

    let (_, first) = upload(&app.router, SECRET, &jpeg_one, "x", &[]).await;
    let (status, second) = upload(&app.router, SECRET, &jpeg_two, "y,x", &[]).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["action"], "created");
    assert_eq!(second["keys"], serde_json::json!(["y"]));
    assert_ne!(first["avatar_id"], second["avatar_id"]);

    // /u/x still serves the first upload
    let decoded = image::load_from_memory(&jpeg_one).unwrap();
    let opts = ProcessOptions {
        mode: ProcessMode::Square,
        size: 256,
        scale: 75,
        quality: 85,
    };
    let (expected, _, _) = process_image(&decoded, &opts).unwrap();

    let (_, _, body) = get(&app.router, "/u/x").await;
    assert_eq!(body.as_ref(), expected.as_slice());
}

#[tokio::test]
async fn unknown_key_falls_back_to_generator() {
    let app = test_app(|_| {}).await;

    let (status, headers, body) = get(&app.router, "/u/unknown-key").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "image/png");

    let fonts = FontStore::load(None);
    let opts = RenderOptions::from_query(&HashMap::new(), app.state.config.image.default_size);
    let (expected, _) = avatar::render("unknown-key", &opts, &fonts).unwrap();
    assert_eq!(body, expected);
}

#[tokio::test]
async fn upload_requires_the_secret() {
    let app = test_app(|_| {}).await;

    let (status, json) = upload(&app.router, "wrong", &sample_jpeg(10, 10), "a", &[]).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["code"], "auth/invalid_credentials");
    assert_eq!(json["status"], 403);

    // Nothing was stored
    assert_eq!(app.state.stats.totals().0, 0);
}

#[tokio::test]
async fn upload_rejects_bad_inputs() {
    let app = test_app(|_| {}).await;

    // No valid keys at all
    let (status, json) = upload(&app.router, SECRET, &sample_jpeg(10, 10), "!!!,??", &[]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "request/invalid_parameters");

    // More keys than the limit (default 7)
    let (status, _) = upload(
        &app.router,
        SECRET,
        &sample_jpeg(10, 10),
        "a,b,c,d,e,f,g,h",
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Not an image
    let (status, json) = upload(&app.router, SECRET, b"plain text bytes", "a", &[]).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(json["code"], "request/invalid_media");
}

#[tokio::test]
async fn delete_by_key_removes_asset_and_aliases() {
    let app = test_app(|_| {}).await;
    upload(&app.router, SECRET, &sample_jpeg(20, 20), "gone,mirror", &[]).await;

    let request = Request::builder()
        .method(Method::DELETE)
        .uri("/upload/delete?key=gone")
        .header("x-secret-key", SECRET)
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["action"], "deleted");

    assert_eq!(app.state.stats.totals(), (0, 0));

    // Both aliases now fall back to the generator (PNG, not the JPEG)
    let (_, headers, _) = get(&app.router, "/u/mirror").await;
    assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "image/png");
}

#[tokio::test]
async fn rate_limit_returns_429_after_burst() {
    let app = test_app(|config| {
        config.security.rate_limit.enabled = true;
        config.security.rate_limit.requests = 2;
        config.security.rate_limit.window = "1s".into();
        config.security.rate_limit.burst = 2;
    })
    .await;

    let (first, _, _) = get(&app.router, "/avatar/one").await;
    let (second, _, _) = get(&app.router, "/avatar/two").await;
    let (third, _, body) = get(&app.router, "/avatar/three").await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);
    assert_eq!(third, StatusCode::TOO_MANY_REQUESTS);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["code"], "request/rate_limit_exceeded");
}

#[tokio::test]
async fn console_requires_auth_and_reports_stats() {
    let app = test_app(|_| {}).await;
    upload(&app.router, SECRET, &sample_jpeg(30, 30), "statme", &[]).await;

    // Without the secret
    let (status, _, _) = get(&app.router, "/console/api/stats").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // With it
    let request = Request::builder()
        .method(Method::GET)
        .uri("/console/api/stats")
        .header("x-secret-key", SECRET)
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);

    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["total_count"], 1);
    assert!(json["total_size"].as_i64().unwrap() > 0);
    assert_eq!(json["recent_uploads"].as_array().unwrap().len(), 1);
    assert!(json["recent_uploads"][0]["keys"]
        .as_str()
        .unwrap()
        .contains("statme"));
}

#[tokio::test]
async fn console_lists_and_searches_assets() {
    let app = test_app(|_| {}).await;
    upload(&app.router, SECRET, &sample_jpeg(10, 10), "team/alice", &[]).await;
    upload(&app.router, SECRET, &sample_jpeg(12, 12), "team/bob", &[]).await;
    upload(&app.router, SECRET, &sample_jpeg(14, 14), "solo", &[]).await;

    let request = Request::builder()
        .method(Method::GET)
        .uri("/console/api/assets?q=team/&limit=10")
        .header("x-secret-key", SECRET)
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);

    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["total_items"], 2);
    assert_eq!(json["items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn console_key_replacement_reports_conflicts() {
    let app = test_app(|_| {}).await;
    let (_, first) = upload(&app.router, SECRET, &sample_jpeg(10, 10), "taken", &[]).await;
    let (_, second) = upload(&app.router, SECRET, &sample_jpeg(12, 12), "mine", &[]).await;
    let second_id = second["avatar_id"].as_str().unwrap();

    // Conflict: "taken" belongs to the first asset
    let request = Request::builder()
        .method(Method::PUT)
        .uri(format!("/console/api/assets/{second_id}"))
        .header("x-secret-key", SECRET)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"keys": "fresh, taken"}"#))
        .unwrap();
    let (status, _, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["code"], "resource/conflict");

    // Clean replacement works
    let request = Request::builder()
        .method(Method::PUT)
        .uri(format!("/console/api/assets/{second_id}"))
        .header("x-secret-key", SECRET)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"keys": "Fresh/New"}"#))
        .unwrap();
    let (status, _, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);

    let id = app
        .state
        .database
        .alias_to_asset_id("fresh/new")
        .await
        .unwrap();
    assert_eq!(id.as_deref(), Some(second_id));

    let _ = first;
}

#[tokio::test]
async fn console_backup_streams_a_snapshot() {
    let app = test_app(|_| {}).await;
    upload(&app.router, SECRET, &sample_jpeg(16, 16), "backmeup", &[]).await;

    let request = Request::builder()
        .method(Method::GET)
        .uri("/console/api/backup")
        .header("x-secret-key", SECRET)
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers.get(header::CONTENT_TYPE).unwrap(),
        "application/x-sqlite3"
    );
    assert!(headers
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("attachment"));
    // SQLite main-file magic
    assert!(body.starts_with(b"SQLite format 3\0"));
}

#[tokio::test]
async fn cors_echoes_allowed_origins() {
    let app = test_app(|config| {
        config.security.cors_origins = vec!["https://*.example.com".to_string()];
    })
    .await;

    let request = Request::builder()
        .method(Method::GET)
        .uri("/avatar/cors-check")
        .header(header::ORIGIN, "https://app.example.com")
        .body(Body::empty())
        .unwrap();
    let (_, headers, _) = send(&app.router, request).await;
    assert_eq!(
        headers
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap()
            .to_str()
            .unwrap(),
        "https://app.example.com"
    );
    assert_eq!(headers.get(header::VARY).unwrap(), "Origin");

    // Disallowed origin gets no echo
    let request = Request::builder()
        .method(Method::GET)
        .uri("/avatar/cors-check")
        .header(header::ORIGIN, "https://evil.example.org")
        .body(Body::empty())
        .unwrap();
    let (_, headers, _) = send(&app.router, request).await;
    assert!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());

    // Preflight short-circuits
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/upload")
        .header(header::ORIGIN, "https://app.example.com")
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers
            .get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
            .unwrap(),
        "true"
    );
}

#[tokio::test]
async fn original_mode_preserves_bytes() {
    let app = test_app(|_| {}).await;
    let jpeg = sample_jpeg(33, 44);

    let (status, json) = upload(
        &app.router,
        SECRET,
        &jpeg,
        "raw",
        &[("mode", "original")],
    )
    .await;
    assert_eq!(status, StatusCode::OK, "upload failed: {json}");

    let (_, _, body) = get(&app.router, "/u/raw").await;
    assert_eq!(body.as_ref(), jpeg.as_slice());
}
