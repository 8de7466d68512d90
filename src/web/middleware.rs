//! HTTP middleware: per-IP rate limiting and CORS
//!
//! The rate limiter is a keyed token bucket (governor over DashMap): the
//! global bucket guards every route, a much stricter login bucket guards
//! the console auth gate. An idle sweep keeps the key maps from growing
//! with one entry per client forever.
//!
//! CORS is a custom allow-list with wildcard subdomain support; see
//! `origin_matches` for the accepted pattern forms.

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use tracing::debug;

use crate::config::RateLimitConfig;
use crate::errors::AppError;
use crate::web::responses::error_response;
use crate::web::AppState;

/// Idle bucket sweep frequency.
const SWEEP_INTERVAL: Duration = Duration::from_secs(3 * 60);

type KeyedLimiter = RateLimiter<
    String,
    dashmap::DashMap<String, InMemoryState>,
    DefaultClock,
    NoOpMiddleware<governor::clock::QuantaInstant>,
>;

pub struct RateLimits {
    enabled: bool,
    global: Arc<KeyedLimiter>,
    login: Arc<KeyedLimiter>,
}

impl RateLimits {
    pub fn new(config: &RateLimitConfig, window: Duration) -> Self {
        let requests = config.requests.max(1);
        let burst = NonZeroU32::new(config.burst.max(1)).unwrap_or(NonZeroU32::MIN);

        // Steady rate = requests per window, expressed as one token per
        // `window / requests`.
        let period = window
            .checked_div(requests)
            .filter(|p| !p.is_zero())
            .unwrap_or(Duration::from_millis(50));
        let global_quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::new(20).unwrap_or(NonZeroU32::MIN)))
            .allow_burst(burst);

        let login_quota = Quota::per_second(NonZeroU32::new(1).unwrap_or(NonZeroU32::MIN))
            .allow_burst(NonZeroU32::new(10).unwrap_or(NonZeroU32::MIN));

        Self {
            enabled: config.enabled,
            global: Arc::new(RateLimiter::keyed(global_quota)),
            login: Arc::new(RateLimiter::keyed(login_quota)),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Global per-IP bucket. `true` when the request may proceed.
    pub fn check(&self, ip: &str) -> bool {
        self.global.check_key(&ip.to_string()).is_ok()
    }

    /// Stricter bucket for authentication attempts.
    pub fn check_login(&self, ip: &str) -> bool {
        self.login.check_key(&ip.to_string()).is_ok()
    }

    /// Spawns the idle sweeper that drops buckets untouched long enough to
    /// have fully replenished.
    pub fn spawn_sweeper(self: &Arc<Self>) {
        if !self.enabled {
            return;
        }

        let limits = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                limits.global.retain_recent();
                limits.global.shrink_to_fit();
                limits.login.retain_recent();
                limits.login.shrink_to_fit();
                debug!(
                    "rate limiter sweep: {} global buckets, {} login buckets retained",
                    limits.global.len(),
                    limits.login.len()
                );
            }
        });
    }
}

/// Client address used as the rate-limit key: first `X-Forwarded-For`
/// element, else `X-Real-IP`, else the transport peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = xff.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.rate_limits.enabled() {
        return next.run(request).await;
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let ip = client_ip(request.headers(), peer);

    if !state.rate_limits.check(&ip) {
        return error_response(&AppError::RateLimitExceeded);
    }

    next.run(request).await
}

/// Strips the path from an origin URL, keeping `scheme://host`.
fn clean_origin(origin: &str) -> String {
    if let Some((scheme, rest)) = origin.split_once("://") {
        let host = rest.split('/').next().unwrap_or("");
        if !scheme.is_empty() && !host.is_empty() {
            return format!("{scheme}://{host}");
        }
    }
    origin.to_string()
}

/// Matches one origin against one allow-list pattern.
///
/// Supported forms: `*` (everything), exact `scheme://host`,
/// `*.example.com` (exactly one subdomain label), `**.example.com`
/// (the main domain plus any subdomain depth).
pub fn origin_matches(origin: &str, pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    if origin == pattern {
        return true;
    }

    if pattern.contains("**.") {
        let base = pattern.replacen("**.", "", 1);
        if origin == base {
            return true;
        }
        let domain = base
            .strip_prefix("https://")
            .or_else(|| base.strip_prefix("http://"))
            .unwrap_or(&base);
        return origin.ends_with(&format!(".{domain}"));
    }

    if pattern.contains("*.") {
        let mut parts = pattern.splitn(2, '*');
        let prefix = parts.next().unwrap_or("");
        let suffix = parts.next().unwrap_or("");
        if origin.starts_with(prefix) && origin.ends_with(suffix) {
            let middle = &origin[prefix.len()..origin.len() - suffix.len()];
            // Exactly one label: non-empty, no path, no nested subdomains
            return !middle.is_empty() && !middle.contains('/') && !middle.contains('.');
        }
    }

    false
}

pub fn is_allowed_origin(origin: &str, patterns: &[String]) -> bool {
    if origin.is_empty() {
        return false;
    }

    let clean = clean_origin(origin);
    patterns
        .iter()
        .any(|pattern| origin_matches(&clean, pattern))
}

pub async fn cors_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let referer = request
        .headers()
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let candidate = if origin.is_empty() { referer } else { origin.clone() };
    let allowed = is_allowed_origin(&candidate, &state.config.security.cors_origins);

    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    if allowed && !origin.is_empty() {
        if let Ok(value) = HeaderValue::from_str(&origin) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
            headers.insert(header::VARY, HeaderValue::from_static("Origin"));
        }
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, GET, OPTIONS, PUT, DELETE, PATCH"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(
            "Content-Type, Content-Length, Accept-Encoding, X-CSRF-Token, Authorization, X-Secret-Key, X-Requested-With",
        ),
    );

    response
}
