//! Web layer
//!
//! Thin axum handlers over the service components. The router wires the
//! public avatar routes, the secret-gated write routes, and the console
//! API, with CORS outermost and the per-IP rate limiter directly inside
//! it. All dependencies live in [`AppState`]; nothing is reachable through
//! globals.

pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod responses;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Router,
};
use tokio::sync::{Mutex, Semaphore};
use tracing::info;

use crate::avatar::FontStore;
use crate::cache::MemoryCache;
use crate::coalescer::Coalescer;
use crate::config::Config;
use crate::database::Database;
use crate::services::{GithubClient, ServiceStats};
use crate::web::middleware::RateLimits;

/// At most this many write transactions are admitted concurrently; the
/// rest queue in process instead of hammering the single SQLite writer.
pub const MAX_CONCURRENT_WRITES: usize = 10;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub database: Database,
    pub cache: Arc<MemoryCache>,
    pub coalescer: Arc<Coalescer<bytes::Bytes>>,
    pub stats: Arc<ServiceStats>,
    pub fonts: Arc<FontStore>,
    pub github: GithubClient,
    pub rate_limits: Arc<RateLimits>,
    pub write_gate: Arc<Semaphore>,
    pub backup_lock: Arc<Mutex<()>>,
}

pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(
        config: Arc<Config>,
        database: Database,
        cache: Arc<MemoryCache>,
        stats: Arc<ServiceStats>,
        fonts: Arc<FontStore>,
    ) -> Result<Self> {
        let rate_limits = Arc::new(RateLimits::new(
            &config.security.rate_limit,
            config.rate_limit_window(),
        ));
        rate_limits.spawn_sweeper();

        let github = GithubClient::new(&format!(
            "{}/{}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        ))
        .map_err(|e| anyhow::anyhow!("failed to build http client: {e}"))?;

        let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

        let state = AppState {
            database,
            cache,
            stats,
            fonts,
            github,
            rate_limits,
            coalescer: Arc::new(Coalescer::new()),
            write_gate: Arc::new(Semaphore::new(MAX_CONCURRENT_WRITES)),
            backup_lock: Arc::new(Mutex::new(())),
            config,
        };

        let app = Self::create_router(state);
        Ok(Self { app, addr })
    }

    /// Builds the full router for the given state. Also used by the
    /// integration tests to drive the service without a socket.
    pub fn create_router(state: AppState) -> Router {
        let max_upload = state.config.max_upload_bytes() as usize;

        let console = Router::new()
            .route("/stats", get(handlers::console::get_stats))
            .route("/assets", get(handlers::console::list_assets))
            .route(
                "/assets/{id}",
                delete(handlers::console::delete_asset).put(handlers::console::update_asset_keys),
            )
            .route("/backup", get(handlers::console::backup))
            .layer(from_fn_with_state(
                state.clone(),
                handlers::console::auth_gate,
            ));

        Router::new()
            .route("/health", get(handlers::health::health_check))
            .route("/avatar/{seed}", get(handlers::avatar::serve_direct_avatar))
            .route(
                "/avatar/github/{user}",
                get(handlers::avatar::serve_github_avatar),
            )
            .route("/u/{*key}", get(handlers::avatar::serve_user_avatar))
            .route("/upload", post(handlers::upload::upload_handler))
            .route(
                "/upload/delete",
                delete(handlers::upload::delete_handler).post(handlers::upload::delete_handler),
            )
            .nest("/console/api", console)
            .layer(DefaultBodyLimit::max(max_upload))
            // Outside-in: CORS first, then the rate limiter, then routes
            .layer(from_fn_with_state(
                state.clone(),
                middleware::rate_limit_middleware,
            ))
            .layer(from_fn_with_state(state.clone(), middleware::cors_middleware))
            .with_state(state)
    }

    pub async fn serve(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        info!("listening on {}", self.addr);
        axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}
