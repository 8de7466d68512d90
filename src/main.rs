use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use octa::{
    avatar::FontStore,
    cache::MemoryCache,
    config::Config,
    database::{maintenance::StorageCleaner, Database},
    services::ServiceStats,
    web::WebServer,
};

#[derive(Parser)]
#[command(name = "octa")]
#[command(version)]
#[command(about = "Self-hosted avatar generation and image asset service")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("octa={}", cli.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("starting octa v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load_from_file(&cli.config)?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config.validate()?;
    let config = Arc::new(config);

    let database = Database::new(&config.database.path).await?;
    database.migrate().await?;

    // Seed the atomic counters from the store before serving traffic
    let stats = Arc::new(ServiceStats::new());
    let (count, bytes) = database.initial_stats().await?;
    stats.seed(count, bytes);
    info!("loaded {count} assets ({bytes} bytes) from the store");

    let cache = Arc::new(MemoryCache::new(
        config.cache.enabled,
        config.cache_capacity_bytes(),
        config.cache_ttl(),
    ));
    cache.spawn_workers();

    let cleaner = StorageCleaner::new(
        database.clone(),
        Arc::clone(&stats),
        Arc::clone(&cache),
        config.max_db_bytes(),
        config.prune_interval(),
    );
    tokio::spawn(cleaner.run());

    let fonts = Arc::new(FontStore::load(config.image.font_path.as_deref()));

    let server = WebServer::new(
        Arc::clone(&config),
        database,
        cache,
        stats,
        fonts,
    )?;

    info!(
        "serving on {} (env: {})",
        server.addr(),
        config.server.env
    );
    server.serve().await
}
