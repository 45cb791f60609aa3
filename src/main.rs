//! Snippetbox server

use anyhow::Result;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use snippetbox::{
    config::Config,
    db,
    templates::TemplateCache,
    web::{self, AppState},
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "snippetbox=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
    web::middleware::install_panic_hook();

    tracing::info!("Starting snippetbox...");

    let config_path = std::env::var("SNIPPETBOX_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.yml"));
    let config = Config::load_with_env(&config_path)?;
    tracing::info!("Configuration loaded from {}", config_path.display());

    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    let templates = TemplateCache::from_embedded()?;
    tracing::info!("Template cache built with {} page(s)", templates.page_count());

    let state = AppState::new(&config, pool.clone(), templates)?;

    state
        .sessions
        .clone()
        .spawn_cleanup(Duration::from_secs(config.session.cleanup_interval_secs.max(1)));

    let app = web::build_router(state);

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    pool.close().await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}
