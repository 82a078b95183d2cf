//! # mindmap-server
//!
//! Assembles settings, logging, storage and the HTTP API into one process.

use std::sync::Arc;

use anyhow::Context;
use api_adapters::{router, AppState};
use configs::{LogSettings, Settings};
use domains::MapRepository;
use services::ScratchSpace;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "db-sqlite")]
use secrecy::ExposeSecret;
#[cfg(feature = "db-sqlite")]
use storage_adapters::SqliteMapRepo;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("failed to load settings")?;
    init_tracing(&settings.log);

    // 1. Storage
    #[cfg(feature = "db-sqlite")]
    let repo: Arc<dyn MapRepository> = Arc::new(
        SqliteMapRepo::connect(settings.database.url.expose_secret(), settings.database.max_connections)
            .await
            .context("failed to open the map database")?,
    );
    #[cfg(not(feature = "db-sqlite"))]
    let repo: Arc<dyn MapRepository> = {
        tracing::warn!("built without db-sqlite; maps are kept in memory only");
        Arc::new(storage_adapters::MemoryMapRepo::new())
    };

    // 2. Services and routes
    let scratch = ScratchSpace::new(&settings.storage.scratch_dir, &settings.storage.export_dir);
    let app = router(AppState::new(repo, scratch), settings.server.max_upload_bytes);

    let addr = settings.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "mindmap server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

fn init_tracing(log: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}
