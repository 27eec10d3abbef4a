//! Musicat Server - MARC21 music cataloging
//!
//! REST API server for cataloging printed and manuscript music.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

use musicat_server::{api, config::AppConfig, repository::Repository, services::Services, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("musicat_server={},tower_http=debug", config.logging.level).into());

    let json = config.logging.format == "json";
    let (file_layer, _log_guard) = match config.logging.directory.as_deref() {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "musicat.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().json().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(fmt::layer))
        .with(file_layer)
        .init();

    tracing::info!("Starting Musicat Server v{}", env!("CARGO_PKG_VERSION"));

    // Create database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Connected to database");

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    tracing::info!("Database migrations completed");

    let addr = SocketAddr::new(
        config.server.host.parse().context("Invalid host address")?,
        config.server.port,
    );

    // Create repository and services
    let repository = Repository::new(pool);
    let services = Arc::new(Services::new(repository, &config));

    if let Some(admin) = services.users.bootstrap_admin().await? {
        tracing::warn!(login = %admin.login, "Created bootstrap administrator, change its password");
    }

    spawn_purge_job(services.clone(), config.retention.purge_interval_hours);

    // Create application state
    let state = AppState {
        config: Arc::new(config),
        services,
    };

    let app = api::router(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Periodically purge soft-deleted works past retention
fn spawn_purge_job(services: Arc<Services>, interval_hours: u64) {
    if interval_hours == 0 {
        tracing::info!("Background purge disabled");
        return;
    }

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_hours * 3600));
        loop {
            ticker.tick().await;
            match services.catalog.purge_expired().await {
                Ok(report) if report.purged > 0 => {
                    tracing::info!(purged = report.purged, files_removed = report.files_removed, "Scheduled purge done")
                }
                Ok(_) => tracing::debug!("Scheduled purge: nothing to do"),
                Err(e) => tracing::error!(error = %e, "Scheduled purge failed"),
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
