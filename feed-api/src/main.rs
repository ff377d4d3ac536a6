mod config;
mod routes;
mod state;

use std::sync::Arc;

use feed_core::{EstimatorConfig, FeedStore, PgStore, MIGRATOR};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = AppConfig::from_env()?;
    init_tracing(&cfg.log_filter);

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&cfg.database_url)
        .await?;
    MIGRATOR.run(&pool).await?;

    let store: Arc<dyn FeedStore> = Arc::new(PgStore::new(pool));
    let estimator_cfg = EstimatorConfig::default();

    let client = reqwest::Client::new();
    let images = Arc::new(feed_core::ImageFetcher::new(client.clone()));
    let scheduler = feed_core::spawn_scheduler(store.clone(), client, images, estimator_cfg);

    let app_state = AppState::new(store, estimator_cfg);
    let app = routes::router(app_state);

    let addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%addr, "starting feed-api");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.stop().await;
    Ok(())
}

fn init_tracing(log_filter: &str) {
    let filter = EnvFilter::try_new(log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sig = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        sig.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
