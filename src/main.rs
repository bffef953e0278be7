//! Fraud Scoring Service binary

use std::net::SocketAddr;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fraud_scoring_service::{config::Config, create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    // Initialize logging
    init_tracing(&config);

    tracing::info!("Fraud Scoring Service starting...");
    tracing::info!("Model: {}", config.model_path.display());
    tracing::info!("Dataset: {}", config.dataset_path.display());

    if config.is_production() && std::env::var("JWT_SECRET").is_err() {
        tracing::warn!("JWT_SECRET not set in production; using the built-in development secret");
    }

    // Build application state
    let state = AppState::from_config(&config)?;

    // Build router
    let audit = state.audit.clone();
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    tracing::info!("Server listening on http://{}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Drain queued audit records before exit
    audit.flushed().await;
    tracing::info!("Server stopped");
    Ok(())
}

fn init_tracing(config: &Config) {
    let default_filter = if config.debug {
        "fraud_scoring_service=debug,audit=info,tower_http=debug"
    } else {
        "fraud_scoring_service=info,audit=info,tower_http=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let json = std::env::var("LOG_FORMAT")
        .map(|f| f.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
