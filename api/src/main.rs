use api::{AppConfig, AppState, headers::AlertHeaders, router};
use application::{AuthorService, IndexOutbox, IndexSynchronizer};
use infrastructure::{InMemoryAuthorIndex, InMemoryAuthorRepository};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// Application entry point
#[tokio::main]
async fn main() {
    // --- Logger Initialization ---
    let filter: EnvFilter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
    info!("Logger initialized successfully.");

    let config = AppConfig::from_env();

    // --- Dependency Injection ---
    // 1. Create infrastructure components
    let author_repository = Arc::new(InMemoryAuthorRepository::new());
    let author_index = Arc::new(InMemoryAuthorIndex::new());
    let outbox = Arc::new(IndexOutbox::new());
    info!("In-memory infrastructure components initialized.");

    // 2. Create application services, injecting dependencies
    let index_sync = Arc::new(IndexSynchronizer::new(
        author_repository.clone(),
        author_index.clone(),
        outbox,
        config.index_retry,
    ));
    let author_service = Arc::new(AuthorService::new(
        author_repository,
        author_index,
        index_sync.clone(),
    ));
    info!("Application services initialized.");

    // 3. Create the application state
    let alerts = match AlertHeaders::new(&config.application_name) {
        Ok(alerts) => Arc::new(alerts),
        Err(e) => {
            error!(
                "Application name '{}' cannot be used in headers: {}",
                config.application_name, e
            );
            std::process::exit(1);
        }
    };
    let app_state = AppState {
        author_service,
        alerts,
        pagination: config.pagination,
    };

    let reconciler = index_sync.spawn_reconciler();
    let app = router(app_state);
    info!("API routes configured.");

    // --- Server Startup ---
    let addr = config.socket_addr();
    info!("Server starting on {}", addr);
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => {
            info!("Server listening on {}", addr);
            listener
        }
        Err(e) => {
            error!("Failed to bind to address {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    reconciler.abort();
    info!("Server stopped.");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, draining connections.");
}
