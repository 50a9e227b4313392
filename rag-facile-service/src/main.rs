use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use rag_facile_service::api;
use rag_facile_service::config::load_config;
use rag_facile_service::service::ChatService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    info!(
        "Starting RAG Facile chat service v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = load_config()?;
    info!(
        host = %config.server.host,
        port = config.server.port,
        model = %config.openai.model,
        "Configuration loaded"
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);

    let service = Arc::new(ChatService::new(config).await?);
    service.spawn_session_sweeper();
    let app = api::router(service);

    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let format = fmt::format()
        .with_target(true)
        .with_thread_ids(true)
        .compact();

    // Use RUST_LOG if set, otherwise default to info level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("rag_facile_service=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format))
        .with(filter)
        .init();
}
