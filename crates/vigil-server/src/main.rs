use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tonic::transport::Server as TonicServer;
use tracing_subscriber::EnvFilter;
use vigil_server::config::ServerConfig;
use vigil_server::grpc::{MetricServiceImpl, MetricServiceServer};
use vigil_server::state::{open_storage, AppState};
use vigil_server::app;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("vigil=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/server.toml".to_string());

    let config = ServerConfig::load(&config_path)
        .with_context(|| format!("failed to load server config from {config_path}"))?;
    tracing::info!(
        http_port = config.http_port,
        grpc_port = config.grpc_port,
        signing = !config.hash_key.is_empty(),
        trusted_subnet = ?config.trusted_subnet,
        "vigil-server starting"
    );

    let storage = open_storage(&config.storage, &config.hash_key).await?;
    let state = AppState::new(config.clone(), Arc::clone(&storage))?;

    // gRPC server
    let grpc_addr: SocketAddr = format!("{}:{}", config.bind_address, config.grpc_port).parse()?;
    let grpc_server = TonicServer::builder()
        .add_service(MetricServiceServer::new(MetricServiceImpl::new(state.clone())))
        .serve(grpc_addr);

    // HTTP server
    let http_addr: SocketAddr = format!("{}:{}", config.bind_address, config.http_port).parse()?;
    let http_listener = tokio::net::TcpListener::bind(http_addr).await?;
    let http_server = axum::serve(http_listener, app::build_http_app(state));

    tracing::info!(grpc = %grpc_addr, http = %http_addr, "Server started");

    tokio::select! {
        result = grpc_server => {
            if let Err(e) = result {
                tracing::error!(error = %e, "gRPC server error");
            }
        }
        result = http_server.with_graceful_shutdown(async {
            signal::ctrl_c().await.ok();
            tracing::info!("Shutting down gracefully");
        }) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server error");
            }
        }
    }

    match tokio::time::timeout(CLOSE_TIMEOUT, storage.close()).await {
        Ok(Ok(())) => tracing::info!("Storage closed"),
        Ok(Err(e)) => tracing::error!(error = %e, "Failed to close storage"),
        Err(_) => tracing::warn!("Storage close timed out"),
    }
    tracing::info!("Server stopped");

    Ok(())
}
