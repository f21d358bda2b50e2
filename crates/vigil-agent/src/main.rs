use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use vigil_agent::{reporter, Agent, AgentConfig};
use vigil_storage::MemStorage;

/// How long shutdown waits for reports that are already being sent.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("vigil=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/agent.toml".to_string());

    let config = AgentConfig::load(&config_path)
        .with_context(|| format!("failed to load agent config from {config_path}"))?;
    tracing::info!(
        server = %config.server_url(),
        transport = ?config.transport,
        rate_limit = config.rate_limit,
        signing = !config.hash_key.is_empty(),
        "vigil-agent starting"
    );

    let reporter = reporter::from_config(&config)?;
    let storage = Arc::new(MemStorage::new(config.hash_key.clone()));
    let agent = Agent::start(
        vigil_collector::default_collectors(),
        storage,
        reporter,
        Duration::from_secs(config.poll_interval_secs.max(1)),
        Duration::from_secs(config.report_interval_secs.max(1)),
    );

    signal::ctrl_c().await?;
    tracing::info!("Shutting down gracefully");
    agent.stop(SHUTDOWN_GRACE).await;

    Ok(())
}
