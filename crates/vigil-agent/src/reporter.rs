use crate::config::{AgentConfig, Transport};
use crate::dispatch::{DispatchClient, DispatchError, GrpcExchange, HttpExchange, Result};
use async_trait::async_trait;
use std::sync::Arc;
use vigil_common::proto::{MetricProto, UpdateMetricsRequest};
use vigil_common::Metric;

/// Sends one batch of metrics to the server.
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn report(&self, metrics: Vec<Metric>) -> Result<()>;

    /// Stops accepting new batches.
    fn stop(&self);
}

/// Builds the reporter for the configured transport.
pub fn from_config(config: &AgentConfig) -> anyhow::Result<Arc<dyn Reporter>> {
    let base = config.server_url();
    let reporter: Arc<dyn Reporter> = match config.transport {
        Transport::Http => Arc::new(HttpReporter::new(&base, config.rate_limit)),
        Transport::Grpc => Arc::new(GrpcReporter::new(&base, config.rate_limit)?),
    };
    Ok(reporter)
}

/// `POST {base}/updates/` with a JSON array body.
pub struct HttpReporter {
    client: reqwest::Client,
    url: String,
    dispatch: DispatchClient<HttpExchange>,
}

impl HttpReporter {
    pub fn new(base_url: &str, rate_limit: usize) -> Self {
        let client = reqwest::Client::new();
        Self {
            url: format!("{}/updates/", base_url.trim_end_matches('/')),
            dispatch: DispatchClient::new(HttpExchange::new(client.clone()), rate_limit),
            client,
        }
    }
}

#[async_trait]
impl Reporter for HttpReporter {
    async fn report(&self, metrics: Vec<Metric>) -> Result<()> {
        let request = self
            .client
            .post(&self.url)
            .json(&metrics)
            .build()
            .map_err(|e| DispatchError::Transport(e.to_string()))?;
        self.dispatch.submit(request).await?;
        Ok(())
    }

    fn stop(&self) {
        self.dispatch.stop();
    }
}

/// `MetricService/UpdateMetrics` over gRPC.
pub struct GrpcReporter {
    dispatch: DispatchClient<GrpcExchange>,
}

impl GrpcReporter {
    pub fn new(endpoint: &str, rate_limit: usize) -> anyhow::Result<Self> {
        Ok(Self {
            dispatch: DispatchClient::new(GrpcExchange::connect_lazy(endpoint)?, rate_limit),
        })
    }
}

#[async_trait]
impl Reporter for GrpcReporter {
    async fn report(&self, metrics: Vec<Metric>) -> Result<()> {
        let request = UpdateMetricsRequest {
            metrics: metrics.iter().map(MetricProto::from).collect(),
        };
        self.dispatch.submit(request).await?;
        Ok(())
    }

    fn stop(&self) {
        self.dispatch.stop();
    }
}
