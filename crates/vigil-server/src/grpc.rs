use crate::state::AppState;
use tonic::{Request, Response, Status};
use vigil_common::proto::metric_service_server::MetricService;
use vigil_common::proto::{UpdateMetricsRequest, UpdateMetricsResponse};
use vigil_common::{Metric, MetricError};
use vigil_storage::StorageError;

pub use vigil_common::proto::metric_service_server::MetricServiceServer;

pub struct MetricServiceImpl {
    state: AppState,
}

impl MetricServiceImpl {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

fn metric_status(err: MetricError) -> Status {
    match err {
        MetricError::UnknownType(_) => Status::unimplemented(err.to_string()),
        MetricError::Validation(_) | MetricError::Integrity { .. } => {
            Status::invalid_argument(err.to_string())
        }
    }
}

#[tonic::async_trait]
impl MetricService for MetricServiceImpl {
    async fn update_metrics(
        &self,
        request: Request<UpdateMetricsRequest>,
    ) -> Result<Response<UpdateMetricsResponse>, Status> {
        let proto = request.into_inner();
        tracing::debug!(count = proto.metrics.len(), "Received gRPC metric batch");

        let metrics = proto
            .metrics
            .into_iter()
            .map(|m| {
                let metric = Metric::try_from(m)?;
                metric.validate()?;
                metric.verify_hash(&self.state.hash_key)?;
                Ok(metric)
            })
            .collect::<Result<Vec<_>, MetricError>>()
            .map_err(|e| {
                tracing::warn!(error = %e, "Rejected gRPC metric batch");
                metric_status(e)
            })?;

        match self.state.storage.update_all(metrics).await {
            Ok(()) => Ok(Response::new(UpdateMetricsResponse {})),
            Err(StorageError::Invalid(e)) => Err(metric_status(e)),
            Err(e) => {
                tracing::error!(error = %e, "Failed to store metric batch");
                Err(Status::internal("failed to store metrics"))
            }
        }
    }
}
