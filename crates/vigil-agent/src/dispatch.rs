//! Bounded-concurrency delivery of outbound requests.
//!
//! [`DispatchClient`] owns a fixed pool of worker tasks that pull jobs from
//! one shared channel. A worker runs one [`Exchange`] at a time, so at most
//! `limit` requests are in flight no matter how many callers submit.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use vigil_common::proto::metric_service_client::MetricServiceClient;
use vigil_common::proto::{UpdateMetricsRequest, UpdateMetricsResponse};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The request never produced a response (connect, DNS, reset).
    #[error("Dispatch: transport error: {0}")]
    Transport(String),

    /// The response arrived but its body could not be read to the end.
    #[error("Dispatch: failed to read response body: {0}")]
    Body(String),

    /// The server answered with a non-success status.
    #[error("Dispatch: server rejected request ({status}): {message}")]
    Rejected { status: String, message: String },

    /// The client was stopped before the request could run.
    #[error("Dispatch: client stopped")]
    Stopped,
}

pub type Result<T> = std::result::Result<T, DispatchError>;

/// One network round trip.
#[async_trait]
pub trait Exchange: Send + Sync + 'static {
    type Request: Send + 'static;
    type Response: Send + 'static;

    async fn exchange(&self, request: Self::Request) -> Result<Self::Response>;
}

struct Job<E: Exchange> {
    request: E::Request,
    reply: oneshot::Sender<Result<E::Response>>,
}

pub struct DispatchClient<E: Exchange> {
    jobs: Mutex<Option<flume::Sender<Job<E>>>>,
    limit: usize,
}

impl<E: Exchange> DispatchClient<E> {
    /// Starts `limit` workers (at least one). Must run inside a Tokio
    /// runtime.
    pub fn new(exchange: E, limit: usize) -> Self {
        let limit = limit.max(1);
        let exchange = Arc::new(exchange);
        // Zero capacity: a send completes only once an idle worker takes
        // the job.
        let (tx, rx) = flume::bounded::<Job<E>>(0);

        for worker in 0..limit {
            tokio::spawn(worker_loop(worker, Arc::clone(&exchange), rx.clone()));
        }
        tracing::debug!(workers = limit, "Dispatch client started");

        Self {
            jobs: Mutex::new(Some(tx)),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Hands `request` to a worker and waits for its result.
    ///
    /// Waits first for an idle worker, then for its reply. A submission
    /// dropped before a worker claimed it is never sent. No retries are
    /// made.
    pub async fn submit(&self, request: E::Request) -> Result<E::Response> {
        let jobs = self
            .jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or(DispatchError::Stopped)?;

        let (reply, response) = oneshot::channel();
        jobs.send_async(Job { request, reply })
            .await
            .map_err(|_| DispatchError::Stopped)?;
        response.await.map_err(|_| DispatchError::Stopped)?
    }

    /// Closes the work channel. Workers finish the job they hold and exit;
    /// later submissions fail with [`DispatchError::Stopped`].
    pub fn stop(&self) {
        let closed = self
            .jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if closed.is_some() {
            tracing::debug!("Dispatch client stopped");
        }
    }
}

async fn worker_loop<E: Exchange>(
    worker: usize,
    exchange: Arc<E>,
    jobs: flume::Receiver<Job<E>>,
) {
    loop {
        let Ok(Job { request, reply }) = jobs.recv_async().await else {
            tracing::debug!(worker, "Dispatch worker exiting");
            return;
        };
        let result = exchange.exchange(request).await;
        if reply.send(result).is_err() {
            tracing::debug!(worker, "Submitter went away before the reply");
        }
    }
}

/// Response of an [`HttpExchange`], fully read.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Executes prebuilt `reqwest` requests.
#[derive(Clone, Default)]
pub struct HttpExchange {
    client: reqwest::Client,
}

impl HttpExchange {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Exchange for HttpExchange {
    type Request = reqwest::Request;
    type Response = HttpResponse;

    async fn exchange(&self, request: reqwest::Request) -> Result<HttpResponse> {
        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| DispatchError::Body(e.to_string()))?;

        if !status.is_success() {
            return Err(DispatchError::Rejected {
                status: status.to_string(),
                message: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        Ok(HttpResponse {
            status: status.as_u16(),
            body: body.to_vec(),
        })
    }
}

/// Calls `UpdateMetrics` on the server's gRPC service.
#[derive(Clone)]
pub struct GrpcExchange {
    client: MetricServiceClient<tonic::transport::Channel>,
}

impl GrpcExchange {
    /// Builds a lazily connecting client, so the agent starts even when the
    /// server is down.
    pub fn connect_lazy(endpoint: &str) -> anyhow::Result<Self> {
        let channel = tonic::transport::Endpoint::from_shared(endpoint.to_string())?.connect_lazy();
        Ok(Self {
            client: MetricServiceClient::new(channel),
        })
    }
}

#[async_trait]
impl Exchange for GrpcExchange {
    type Request = UpdateMetricsRequest;
    type Response = UpdateMetricsResponse;

    async fn exchange(&self, request: UpdateMetricsRequest) -> Result<UpdateMetricsResponse> {
        let mut client = self.client.clone();
        match client.update_metrics(request).await {
            Ok(response) => Ok(response.into_inner()),
            Err(status) if status.code() == tonic::Code::Unavailable => {
                Err(DispatchError::Transport(status.message().to_string()))
            }
            Err(status) => Err(DispatchError::Rejected {
                status: format!("{:?}", status.code()),
                message: status.message().to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Records how many exchanges overlap and in which order they finish.
    #[derive(Default)]
    struct SlowExchange {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        finished: Mutex<Vec<u32>>,
    }

    #[async_trait]
    impl Exchange for Arc<SlowExchange> {
        type Request = u32;
        type Response = u32;

        async fn exchange(&self, request: u32) -> Result<u32> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.finished.lock().unwrap().push(request);
            if request == 0 {
                return Err(DispatchError::Rejected {
                    status: "400".into(),
                    message: "zero".into(),
                });
            }
            Ok(request * 10)
        }
    }

    #[tokio::test]
    async fn limit_one_runs_requests_sequentially() {
        let recorder = Arc::new(SlowExchange::default());
        let client = DispatchClient::new(Arc::clone(&recorder), 1);

        let (a, b) = tokio::join!(client.submit(1), client.submit(2));
        assert_eq!(a.unwrap(), 10);
        assert_eq!(b.unwrap(), 20);
        assert_eq!(recorder.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.finished.lock().unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn in_flight_never_exceeds_limit() {
        let recorder = Arc::new(SlowExchange::default());
        let client = Arc::new(DispatchClient::new(Arc::clone(&recorder), 3));

        let handles: Vec<_> = (1..=12)
            .map(|i| {
                let client = Arc::clone(&client);
                tokio::spawn(async move { client.submit(i).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let max = recorder.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 3, "observed {max} concurrent exchanges");
        assert!(max >= 2, "workers did not run in parallel");
    }

    #[tokio::test]
    async fn errors_are_returned_to_the_submitter() {
        let client = DispatchClient::new(Arc::new(SlowExchange::default()), 2);
        let err = client.submit(0).await.unwrap_err();
        assert!(matches!(err, DispatchError::Rejected { .. }));
        assert_eq!(client.submit(3).await.unwrap(), 30);
    }

    #[tokio::test]
    async fn abandoned_submit_is_never_sent() {
        let recorder = Arc::new(SlowExchange::default());
        let client = Arc::new(DispatchClient::new(Arc::clone(&recorder), 1));

        let busy = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.submit(1).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        // The only worker is busy, so this gives up before any hand-off.
        let gave_up = tokio::time::timeout(Duration::from_millis(20), client.submit(2)).await;
        assert!(gave_up.is_err());

        assert_eq!(busy.await.unwrap().unwrap(), 10);
        assert_eq!(client.submit(3).await.unwrap(), 30);
        assert_eq!(*recorder.finished.lock().unwrap(), vec![1, 3]);
    }

    #[tokio::test]
    async fn submit_after_stop_fails() {
        let client = DispatchClient::new(Arc::new(SlowExchange::default()), 1);
        client.stop();
        client.stop();
        assert!(matches!(client.submit(1).await, Err(DispatchError::Stopped)));
    }

    #[tokio::test]
    async fn http_exchange_reports_transport_failure() {
        let exchange = HttpExchange::default();
        // Port 9 (discard) on localhost is expected to refuse connections.
        let request = reqwest::Client::new()
            .post("http://127.0.0.1:9/updates/")
            .build()
            .unwrap();
        let err = exchange.exchange(request).await.unwrap_err();
        assert!(matches!(err, DispatchError::Transport(_)));
    }
}
