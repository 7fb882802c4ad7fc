//! Object-store (MinIO) health probe with bounded retry.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::retry::{Backoff, RetryDecision, RetryPolicy};
use crate::core::types::ServiceHealth;
use crate::error::{DevkitError, Result};
use crate::io::health::HealthProbe;

pub const MINIO_FAILED: &str = "Minio health check failed";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_IDLE_PER_HOST: usize = 10;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// Only transport-level failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Timeout(_))
    }
}

/// One HTTP GET against a health endpoint.
#[async_trait]
pub trait HealthTransport: Send + Sync {
    async fn get(&self, url: &str) -> std::result::Result<(), FetchError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
            .build()
            .map_err(|err| DevkitError::Config(format!("build http client: {err}")))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HealthTransport for ReqwestTransport {
    async fn get(&self, url: &str) -> std::result::Result<(), FetchError> {
        let response = self.client.get(url).send().await.map_err(classify)?;
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(FetchError::Status(status.as_u16()));
        }
        Ok(())
    }
}

fn classify(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(err.to_string())
    } else if err.is_connect() {
        FetchError::Connect(err.to_string())
    } else {
        FetchError::Other(err.to_string())
    }
}

pub struct ObjectStoreProbe<T = ReqwestTransport> {
    url: String,
    transport: T,
    policy: RetryPolicy,
}

impl<T: HealthTransport> ObjectStoreProbe<T> {
    pub fn new(url: impl Into<String>, transport: T) -> Self {
        Self {
            url: url.into(),
            transport,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// GET the health URL, retrying connect/timeout failures with backoff.
    ///
    /// Returns the number of attempts used on success.
    pub async fn fetch_with_retry(&self) -> std::result::Result<u32, FetchError> {
        let mut backoff = Backoff::new(self.policy);
        loop {
            let attempt = backoff.begin_attempt();
            let err = match self.transport.get(&self.url).await {
                Ok(()) => return Ok(attempt),
                Err(err) => err,
            };
            match backoff.on_failure(err.is_retryable()) {
                RetryDecision::RetryAfter(delay) => {
                    debug!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "minio health retry");
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp => return Err(err),
            }
        }
    }
}

#[async_trait]
impl<T: HealthTransport> HealthProbe for ObjectStoreProbe<T> {
    async fn check(&self) -> ServiceHealth {
        match self.fetch_with_retry().await {
            Ok(_) => ServiceHealth::ok(),
            Err(err) => {
                warn!(url = %self.url, error = %err, "minio health check failed");
                ServiceHealth::error(MINIO_FAILED)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use tokio::time::Instant;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::core::types::ProbeStatus;

    /// Replays queued outcomes, then succeeds.
    struct FakeTransport {
        outcomes: Mutex<VecDeque<std::result::Result<(), FetchError>>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl FakeTransport {
        fn new(outcomes: Vec<std::result::Result<(), FetchError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().expect("calls").clone()
        }
    }

    #[async_trait]
    impl HealthTransport for FakeTransport {
        async fn get(&self, _url: &str) -> std::result::Result<(), FetchError> {
            self.calls.lock().expect("calls").push(Instant::now());
            self.outcomes
                .lock()
                .expect("outcomes")
                .pop_front()
                .unwrap_or(Ok(()))
        }
    }

    fn refused() -> std::result::Result<(), FetchError> {
        Err(FetchError::Connect("connection refused".to_string()))
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_connect_failures() {
        let probe = ObjectStoreProbe::new(
            "http://minio/health",
            FakeTransport::new(vec![refused(), refused()]),
        );
        let start = Instant::now();

        assert_eq!(probe.fetch_with_retry().await.expect("healthy"), 3);

        // Attempts start at 0s, then after the 1s and 2s backoff delays.
        let offsets: Vec<u64> = probe
            .transport
            .call_times()
            .iter()
            .map(|at| (*at - start).as_secs())
            .collect();
        assert_eq!(offsets, vec![0, 1, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_report_minio_failure() {
        let probe = ObjectStoreProbe::new(
            "http://minio/health",
            FakeTransport::new(vec![
                refused(),
                Err(FetchError::Timeout("slow".to_string())),
                refused(),
            ]),
        );

        let health = probe.check().await;
        assert_eq!(health, ServiceHealth::error(MINIO_FAILED));
        assert_eq!(probe.transport.call_times().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn http_error_status_is_not_retried() {
        let probe = ObjectStoreProbe::new(
            "http://minio/health",
            FakeTransport::new(vec![Err(FetchError::Status(503))]),
        );

        let err = probe.fetch_with_retry().await.unwrap_err();
        assert!(matches!(err, FetchError::Status(503)));
        assert_eq!(probe.transport.call_times().len(), 1);
    }

    #[tokio::test]
    async fn reqwest_transport_reports_healthy_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/minio/health/ready"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/minio/health/ready", server.uri());
        let probe = ObjectStoreProbe::new(url, ReqwestTransport::new().expect("client"));
        assert!(probe.check().await.is_ok());
    }

    #[tokio::test]
    async fn reqwest_transport_fails_fast_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/minio/health/ready"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/minio/health/ready", server.uri());
        let probe = ObjectStoreProbe::new(url, ReqwestTransport::new().expect("client"));
        let health = probe.check().await;
        assert_eq!(health.status, ProbeStatus::Error);
        assert_eq!(health.message.as_deref(), Some(MINIO_FAILED));
    }
}
