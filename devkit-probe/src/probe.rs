use std::fmt;
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_PORT: u16 = 4100;
const TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Devkit API probe failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid JSON in readiness response: {0}")]
    Json(#[from] serde_json::Error),
}

/// Readiness and module list as returned by the API.
#[derive(Debug)]
pub struct Report {
    pub ready: Value,
    pub modules: Value,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ready = serde_json::to_string_pretty(&self.ready).map_err(|_| fmt::Error)?;
        let modules = serde_json::to_string_pretty(&self.modules).map_err(|_| fmt::Error)?;
        writeln!(f, "Devkit API status:")?;
        writeln!(f, "{ready}")?;
        writeln!(f)?;
        writeln!(f, "Registered modules:")?;
        writeln!(f, "{modules}")
    }
}

pub fn base_url(base: Option<&str>, port: u16) -> String {
    match base.map(str::trim).filter(|base| !base.is_empty()) {
        Some(base) => base.trim_end_matches('/').to_string(),
        None => format!("http://localhost:{port}"),
    }
}

pub async fn run(base: &str) -> Result<Report, ProbeError> {
    let client = Client::builder().timeout(TIMEOUT).build()?;
    probe(&client, base).await
}

pub async fn probe(client: &Client, base: &str) -> Result<Report, ProbeError> {
    let ready = fetch(client, &format!("{base}/v1/system/ready")).await?;
    let modules = fetch(client, &format!("{base}/v1/modules")).await?;
    Ok(Report { ready, modules })
}

async fn fetch(client: &Client, url: &str) -> Result<Value, ProbeError> {
    debug!(url, "fetching");
    let body = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    Ok(serde_json::from_str(&body)?)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn base_url_prefers_explicit_base() {
        assert_eq!(base_url(Some("http://api:9000/"), 4100), "http://api:9000");
        assert_eq!(base_url(None, 4200), "http://localhost:4200");
        assert_eq!(base_url(Some("  "), 4100), "http://localhost:4100");
    }

    #[tokio::test]
    async fn healthy_api_produces_report() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/system/ready"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ready"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/modules"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
            .mount(&server)
            .await;

        let report = run(&server.uri()).await.expect("report");
        assert_eq!(report.ready["status"], "ready");

        let rendered = report.to_string();
        assert!(rendered.starts_with("Devkit API status:\n{\n  \"status\": \"ready\"\n}\n"));
        assert!(rendered.contains("\nRegistered modules:\n"));
    }

    #[tokio::test]
    async fn http_error_status_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/system/ready"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = run(&server.uri()).await.unwrap_err();
        assert!(matches!(err, ProbeError::Http(_)));
        assert!(err.to_string().starts_with("Devkit API probe failed"));
    }

    #[tokio::test]
    async fn invalid_json_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/system/ready"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = run(&server.uri()).await.unwrap_err();
        assert!(matches!(err, ProbeError::Json(_)));
    }
}
