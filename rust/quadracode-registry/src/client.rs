//! Registry HTTP client used by the fleet controller (C11) and the runtime
//! loop's hotpath probe (C10), grounded on
//! `knhk-sidecar::{client::SidecarClient, retry::RetryExecutor}`'s
//! exponential-backoff-around-a-transport shape.

use std::time::Duration;

use quadracode_types::AgentRecord;
use tokio::time::sleep;
use tracing::warn;

use crate::error::{RegistryError, Result};
use crate::registry::{HeartbeatRequest, RegisterRequest, RegistryStats};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_retries: 3, initial_delay_ms: 100, multiplier: 2.0 }
    }
}

/// Failures talking to the registry are surfaced, never swallowed (spec
/// §4.3: "network errors to the registry from the fleet controller are
/// surfaced and do not succeed silently").
pub struct RegistryClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryConfig,
}

impl RegistryClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builder never fails with only a timeout set");
        Self { http, base_url: base_url.into(), retry: RetryConfig::default() }
    }

    async fn execute<F, Fut, T>(&self, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut delay = self.retry.initial_delay_ms;
        let mut attempt = 0;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= self.retry.max_retries => return Err(err),
                Err(err) => {
                    warn!(attempt, error = %err, "registry request failed, retrying");
                    sleep(Duration::from_millis(delay)).await;
                    delay = (delay as f64 * self.retry.multiplier) as u64;
                    attempt += 1;
                }
            }
        }
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            Err(RegistryError::RequestFailed { status, body })
        }
    }

    pub async fn register(&self, req: &RegisterRequest) -> Result<AgentRecord> {
        self.execute(|| async {
            let resp = self
                .http
                .post(format!("{}/agents/register", self.base_url))
                .json(req)
                .send()
                .await?;
            Ok(Self::check(resp).await?.json().await?)
        })
        .await
    }

    pub async fn heartbeat(&self, req: &HeartbeatRequest) -> Result<AgentRecord> {
        self.execute(|| async {
            let resp = self
                .http
                .post(format!("{}/agents/{}/heartbeat", self.base_url, req.agent_id))
                .json(req)
                .send()
                .await?;
            Ok(Self::check(resp).await?.json().await?)
        })
        .await
    }

    pub async fn list(&self, healthy_only: bool, hotpath_only: bool) -> Result<Vec<AgentRecord>> {
        self.execute(|| async {
            let resp = self
                .http
                .get(format!("{}/agents", self.base_url))
                .query(&[("healthy_only", healthy_only), ("hotpath_only", hotpath_only)])
                .send()
                .await?;
            Ok(Self::check(resp).await?.json().await?)
        })
        .await
    }

    pub async fn get(&self, agent_id: &str) -> Result<AgentRecord> {
        self.execute(|| async {
            let resp = self.http.get(format!("{}/agents/{agent_id}", self.base_url)).send().await?;
            Ok(Self::check(resp).await?.json().await?)
        })
        .await
    }

    pub async fn set_hotpath(&self, agent_id: &str, hotpath: bool) -> Result<AgentRecord> {
        self.execute(|| async {
            let resp = self
                .http
                .post(format!("{}/agents/{agent_id}/hotpath", self.base_url))
                .json(&serde_json::json!({ "hotpath": hotpath }))
                .send()
                .await?;
            Ok(Self::check(resp).await?.json().await?)
        })
        .await
    }

    pub async fn remove(&self, agent_id: &str, force: bool) -> Result<()> {
        self.execute(|| async {
            let resp = self
                .http
                .delete(format!("{}/agents/{agent_id}", self.base_url))
                .query(&[("force", force)])
                .send()
                .await?;
            Self::check(resp).await?;
            Ok(())
        })
        .await
    }

    pub async fn stats(&self) -> Result<RegistryStats> {
        self.execute(|| async {
            let resp = self.http.get(format!("{}/stats", self.base_url)).send().await?;
            Ok(Self::check(resp).await?.json().await?)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn register_posts_and_parses_response() {
        let server = MockServer::start().await;
        let record = serde_json::json!({
            "agent_id": "a1", "host": "h", "port": 9000, "status": "healthy",
            "registered_at": "2026-01-01T00:00:00Z", "last_heartbeat": "2026-01-01T00:00:00Z",
            "hotpath": false
        });
        Mock::given(method("POST"))
            .and(path("/agents/register"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&record))
            .mount(&server)
            .await;

        let client = RegistryClient::new(server.uri(), Duration::from_secs(5));
        let req = RegisterRequest { agent_id: "a1".into(), host: "h".into(), port: 9000, hotpath: None };
        let got = client.register(&req).await.unwrap();
        assert_eq!(got.agent_id, "a1");
    }

    #[tokio::test]
    async fn non_success_status_surfaces_as_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/agents/ghost"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let client = RegistryClient::new(server.uri(), Duration::from_secs(5));
        let err = client.get("ghost").await.unwrap_err();
        assert!(matches!(err, RegistryError::RequestFailed { status: 404, .. }));
    }
}
