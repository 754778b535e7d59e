use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{Monitor, SupportedKpi};

/// Response envelope shared by the monitoring stack's endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonarchResponse {
    pub status: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct SupportedKpisResponse {
    #[serde(flatten)]
    response: MonarchResponse,
    #[serde(default)]
    supported_kpis: Vec<SupportedKpi>,
}

#[derive(Debug, Deserialize)]
struct SubmitMonitoringResponse {
    #[serde(flatten)]
    response: MonarchResponse,
    #[serde(default)]
    request_id: String,
}

/// Client for the Monarch request translator, the broker that turns
/// externally managed monitoring requests into scrape pipelines.
pub struct MonarchClient {
    base_url: String,
    http: reqwest::Client,
}

impl MonarchClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Startup reachability probe against the supported-KPIs endpoint.
    pub async fn ready(&self) -> anyhow::Result<()> {
        let url = format!("{}/api/supported-kpis", self.base_url);
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("request translator unhealthy, status {}", resp.status());
        }
        Ok(())
    }

    pub async fn get_supported_kpis(&self) -> anyhow::Result<Vec<SupportedKpi>> {
        let url = format!("{}/api/supported-kpis", self.base_url);
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("request translator returned status {}", resp.status());
        }

        let body: SupportedKpisResponse = resp.json().await?;
        if body.response.status != "success" {
            anyhow::bail!(
                "request translator returned status {:?}: {}",
                body.response.status,
                body.response.message
            );
        }
        Ok(body.supported_kpis)
    }

    /// Submits a monitoring request; on acceptance the broker's request id is
    /// stamped onto the monitor.
    pub async fn submit_monitoring(&self, mut monitor: Monitor) -> anyhow::Result<Monitor> {
        let url = format!("{}/api/monitoring-requests", self.base_url);
        let resp = self.http.post(&url).json(&monitor).send().await?;
        let status = resp.status();

        let body: SubmitMonitoringResponse = resp.json().await?;
        if body.response.status != "success" || !status.is_success() {
            anyhow::bail!(
                "monitoring request rejected: {} (status {})",
                body.response.message,
                status
            );
        }

        monitor.request_id = Some(body.request_id);
        Ok(monitor)
    }

    pub async fn delete_monitoring(&self, request_id: &str) -> anyhow::Result<()> {
        let url = format!(
            "{}/api/monitoring-requests/delete/{}",
            self.base_url, request_id
        );
        let resp = self.http.delete(&url).send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("request translator returned status {}", resp.status());
        }

        let body: MonarchResponse = resp.json().await?;
        if body.status != "success" {
            anyhow::bail!("monitoring delete rejected: {}", body.message);
        }
        Ok(())
    }
}
