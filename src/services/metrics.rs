use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const INNER_TIMEOUT: Duration = Duration::from_secs(20);
const OUTER_TIMEOUT: Duration = Duration::from_secs(30);

/// The metric windows the strategies reason over, one sample vector per
/// signal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsedMetrics {
    pub up_throughput: Vec<f64>,
    pub down_throughput: Vec<f64>,
    pub latency: Vec<f64>,
    pub availability: Vec<f64>,
}

/// Observed-metrics capability, constructor-injected into strategies so the
/// LLM-backed one can share the controller's data source.
#[async_trait]
pub trait Metrics: Send + Sync {
    async fn used_metrics(
        &self,
        slice_id: &str,
        duration: Duration,
        step: Duration,
    ) -> anyhow::Result<UsedMetrics>;
}

/// PromQL range queries against a Thanos-compatible endpoint.
pub struct ThanosMetrics {
    base_url: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct QueryRangeResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryRangeData>,
}

#[derive(Debug, Deserialize)]
struct QueryRangeData {
    #[serde(rename = "resultType", default)]
    result_type: String,
    #[serde(default)]
    result: Vec<RangeSeries>,
}

#[derive(Debug, Deserialize)]
struct RangeSeries {
    #[serde(default)]
    values: Vec<(f64, String)>,
}

impl ThanosMetrics {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(INNER_TIMEOUT).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Startup reachability probe.
    pub async fn ready(&self) -> anyhow::Result<()> {
        let url = format!("{}/-/ready", self.base_url);
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("thanos not ready, status {}", resp.status());
        }
        Ok(())
    }

    /// Runs one range query and projects the first matrix series' sample
    /// values. No series means an empty window, not an error.
    pub async fn query_range(
        &self,
        query: &str,
        start: f64,
        end: f64,
        step: Duration,
    ) -> anyhow::Result<Vec<f64>> {
        let url = format!("{}/api/v1/query_range", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("query", query.to_string()),
                ("start", format!("{:.3}", start)),
                ("end", format!("{:.3}", end)),
                ("step", format!("{}", step.as_secs())),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("range query failed with status {}", status);
        }

        let body: QueryRangeResponse = resp.json().await?;
        if body.status != "success" {
            anyhow::bail!("range query returned status {:?}", body.status);
        }

        let data = match body.data {
            Some(data) => data,
            None => return Ok(Vec::new()),
        };
        if !data.result_type.is_empty() && data.result_type != "matrix" {
            anyhow::bail!("unexpected result type {:?}", data.result_type);
        }

        let series = match data.result.first() {
            Some(series) => series,
            None => return Ok(Vec::new()),
        };

        series
            .values
            .iter()
            .map(|(_, v)| {
                v.parse::<f64>()
                    .map_err(|e| anyhow::anyhow!("bad sample {:?}: {}", v, e))
            })
            .collect()
    }

    pub async fn up_throughput(
        &self,
        slice_id: &str,
        duration: Duration,
        step: Duration,
    ) -> anyhow::Result<Vec<f64>> {
        let (start, end) = window(duration);
        self.query_range(&throughput_query("uplink", slice_id, step), start, end, step)
            .await
    }

    pub async fn down_throughput(
        &self,
        slice_id: &str,
        duration: Duration,
        step: Duration,
    ) -> anyhow::Result<Vec<f64>> {
        let (start, end) = window(duration);
        self.query_range(
            &throughput_query("downlink", slice_id, step),
            start,
            end,
            step,
        )
        .await
    }

    pub async fn availability(
        &self,
        slice_id: &str,
        duration: Duration,
        step: Duration,
    ) -> anyhow::Result<Vec<f64>> {
        let (start, end) = window(duration);
        let succ = self
            .query_range(
                &session_counter_query("succ", slice_id, step),
                start,
                end,
                step,
            )
            .await?;
        let fail = self
            .query_range(
                &session_counter_query("fail", slice_id, step),
                start,
                end,
                step,
            )
            .await?;
        Ok(combine_availability(&succ, &fail))
    }

    /// No backend metric exposes per-slice latency yet; the window is empty
    /// rather than an error so callers can treat it as "no signal".
    pub async fn latency(
        &self,
        _slice_id: &str,
        _duration: Duration,
        _step: Duration,
    ) -> anyhow::Result<Vec<f64>> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl Metrics for ThanosMetrics {
    async fn used_metrics(
        &self,
        slice_id: &str,
        duration: Duration,
        step: Duration,
    ) -> anyhow::Result<UsedMetrics> {
        let fetch = async {
            let up_throughput = self.up_throughput(slice_id, duration, step).await?;
            let down_throughput = self.down_throughput(slice_id, duration, step).await?;
            let latency = self.latency(slice_id, duration, step).await?;
            let availability = self.availability(slice_id, duration, step).await?;
            Ok(UsedMetrics {
                up_throughput,
                down_throughput,
                latency,
                availability,
            })
        };

        match tokio::time::timeout(OUTER_TIMEOUT, fetch).await {
            Ok(res) => res,
            Err(_) => anyhow::bail!("metrics aggregation timed out"),
        }
    }
}

fn window(duration: Duration) -> (f64, f64) {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();
    (now - duration.as_secs_f64(), now)
}

fn throughput_query(direction: &str, slice_id: &str, step: Duration) -> String {
    format!(
        "avg_over_time(slice_throughput{{direction=\"{}\",slice_id=\"{}\"}}[{}s])",
        direction,
        slice_id,
        step.as_secs()
    )
}

fn session_counter_query(outcome: &str, slice_id: &str, step: Duration) -> String {
    format!(
        "avg_over_time(fivegs_smffunction_sm_pdusessioncreation{}{{slice_id=\"{}\"}}[{}s])",
        outcome,
        slice_id,
        step.as_secs()
    )
}

/// Pointwise success ratio; a sample with no successes is 0 by definition.
fn combine_availability(succ: &[f64], fail: &[f64]) -> Vec<f64> {
    succ.iter()
        .zip(fail.iter())
        .map(|(&s, &f)| if s <= 0.0 { 0.0 } else { s / (s + f) })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throughput_query_shape() {
        let q = throughput_query("uplink", "1-000001", Duration::from_secs(60));
        assert_eq!(
            q,
            "avg_over_time(slice_throughput{direction=\"uplink\",slice_id=\"1-000001\"}[60s])"
        );
    }

    #[test]
    fn test_session_counter_query_shape() {
        let q = session_counter_query("fail", "1-000001", Duration::from_secs(60));
        assert!(q.contains("fivegs_smffunction_sm_pdusessioncreationfail"));
        assert!(q.contains("slice_id=\"1-000001\""));
    }

    #[test]
    fn test_combine_availability_pointwise() {
        let out = combine_availability(&[9.0, 0.0, 3.0], &[1.0, 5.0, 1.0]);
        assert_eq!(out, vec![0.9, 0.0, 0.75]);
    }

    #[test]
    fn test_combine_availability_zero_success_is_zero() {
        // succ=0 must not divide; the sample is 0 outright.
        let out = combine_availability(&[0.0], &[0.0]);
        assert_eq!(out, vec![0.0]);
    }

    #[test]
    fn test_combine_availability_uses_shortest_window() {
        let out = combine_availability(&[1.0, 1.0, 1.0], &[1.0]);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_query_range_response_parses_matrix() {
        let raw = r#"{
            "status": "success",
            "data": {
                "resultType": "matrix",
                "result": [
                    {"metric": {"slice_id": "1-000001"},
                     "values": [[1700000000, "42.5"], [1700000060, "43.0"]]}
                ]
            }
        }"#;
        let parsed: QueryRangeResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.status, "success");
        let data = parsed.data.unwrap();
        assert_eq!(data.result[0].values.len(), 2);
        assert_eq!(data.result[0].values[0].1, "42.5");
    }
}
