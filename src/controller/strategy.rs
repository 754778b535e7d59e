use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};

use crate::services::metrics::{Metrics, UsedMetrics};
use crate::types::{Play, Sla};

/// The 3h/1m observation window every strategy reasons over.
pub const METRICS_WINDOW: Duration = Duration::from_secs(3 * 3600);
pub const METRICS_STEP: Duration = Duration::from_secs(60);

/// A pluggable reconciliation policy: given the current Play and the SLA,
/// produce the next Play. Implementations never mutate their inputs and must
/// be safe to re-invoke with identical inputs.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Stable identifier used for registry lookups.
    fn name(&self) -> &str;

    async fn reconcile(&self, current: Play, sla: Sla) -> anyhow::Result<Play>;
}

/// Percentile-driven strategy: sizes bandwidth to the P95 of the observed
/// window and hardens the network policy when availability misses the SLA.
pub struct BasicStrategy {
    metrics: Arc<dyn Metrics>,
}

impl BasicStrategy {
    pub fn new(metrics: Arc<dyn Metrics>) -> Self {
        Self { metrics }
    }

    fn adjust_bandwidth(play: &mut Play, metrics: &UsedMetrics, sla: &Sla) {
        let current_up = parse_bandwidth_mbps(&play.bandwidth.ingress);
        let current_down = parse_bandwidth_mbps(&play.bandwidth.egress);

        // An empty window is no signal; leave the direction untouched.
        if !metrics.up_throughput.is_empty() {
            let p95_up = percentile(&metrics.up_throughput, 95.0);
            if p95_up > current_up * 0.9 {
                play.bandwidth.ingress = format!("{:.0}M", (p95_up * 1.2).ceil());
            } else if p95_up < current_up * 0.5 {
                play.bandwidth.ingress = format!("{:.0}M", (p95_up * 1.1).max(sla.up_bandwidth));
            }
        }

        if !metrics.down_throughput.is_empty() {
            let p95_down = percentile(&metrics.down_throughput, 95.0);
            if p95_down > current_down * 0.9 {
                play.bandwidth.egress = format!("{:.0}M", (p95_down * 1.2).ceil());
            } else if p95_down < current_down * 0.5 {
                play.bandwidth.egress =
                    format!("{:.0}M", (p95_down * 1.1).max(sla.down_bandwidth));
            }
        }
    }

    fn adjust_availability(play: &mut Play, metrics: &UsedMetrics, sla: &Sla) {
        if window_availability(&metrics.availability) >= sla.availability {
            return;
        }

        let policy = play.network_policy.get_or_insert_with(Default::default);
        let spec = policy.spec.get_or_insert_with(Default::default);
        spec.pod_selector
            .match_labels
            .get_or_insert_with(BTreeMap::new)
            .insert("sla-tier".to_string(), "gold".to_string());

        play.annotations.insert(
            "qos-policy".to_string(),
            format!("ha-{:.1}", sla.availability),
        );
        play.annotations.insert(
            "last-adjusted".to_string(),
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        );
    }
}

#[async_trait]
impl Strategy for BasicStrategy {
    fn name(&self) -> &str {
        "basic"
    }

    async fn reconcile(&self, current: Play, sla: Sla) -> anyhow::Result<Play> {
        let metrics = self
            .metrics
            .used_metrics(&current.slice_id, METRICS_WINDOW, METRICS_STEP)
            .await?;

        let mut play = current;
        Self::adjust_bandwidth(&mut play, &metrics, &sla);
        Self::adjust_availability(&mut play, &metrics, &sla);
        Ok(play)
    }
}

/// Parses `"{N}M"` into Mbps; any other suffix parses as 0.
pub fn parse_bandwidth_mbps(bandwidth: &str) -> f64 {
    match bandwidth.strip_suffix('M') {
        Some(n) => n.parse().unwrap_or(0.0),
        None => 0.0,
    }
}

/// Nearest-rank percentile: sort ascending and take the element at
/// `ceil((p/100)·(n-1))`. An empty input is 0.
pub fn percentile(data: &[f64], p: f64) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let index = ((p / 100.0) * (sorted.len() - 1) as f64).ceil() as usize;
    sorted[index.min(sorted.len() - 1)]
}

/// Mean of the in-range samples; out-of-range readings are discarded. An
/// empty (or fully discarded) window reads as fully available.
fn window_availability(samples: &[f64]) -> f64 {
    let in_range: Vec<f64> = samples
        .iter()
        .copied()
        .filter(|a| (0.0..=100.0).contains(a))
        .collect();
    if in_range.is_empty() {
        return 100.0;
    }
    in_range.iter().sum::<f64>() / in_range.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use std::sync::Mutex;

    struct FakeMetrics {
        canned: Mutex<UsedMetrics>,
    }

    impl FakeMetrics {
        fn new(canned: UsedMetrics) -> Arc<Self> {
            Arc::new(Self {
                canned: Mutex::new(canned),
            })
        }
    }

    #[async_trait]
    impl Metrics for FakeMetrics {
        async fn used_metrics(
            &self,
            _slice_id: &str,
            _duration: Duration,
            _step: Duration,
        ) -> anyhow::Result<UsedMetrics> {
            Ok(self.canned.lock().unwrap().clone())
        }
    }

    fn test_play() -> Play {
        Play {
            id: None,
            slice_id: "1-000001".to_string(),
            resources: crate::types::ResourceSpec {
                cpu_request: "500m".to_string(),
                cpu_limit: "1".to_string(),
                memory_request: "512Mi".to_string(),
                memory_limit: "1Gi".to_string(),
            },
            bandwidth: crate::types::BandwidthSpec {
                ingress: "100M".to_string(),
                egress: "200M".to_string(),
            },
            priority: 0,
            scheduling: Default::default(),
            network_policy: None,
            annotations: Default::default(),
        }
    }

    fn test_sla() -> Sla {
        Sla {
            id: None,
            slice_id: "1-000001".to_string(),
            up_bandwidth: 50.0,
            down_bandwidth: 50.0,
            latency: 50.0,
            availability: 99.9,
        }
    }

    fn healthy_availability() -> Vec<f64> {
        vec![100.0; 10]
    }

    #[test]
    fn test_parse_bandwidth_mbps() {
        assert_eq!(parse_bandwidth_mbps("100M"), 100.0);
        assert_eq!(parse_bandwidth_mbps("0M"), 0.0);
        // Only the Mbps suffix is understood.
        assert_eq!(parse_bandwidth_mbps("1G"), 0.0);
        assert_eq!(parse_bandwidth_mbps("100"), 0.0);
        assert_eq!(parse_bandwidth_mbps(""), 0.0);
    }

    #[test]
    fn test_percentile_identity_on_sorted_input() {
        let data: Vec<f64> = (1..=100).map(|i| i as f64).collect();
        // ceil(0.95 * 99) = 95 -> data[95] = 96.
        assert_eq!(percentile(&data, 95.0), 96.0);
    }

    #[test]
    fn test_percentile_sorts_input() {
        let data = vec![5.0, 1.0, 4.0, 2.0, 3.0];
        assert_eq!(percentile(&data, 50.0), 3.0);
        assert_eq!(percentile(&data, 100.0), 5.0);
    }

    #[test]
    fn test_percentile_empty_is_zero() {
        assert_eq!(percentile(&[], 95.0), 0.0);
    }

    #[tokio::test]
    async fn test_bandwidth_bump_on_high_p95() {
        let metrics = FakeMetrics::new(UsedMetrics {
            up_throughput: vec![96.0; 10],
            down_throughput: vec![100.0; 10],
            latency: vec![],
            availability: healthy_availability(),
        });
        let strategy = BasicStrategy::new(metrics);

        let play = strategy.reconcile(test_play(), test_sla()).await.unwrap();
        // ceil(96 * 1.2) = 116.
        assert_eq!(play.bandwidth.ingress, "116M");
        // P95 of 100 on a 200M egress sits between 0.5x and 0.9x: unchanged.
        assert_eq!(play.bandwidth.egress, "200M");
    }

    #[tokio::test]
    async fn test_bandwidth_shrink_guarded_by_sla() {
        let metrics = FakeMetrics::new(UsedMetrics {
            up_throughput: vec![30.0; 10],
            down_throughput: vec![180.0; 10],
            latency: vec![],
            availability: healthy_availability(),
        });
        let strategy = BasicStrategy::new(metrics);

        let play = strategy.reconcile(test_play(), test_sla()).await.unwrap();
        // max(30 * 1.1, 50) = 50: the SLA floor wins.
        assert_eq!(play.bandwidth.ingress, "50M");
    }

    #[tokio::test]
    async fn test_empty_window_leaves_bandwidth_unchanged() {
        let metrics = FakeMetrics::new(UsedMetrics {
            up_throughput: vec![],
            down_throughput: vec![],
            latency: vec![],
            availability: healthy_availability(),
        });
        let strategy = BasicStrategy::new(metrics);

        let play = strategy.reconcile(test_play(), test_sla()).await.unwrap();
        assert_eq!(play.bandwidth.ingress, "100M");
        assert_eq!(play.bandwidth.egress, "200M");
    }

    #[tokio::test]
    async fn test_mid_band_p95_changes_nothing() {
        // P95 within [0.5x, 0.9x] of current: both directions untouched.
        let metrics = FakeMetrics::new(UsedMetrics {
            up_throughput: vec![70.0; 10],
            down_throughput: vec![140.0; 10],
            latency: vec![],
            availability: healthy_availability(),
        });
        let strategy = BasicStrategy::new(metrics);

        let play = strategy.reconcile(test_play(), test_sla()).await.unwrap();
        assert_eq!(play.bandwidth.ingress, "100M");
        assert_eq!(play.bandwidth.egress, "200M");
    }

    #[tokio::test]
    async fn test_availability_breach_hardens_policy() {
        let metrics = FakeMetrics::new(UsedMetrics {
            up_throughput: vec![70.0; 10],
            down_throughput: vec![140.0; 10],
            latency: vec![],
            availability: vec![97.0; 10],
        });
        let strategy = BasicStrategy::new(metrics);

        let play = strategy.reconcile(test_play(), test_sla()).await.unwrap();

        let policy = play.network_policy.as_ref().unwrap();
        let labels = policy
            .spec
            .as_ref()
            .unwrap()
            .pod_selector
            .match_labels
            .as_ref()
            .unwrap();
        assert_eq!(labels["sla-tier"], "gold");

        assert_eq!(play.annotations["qos-policy"], "ha-99.9");
        let stamp = &play.annotations["last-adjusted"];
        assert!(
            DateTime::parse_from_rfc3339(stamp).is_ok(),
            "not RFC3339: {}",
            stamp
        );
        assert!(stamp.ends_with('Z'));
    }

    #[tokio::test]
    async fn test_availability_met_leaves_policy_alone() {
        let metrics = FakeMetrics::new(UsedMetrics {
            up_throughput: vec![70.0; 10],
            down_throughput: vec![140.0; 10],
            latency: vec![],
            availability: vec![99.95; 10],
        });
        let strategy = BasicStrategy::new(metrics);

        let play = strategy.reconcile(test_play(), test_sla()).await.unwrap();
        assert!(play.network_policy.is_none());
        assert!(!play.annotations.contains_key("qos-policy"));
    }

    #[test]
    fn test_window_availability_discards_out_of_range() {
        assert_eq!(window_availability(&[97.0, 97.0, 500.0, -3.0]), 97.0);
        assert_eq!(window_availability(&[]), 100.0);
        assert_eq!(window_availability(&[500.0]), 100.0);
    }
}
