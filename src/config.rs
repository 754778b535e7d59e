use std::env;
use std::time::Duration;

use anyhow::{bail, Context};

/// Process-wide configuration, loaded once at startup and immutable after.
#[derive(Debug, Clone)]
pub struct Config {
    pub monitor: MonitorConfig,
    pub mongo: MongoConfig,
    pub kube: KubeConfig,
    pub server: ServerConfig,
    pub ipam: IpamConfig,
    pub ai: AiConfig,
    /// Directory of manifest templates; missing files fall back to the
    /// compiled-in defaults.
    pub template_path: String,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub thanos_uri: String,
    pub request_translator_uri: String,
    /// Scrape interval stamped into rendered MDE manifests, in seconds.
    pub monitoring_interval: u8,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub uri: String,
    pub db_name: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct KubeConfig {
    /// Namespace the slice workloads (open5gs NFs) run in.
    pub namespace: String,
    /// Namespace the monitoring stack runs in.
    pub monitor_namespace: String,
    /// Empty means in-cluster / inferred configuration.
    pub kubeconfig_path: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub http_server_address: String,
    pub slice_store_name: String,
    pub kube_store_name: String,
    pub monitor_store_name: String,
    pub play_store_name: String,
    pub sla_store_name: String,
}

#[derive(Debug, Clone)]
pub struct IpamConfig {
    pub n3_network: String,
    pub n4_network: String,
    pub session_network: String,
    pub session_subnet_length: u8,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub model_type: String,
    pub model: String,
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
    pub max_tokens: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            monitor: MonitorConfig {
                thanos_uri: must_get_env("MONARCH_THANOS_URL")?,
                request_translator_uri: must_get_env("MONARCH_REQUEST_TRANSLATOR_URI")?,
                monitoring_interval: must_get_env("MONARCH_MONITORING_INTERVAL")?
                    .parse()
                    .context("MONARCH_MONITORING_INTERVAL")?,
                timeout: parse_duration(&must_get_env("MONITOR_TIMEOUT")?)
                    .context("MONITOR_TIMEOUT")?,
            },
            mongo: MongoConfig {
                uri: must_get_env("MONGO_URI")?,
                db_name: must_get_env("MONGO_DB_NAME")?,
                timeout: parse_duration(&must_get_env("MONGO_TIMEOUT")?)
                    .context("MONGO_TIMEOUT")?,
            },
            kube: KubeConfig {
                namespace: must_get_env("NAMESPACE")?,
                monitor_namespace: must_get_env("MONITOR_NAMESPACE")?,
                kubeconfig_path: env::var("KUBECONFIG_PATH").unwrap_or_default(),
            },
            server: ServerConfig {
                http_server_address: must_get_env("HTTP_SERVER_ADDRESS")?,
                slice_store_name: "slice".to_string(),
                kube_store_name: "kube".to_string(),
                monitor_store_name: "monitor".to_string(),
                play_store_name: "play".to_string(),
                sla_store_name: "sla".to_string(),
            },
            ipam: IpamConfig {
                n3_network: must_get_env("N3_NETWORK")?,
                n4_network: must_get_env("N4_NETWORK")?,
                session_network: must_get_env("SESSION_NETWORK")?,
                session_subnet_length: must_get_env("SESSION_SUBNET_LENGTH")?
                    .parse()
                    .context("SESSION_SUBNET_LENGTH")?,
                timeout: parse_duration(&must_get_env("IPAM_TIMEOUT")?)
                    .context("IPAM_TIMEOUT")?,
            },
            ai: AiConfig {
                model_type: must_get_env("MODEL_TYPE")?,
                model: must_get_env("MODEL")?,
                api_key: must_get_env("API_KEY")?,
                base_url: env::var("BASE_URL").unwrap_or_default(),
                timeout: env::var("AI_TIMEOUT")
                    .ok()
                    .filter(|v| !v.is_empty())
                    .as_deref()
                    .map(parse_duration)
                    .transpose()
                    .context("AI_TIMEOUT")?
                    .unwrap_or(Duration::from_secs(60)),
                max_tokens: env::var("AI_MAX_TOKENS")
                    .ok()
                    .filter(|v| !v.is_empty())
                    .map(|v| v.parse())
                    .transpose()
                    .context("AI_MAX_TOKENS")?
                    .unwrap_or(0),
            },
            template_path: must_get_env("TEMPLATE_PATH")?,
        })
    }
}

fn must_get_env(key: &str) -> anyhow::Result<String> {
    let val = env::var(key).unwrap_or_default();
    if val.is_empty() {
        bail!("environment variable {} is empty", key);
    }
    Ok(val)
}

/// Accepts either a bare integer (seconds) or a duration literal such as
/// `"30s"`, `"5m"`, `"1h"`, `"250ms"`.
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .filter(|&i| i > 0)
        .with_context(|| format!("invalid duration {:?}", s))?;
    let (num, unit) = s.split_at(split);
    let num: u64 = num.parse().with_context(|| format!("invalid duration {:?}", s))?;

    match unit {
        "ms" => Ok(Duration::from_millis(num)),
        "s" => Ok(Duration::from_secs(num)),
        "m" => Ok(Duration::from_secs(num * 60)),
        "h" => Ok(Duration::from_secs(num * 3600)),
        _ => bail!("invalid duration unit {:?} in {:?}", unit, s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_bare_seconds() {
        assert_eq!(parse_duration("30").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("0").unwrap(), Duration::from_secs(0));
    }

    #[test]
    fn test_parse_duration_literals() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10d").is_err());
        assert!(parse_duration("s30").is_err());
    }
}
