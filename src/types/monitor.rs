use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// The one KPI the deployed calculator currently understands.
pub const KPI_SLICE_THROUGHPUT: &str = "slice_throughput";

/// A KPI monitoring request, installed locally as MDE + calculator manifests
/// or brokered to the external monitoring stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monitor {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub slice_id: String,

    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub request_description: String,
    pub scope: Scope,
    pub kpi: Kpi,
    pub duration: Duration,
    pub monitoring_interval: MonitoringInterval,

    /// Set once an externally brokered request has been accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scope {
    pub scope_type: String,
    pub scope_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Kpi {
    pub kpi_name: String,
    #[serde(default)]
    pub kpi_description: String,
    pub sub_counter: SubCounter,
    #[serde(default)]
    pub units: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubCounter {
    pub sub_counter_type: String,
    pub sub_counter_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Duration {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringInterval {
    #[serde(default)]
    pub adaptive: bool,
    #[serde(rename = "interval_seconds")]
    pub interval_secs: i64,
}

/// KPI descriptor advertised by the monitoring stack's request translator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportedKpi {
    pub kpi_name: String,
    #[serde(default)]
    pub kpi_description: String,
    #[serde(default)]
    pub units: String,
}

impl Monitor {
    pub fn validate(&self) -> Result<(), String> {
        let mut errs = Vec::new();

        match self.kpi.kpi_name.as_str() {
            KPI_SLICE_THROUGHPUT => {
                if self.scope.scope_type != "slice" {
                    errs.push(format!(
                        "scope_type must be \"slice\" for {}, got {:?}",
                        KPI_SLICE_THROUGHPUT, self.scope.scope_type
                    ));
                }
                if self.kpi.sub_counter.sub_counter_type != "SNSSAI" {
                    errs.push(format!(
                        "sub_counter_type must be \"SNSSAI\", got {:?}",
                        self.kpi.sub_counter.sub_counter_type
                    ));
                }
                if self.kpi.sub_counter.sub_counter_ids.len() != 1 {
                    errs.push(format!(
                        "exactly one sub-counter id expected, got {}",
                        self.kpi.sub_counter.sub_counter_ids.len()
                    ));
                } else if self.kpi.sub_counter.sub_counter_ids[0] != self.slice_id {
                    errs.push(format!(
                        "sub-counter id {:?} does not match slice_id {:?}",
                        self.kpi.sub_counter.sub_counter_ids[0], self.slice_id
                    ));
                }
            }
            other => errs.push(format!("unsupported KPI {:?}", other)),
        }

        if self.duration.end_time < self.duration.start_time {
            errs.push("duration end_time precedes start_time".to_string());
        }

        if errs.is_empty() {
            Ok(())
        } else {
            Err(errs.join("; "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_monitor() -> Monitor {
        Monitor {
            id: None,
            slice_id: "1-000001".to_string(),
            api_version: "v1".to_string(),
            request_description: "slice throughput".to_string(),
            scope: Scope {
                scope_type: "slice".to_string(),
                scope_id: "1-000001".to_string(),
            },
            kpi: Kpi {
                kpi_name: KPI_SLICE_THROUGHPUT.to_string(),
                kpi_description: String::new(),
                sub_counter: SubCounter {
                    sub_counter_type: "SNSSAI".to_string(),
                    sub_counter_ids: vec!["1-000001".to_string()],
                },
                units: "Mbps".to_string(),
            },
            duration: Duration {
                start_time: Utc::now(),
                end_time: Utc::now() + chrono::Duration::hours(1),
            },
            monitoring_interval: MonitoringInterval {
                adaptive: false,
                interval_secs: 1,
            },
            request_id: None,
        }
    }

    #[test]
    fn test_valid_monitor_passes() {
        assert!(valid_monitor().validate().is_ok());
    }

    #[test]
    fn test_unsupported_kpi_rejected() {
        let mut m = valid_monitor();
        m.kpi.kpi_name = "slice_latency".to_string();
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_scope_type_must_be_slice() {
        let mut m = valid_monitor();
        m.scope.scope_type = "cell".to_string();
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_sub_counter_type_must_be_snssai() {
        let mut m = valid_monitor();
        m.kpi.sub_counter.sub_counter_type = "CELL".to_string();
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_sub_counter_id_must_match_slice() {
        let mut m = valid_monitor();
        m.kpi.sub_counter.sub_counter_ids = vec!["2-000002".to_string()];
        assert!(m.validate().is_err());

        m.kpi.sub_counter.sub_counter_ids =
            vec!["1-000001".to_string(), "2-000002".to_string()];
        assert!(m.validate().is_err());
    }
}
