use std::collections::HashMap;

use k8s_openapi::api::networking::v1::NetworkPolicy;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

pub const MAX_PRIORITY: i64 = 1_000_000;

/// The mutable performance configuration of a slice. The controller rewrites
/// this record every tick to steer the slice toward its SLA.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Play {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub slice_id: String,

    #[serde(default)]
    pub resources: ResourceSpec,

    #[serde(default)]
    pub bandwidth: BandwidthSpec,

    #[serde(default)]
    pub priority: i64,

    #[serde(default)]
    pub scheduling: SchedulingSpec,

    /// Full policy object applied separately from the UPF deployment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_policy: Option<NetworkPolicy>,

    /// CNI-plugin specific annotations, merged onto the pod template.
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

/// CPU and memory requests/limits, e.g. `"500m"` / `"512Mi"`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub cpu_request: String,
    pub cpu_limit: String,
    pub memory_request: String,
    pub memory_limit: String,
}

/// Pod bandwidth caps, e.g. `"100M"`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BandwidthSpec {
    pub ingress: String,
    pub egress: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulingSpec {
    #[serde(default)]
    pub scheduler_name: String,
    /// Pins the pod to one node; mutually exclusive with `node_selector`.
    #[serde(default)]
    pub node_name: String,
    #[serde(default)]
    pub node_selector: HashMap<String, String>,
}

impl Play {
    pub fn validate(&self) -> Result<(), String> {
        let mut errs = Vec::new();

        if self.slice_id.trim().is_empty() {
            errs.push("slice_id must not be empty".to_string());
        }

        let r = &self.resources;
        if r.cpu_request.is_empty()
            || r.cpu_limit.is_empty()
            || r.memory_request.is_empty()
            || r.memory_limit.is_empty()
        {
            errs.push("resource requests and limits must not be empty".to_string());
        }

        if self.bandwidth.ingress.is_empty() || self.bandwidth.egress.is_empty() {
            errs.push("bandwidth ingress and egress must not be empty".to_string());
        }

        if !(0..=MAX_PRIORITY).contains(&self.priority) {
            errs.push(format!(
                "priority {} out of range [0,{}]",
                self.priority, MAX_PRIORITY
            ));
        }

        if !self.scheduling.node_name.is_empty() && !self.scheduling.node_selector.is_empty() {
            errs.push("node_name and node_selector are mutually exclusive".to_string());
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

    pub fn valid_play() -> Play {
        Play {
            id: None,
            slice_id: "1-000001".to_string(),
            resources: ResourceSpec {
                cpu_request: "500m".to_string(),
                cpu_limit: "1".to_string(),
                memory_request: "512Mi".to_string(),
                memory_limit: "1Gi".to_string(),
            },
            bandwidth: BandwidthSpec {
                ingress: "100M".to_string(),
                egress: "200M".to_string(),
            },
            priority: 1000,
            scheduling: SchedulingSpec {
                scheduler_name: "default-scheduler".to_string(),
                node_name: String::new(),
                node_selector: HashMap::new(),
            },
            network_policy: None,
            annotations: HashMap::new(),
        }
    }

    #[test]
    fn test_valid_play_passes() {
        assert!(valid_play().validate().is_ok());
    }

    #[test]
    fn test_empty_resources_rejected() {
        let mut play = valid_play();
        play.resources.cpu_request = String::new();
        assert!(play.validate().is_err());
    }

    #[test]
    fn test_empty_bandwidth_rejected() {
        let mut play = valid_play();
        play.bandwidth.egress = String::new();
        assert!(play.validate().is_err());
    }

    #[test]
    fn test_priority_bounds() {
        let mut play = valid_play();
        play.priority = -1;
        assert!(play.validate().is_err());
        play.priority = MAX_PRIORITY + 1;
        assert!(play.validate().is_err());
        play.priority = MAX_PRIORITY;
        assert!(play.validate().is_ok());
        play.priority = 0;
        assert!(play.validate().is_ok());
    }

    #[test]
    fn test_node_name_and_selector_exclusive() {
        let mut play = valid_play();
        play.scheduling.node_name = "worker-1".to_string();
        assert!(play.validate().is_ok());

        play.scheduling
            .node_selector
            .insert("zone".to_string(), "edge".to_string());
        assert!(play.validate().is_err());

        play.scheduling.node_name = String::new();
        assert!(play.validate().is_ok());
    }
}
