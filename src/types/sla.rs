use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// The target envelope the controller reconciles each slice toward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sla {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub slice_id: String,

    /// Mbps, e.g. 100.0 for "100Mbps".
    pub up_bandwidth: f64,
    /// Mbps.
    pub down_bandwidth: f64,
    /// Milliseconds.
    pub latency: f64,
    /// Percent, e.g. 99.9.
    pub availability: f64,
}

impl Sla {
    pub fn validate(&self) -> Result<(), String> {
        let mut errs = Vec::new();

        if self.slice_id.trim().is_empty() {
            errs.push("slice_id must not be empty".to_string());
        }
        if self.up_bandwidth <= 0.0 {
            errs.push("up_bandwidth must be strictly positive".to_string());
        }
        if self.down_bandwidth <= 0.0 {
            errs.push("down_bandwidth must be strictly positive".to_string());
        }
        if self.latency <= 0.0 {
            errs.push("latency must be strictly positive".to_string());
        }
        if !(0.0..=100.0).contains(&self.availability) {
            errs.push(format!(
                "availability {} out of range [0,100]",
                self.availability
            ));
        }

        if errs.is_empty() {
            Ok(())
        } else {
            Err(errs.join("; "))
        }
    }
}
