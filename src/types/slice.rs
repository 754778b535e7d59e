use serde::{Deserialize, Serialize};

/// A network slice as submitted by the operator: S-NSSAI identity plus the
/// PDU sessions it carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slice {
    pub sst: i32,
    pub sd: String,
    #[serde(default)]
    pub default_indicator: bool,
    #[serde(default)]
    pub sessions: Vec<Session>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub name: String,
    #[serde(rename = "type")]
    pub session_type: i32,
    #[serde(rename = "pcc_rule", default)]
    pub pcc_rules: Vec<PccRule>,
    pub ambr: Ambr,
    pub qos: Qos,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PccRule {
    #[serde(rename = "flow", default)]
    pub flows: Vec<Flow>,
    pub qos: Qos,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    pub direction: i32,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ambr {
    pub uplink: BitRate,
    pub downlink: BitRate,
}

/// Bitrate with a unit code: 0=bps, 1=Kbps, 2=Mbps, 3=Gbps, 4=Tbps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitRate {
    pub value: i64,
    pub unit: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Qos {
    pub index: i32,
    pub arp: Arp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mbr: Option<Ambr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gbr: Option<Ambr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Arp {
    pub priority_level: i32,
    pub pre_emption_capability: i32,
    pub pre_emption_vulnerability: i32,
}

impl Slice {
    /// Logical identifier `"{sst}-{sd}"` shared by the slice's Play and SLA.
    pub fn slice_id(&self) -> String {
        format!("{}-{}", self.sst, self.sd)
    }

    pub fn validate(&self) -> Result<(), String> {
        let mut errs = Vec::new();

        if !(1..=4).contains(&self.sst) {
            errs.push(format!("SST must be within [1,4], got {}", self.sst));
        }

        let sd_ok = (1..=6).contains(&self.sd.len())
            && self.sd.chars().all(|c| c.is_ascii_hexdigit());
        if !sd_ok {
            errs.push(format!("SD must be 1-6 hex digits, got {:?}", self.sd));
        }

        if self.sessions.is_empty() {
            errs.push("slice must carry at least one session".to_string());
        }

        for (i, session) in self.sessions.iter().enumerate() {
            if let Err(e) = session.validate() {
                errs.push(format!("session[{}]: {}", i, e));
            }
        }

        if errs.is_empty() {
            Ok(())
        } else {
            Err(errs.join("; "))
        }
    }
}

impl Session {
    fn validate(&self) -> Result<(), String> {
        let mut errs = Vec::new();

        if self.name.trim().is_empty() {
            errs.push("session name must not be empty".to_string());
        }

        // 1=IPv4, 2=IPv6, 3=IPv4v6
        if !(1..=3).contains(&self.session_type) {
            errs.push(format!("invalid session type {}", self.session_type));
        }

        if !(0..=4).contains(&self.ambr.uplink.unit) || !(0..=4).contains(&self.ambr.downlink.unit)
        {
            errs.push("AMBR unit must be within [0,4]".to_string());
        }

        if let Err(e) = self.qos.validate() {
            errs.push(format!("qos: {}", e));
        }

        for (i, rule) in self.pcc_rules.iter().enumerate() {
            if let Err(e) = rule.validate() {
                errs.push(format!("pcc_rule[{}]: {}", i, e));
            }
        }

        if errs.is_empty() {
            Ok(())
        } else {
            Err(errs.join("; "))
        }
    }
}

impl PccRule {
    fn validate(&self) -> Result<(), String> {
        let mut errs = Vec::new();

        for (i, flow) in self.flows.iter().enumerate() {
            // 0=uplink, 1=downlink
            if !(0..=1).contains(&flow.direction) {
                errs.push(format!("flow[{}] direction must be 0 or 1", i));
            }
        }

        if let Err(e) = self.qos.validate() {
            errs.push(format!("qos: {}", e));
        }

        if errs.is_empty() {
            Ok(())
        } else {
            Err(errs.join("; "))
        }
    }
}

impl Qos {
    fn validate(&self) -> Result<(), String> {
        let mut errs = Vec::new();

        if !(1..=86).contains(&self.index) {
            errs.push(format!("5QI index {} out of range [1,86]", self.index));
        }

        if !(1..=15).contains(&self.arp.priority_level) {
            errs.push(format!(
                "ARP priority level {} out of range [1,15]",
                self.arp.priority_level
            ));
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

    fn valid_slice() -> Slice {
        Slice {
            sst: 1,
            sd: "000001".to_string(),
            default_indicator: true,
            sessions: vec![Session {
                name: "internet".to_string(),
                session_type: 1,
                pcc_rules: vec![],
                ambr: Ambr {
                    uplink: BitRate { value: 100, unit: 2 },
                    downlink: BitRate { value: 200, unit: 2 },
                },
                qos: Qos {
                    index: 9,
                    arp: Arp {
                        priority_level: 8,
                        pre_emption_capability: 1,
                        pre_emption_vulnerability: 1,
                    },
                    mbr: None,
                    gbr: None,
                },
            }],
        }
    }

    #[test]
    fn test_valid_slice_passes() {
        assert!(valid_slice().validate().is_ok());
    }

    #[test]
    fn test_slice_id_format() {
        assert_eq!(valid_slice().slice_id(), "1-000001");
    }

    #[test]
    fn test_sst_out_of_range() {
        let mut slice = valid_slice();
        slice.sst = 0;
        assert!(slice.validate().is_err());
        slice.sst = 5;
        assert!(slice.validate().is_err());
    }

    #[test]
    fn test_sd_must_be_hex() {
        let mut slice = valid_slice();
        slice.sd = "zz".to_string();
        assert!(slice.validate().is_err());
        slice.sd = "".to_string();
        assert!(slice.validate().is_err());
        slice.sd = "0000001".to_string();
        assert!(slice.validate().is_err());
        slice.sd = "ABc123".to_string();
        assert!(slice.validate().is_ok());
    }

    #[test]
    fn test_slice_requires_a_session() {
        let mut slice = valid_slice();
        slice.sessions.clear();
        assert!(slice.validate().is_err());
    }

    #[test]
    fn test_session_type_bounds() {
        let mut slice = valid_slice();
        slice.sessions[0].session_type = 0;
        assert!(slice.validate().is_err());
        slice.sessions[0].session_type = 4;
        assert!(slice.validate().is_err());
        slice.sessions[0].session_type = 3;
        assert!(slice.validate().is_ok());
    }

    #[test]
    fn test_ambr_unit_bounds() {
        let mut slice = valid_slice();
        slice.sessions[0].ambr.uplink.unit = 5;
        assert!(slice.validate().is_err());
        slice.sessions[0].ambr.uplink.unit = -1;
        assert!(slice.validate().is_err());
    }

    #[test]
    fn test_qos_index_bounds() {
        let mut slice = valid_slice();
        slice.sessions[0].qos.index = 0;
        assert!(slice.validate().is_err());
        slice.sessions[0].qos.index = 87;
        assert!(slice.validate().is_err());
        slice.sessions[0].qos.index = 86;
        assert!(slice.validate().is_ok());
    }

    #[test]
    fn test_arp_priority_bounds() {
        let mut slice = valid_slice();
        slice.sessions[0].qos.arp.priority_level = 0;
        assert!(slice.validate().is_err());
        slice.sessions[0].qos.arp.priority_level = 16;
        assert!(slice.validate().is_err());
    }

    #[test]
    fn test_flow_direction_bounds() {
        let mut slice = valid_slice();
        let qos = slice.sessions[0].qos.clone();
        slice.sessions[0].pcc_rules.push(PccRule {
            flows: vec![Flow {
                direction: 2,
                description: String::new(),
            }],
            qos,
        });
        assert!(slice.validate().is_err());
        slice.sessions[0].pcc_rules[0].flows[0].direction = 1;
        assert!(slice.validate().is_ok());
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut slice = valid_slice();
        slice.sst = 9;
        slice.sd = "not-hex!".to_string();
        let msg = slice.validate().unwrap_err();
        assert!(msg.contains("SST"));
        assert!(msg.contains("SD"));
    }

    #[test]
    fn test_session_wire_format_uses_type_key() {
        let json = serde_json::json!({
            "name": "internet",
            "type": 1,
            "ambr": {
                "uplink": {"value": 100, "unit": 2},
                "downlink": {"value": 200, "unit": 2}
            },
            "qos": {
                "index": 9,
                "arp": {
                    "priority_level": 8,
                    "pre_emption_capability": 1,
                    "pre_emption_vulnerability": 1
                }
            }
        });
        let session: Session = serde_json::from_value(json).unwrap();
        assert_eq!(session.session_type, 1);
        assert!(session.pcc_rules.is_empty());
    }
}
