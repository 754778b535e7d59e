use std::fmt::Write as _;
use std::path::Path;

use anyhow::Context;

use crate::config::Config;
use crate::services::pool::Ipv4Cidr;
use crate::types::SliceRecord;

mod value;

pub use value::{KpiCalcValue, MdeValue, SessionValue, SliceValue};

const NFS: [&str; 3] = ["amf", "smf", "upf"];

/// Pure manifest production: `(entity, parameters) → manifests`. Never
/// touches the cluster or the store.
pub struct Renderer {
    templates: Templates,
    monitoring_interval: u8,
    thanos_url: String,
}

struct Templates {
    smf_configmap: String,
    smf_deployment: String,
    smf_service: String,
    upf_configmap: String,
    upf_deployment: String,
    mde_servicemonitor: String,
    kpi_calculator: String,
}

impl Templates {
    /// Files present under the template directory override the compiled-in
    /// defaults one by one.
    fn load(dir: &str) -> Self {
        let read = |file: &str, fallback: &str| -> String {
            let path = Path::new(dir).join(file);
            match std::fs::read_to_string(&path) {
                Ok(s) => s,
                Err(_) => fallback.to_string(),
            }
        };

        Self {
            smf_configmap: read(
                "smf-configmap.yaml",
                include_str!("../../templates/smf-configmap.yaml"),
            ),
            smf_deployment: read(
                "smf-deployment.yaml",
                include_str!("../../templates/smf-deployment.yaml"),
            ),
            smf_service: read(
                "smf-service.yaml",
                include_str!("../../templates/smf-service.yaml"),
            ),
            upf_configmap: read(
                "upf-configmap.yaml",
                include_str!("../../templates/upf-configmap.yaml"),
            ),
            upf_deployment: read(
                "upf-deployment.yaml",
                include_str!("../../templates/upf-deployment.yaml"),
            ),
            mde_servicemonitor: read(
                "mde-servicemonitor.yaml",
                include_str!("../../templates/mde-servicemonitor.yaml"),
            ),
            kpi_calculator: read(
                "kpi-calculator.yaml",
                include_str!("../../templates/kpi-calculator.yaml"),
            ),
        }
    }

    fn defaults() -> Self {
        Self::load("")
    }
}

impl Renderer {
    pub fn new(config: &Config) -> Self {
        Self {
            templates: Templates::load(&config.template_path),
            monitoring_interval: config.monitor.monitoring_interval,
            thanos_url: config.monitor.thanos_uri.clone(),
        }
    }

    pub fn with_defaults(monitoring_interval: u8, thanos_url: &str) -> Self {
        Self {
            templates: Templates::defaults(),
            monitoring_interval,
            thanos_url: thanos_url.to_string(),
        }
    }

    /// The five slice documents, in apply order: SMF configmap, SMF
    /// deployment, SMF service, UPF configmap, UPF deployment.
    pub fn render_slice(&self, record: &SliceRecord) -> anyhow::Result<Vec<String>> {
        let sessions = &record.slice.sessions;
        let subnets = &record.address.session_subnets;
        if sessions.len() != subnets.len() {
            anyhow::bail!(
                "session count {} does not match subnet count {}",
                sessions.len(),
                subnets.len()
            );
        }

        let slice = SliceValue {
            id: record.slice_id(),
            sst: record.slice.sst.to_string(),
            sd: record.slice.sd.clone(),
        };

        let session_values: Vec<SessionValue> = sessions
            .iter()
            .zip(subnets.iter())
            .enumerate()
            .map(|(i, (session, subnet))| SessionValue {
                subnet: subnet.clone(),
                dnn: session.name.clone(),
                dev: format!("ogstun{}", i),
            })
            .collect();

        let smf_n3_ip = host_ip(&record.address.smf_n3_addr)?;
        let smf_n4_ip = host_ip(&record.address.smf_n4_addr)?;
        let upf_n3_ip = host_ip(&record.address.upf_n3_addr)?;
        let upf_n4_ip = host_ip(&record.address.upf_n4_addr)?;

        let smf_sessions = session_block(&session_values, false)?;
        let upf_sessions = session_block(&session_values, true)?;
        let dnn_list = dnn_block(&session_values);
        let tun_script = tun_script_block(&session_values)?;

        let smf_configmap = fill(
            &self.templates.smf_configmap,
            &[
                ("slice_id", &slice.id),
                ("sst", &slice.sst),
                ("sd", &slice.sd),
                ("smf_n3_ip", &smf_n3_ip),
                ("smf_n4_ip", &smf_n4_ip),
                ("upf_n4_ip", &upf_n4_ip),
                ("session_list", &smf_sessions),
                ("dnn_list", &dnn_list),
            ],
        );

        let smf_deployment = fill(
            &self.templates.smf_deployment,
            &[
                ("slice_id", &slice.id),
                ("smf_n3_addr", &record.address.smf_n3_addr),
                ("smf_n4_addr", &record.address.smf_n4_addr),
            ],
        );

        let smf_service = fill(&self.templates.smf_service, &[("slice_id", &slice.id)]);

        let upf_configmap = fill(
            &self.templates.upf_configmap,
            &[
                ("slice_id", &slice.id),
                ("upf_n3_ip", &upf_n3_ip),
                ("upf_n4_ip", &upf_n4_ip),
                ("session_list", &upf_sessions),
                ("tun_script", &tun_script),
            ],
        );

        let upf_deployment = fill(
            &self.templates.upf_deployment,
            &[
                ("slice_id", &slice.id),
                ("upf_n3_addr", &record.address.upf_n3_addr),
                ("upf_n4_addr", &record.address.upf_n4_addr),
            ],
        );

        Ok(vec![
            smf_configmap,
            smf_deployment,
            smf_service,
            upf_configmap,
            upf_deployment,
        ])
    }

    /// ServiceMonitors for the amf, smf and upf exporters. An empty slice id
    /// renders the global monitors: no `slice` label and unsuffixed names.
    pub fn render_mde(&self, slice_id: &str) -> anyhow::Result<String> {
        let value = MdeValue {
            slice_id: slice_id.to_string(),
            interval: self.monitoring_interval,
        };

        let docs: Vec<String> = NFS
            .iter()
            .map(|nf| {
                let name = if value.slice_id.is_empty() {
                    format!("{}-servicemonitor", nf)
                } else {
                    format!("{}{}-servicemonitor", nf, value.slice_id)
                };

                let mut doc = fill(
                    &self.templates.mde_servicemonitor,
                    &[
                        ("name", &name),
                        ("nf", nf),
                        ("interval", &value.interval.to_string()),
                    ],
                );
                doc = fill_optional_line(
                    &doc,
                    "slice_label",
                    &value.slice_id,
                    &format!("    slice: {}", value.slice_id),
                );
                doc = fill_optional_line(
                    &doc,
                    "selector_slice",
                    &value.slice_id,
                    &format!("      slice: {}", value.slice_id),
                );
                doc
            })
            .collect();

        Ok(docs.join("---\n"))
    }

    /// KPI calculator deployment + service, suffixed by slice id when one is
    /// given.
    pub fn render_kpi_calc(&self, slice_id: &str) -> anyhow::Result<String> {
        let value = KpiCalcValue {
            slice_id: slice_id.to_string(),
            thanos_url: self.thanos_url.clone(),
        };

        Ok(fill(
            &self.templates.kpi_calculator,
            &[
                ("slice_id", &value.slice_id),
                ("raw_slice_id", &value.slice_id),
                ("thanos_url", &value.thanos_url),
            ],
        ))
    }
}

fn fill(template: &str, pairs: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, val) in pairs {
        out = out.replace(&format!("{{{{{}}}}}", key), val);
    }
    out
}

/// Replaces a whole placeholder line: dropped when `condition` is empty,
/// substituted with `line` otherwise.
fn fill_optional_line(template: &str, key: &str, condition: &str, line: &str) -> String {
    let placeholder = format!("{{{{{}}}}}\n", key);
    if condition.is_empty() {
        template.replace(&placeholder, "")
    } else {
        template.replace(&placeholder, &format!("{}\n", line))
    }
}

/// Strips the mask off a CIDR, leaving the host address for config files.
fn host_ip(cidr: &str) -> anyhow::Result<String> {
    let parsed = Ipv4Cidr::parse(cidr)
        .map_err(anyhow::Error::msg)
        .with_context(|| format!("bad address {:?}", cidr))?;
    Ok(parsed.addr().to_string())
}

fn session_block(sessions: &[SessionValue], with_dev: bool) -> anyhow::Result<String> {
    let mut out = String::new();
    for session in sessions {
        let gateway = session.gateway().map_err(anyhow::Error::msg)?;
        writeln!(out, "        - subnet: {}", session.subnet)?;
        writeln!(out, "          gateway: {}", gateway)?;
        writeln!(out, "          dnn: {}", session.dnn)?;
        if with_dev {
            writeln!(out, "          dev: {}", session.dev)?;
        }
    }
    Ok(out.trim_end().to_string())
}

fn dnn_block(sessions: &[SessionValue]) -> String {
    sessions
        .iter()
        .map(|s| format!("              - {}", s.dnn))
        .collect::<Vec<_>>()
        .join("\n")
}

/// One tun device per session: create, address with the gateway, bring up,
/// masquerade the subnet.
fn tun_script_block(sessions: &[SessionValue]) -> anyhow::Result<String> {
    let mut out = String::new();
    for session in sessions {
        let gateway = session.gateway().map_err(anyhow::Error::msg)?;
        writeln!(out, "    ip tuntap add name {} mode tun;", session.dev)?;
        writeln!(out, "    ip addr add {} dev {};", gateway, session.dev)?;
        writeln!(out, "    ip link set {} up;", session.dev)?;
        writeln!(
            out,
            "    iptables -t nat -A POSTROUTING -s {} ! -o {} -j MASQUERADE;",
            session.subnet, session.dev
        )?;
    }
    Ok(out.trim_end().to_string())
}
