use crate::services::pool::Ipv4Cidr;

/// Slice identity fields fed into the manifest templates.
#[derive(Debug, Clone)]
pub struct SliceValue {
    /// `"{sst}-{sd}"`.
    pub id: String,
    pub sst: String,
    pub sd: String,
}

/// One PDU session's share of the rendered config: its subnet, DNN and the
/// tunnel device the UPF creates for it.
#[derive(Debug, Clone)]
pub struct SessionValue {
    /// e.g. `10.40.0.0/16`.
    pub subnet: String,
    pub dnn: String,
    /// e.g. `ogstun0`.
    pub dev: String,
}

impl SessionValue {
    /// The session gateway is the `.1` host of the subnet, rendered with the
    /// subnet's own mask (`10.40.0.1/16`).
    pub fn gateway(&self) -> Result<String, String> {
        let cidr = Ipv4Cidr::parse(&self.subnet)?;
        let gw = cidr
            .nth_host(1)
            .ok_or_else(|| format!("subnet {} has no usable host", self.subnet))?;
        Ok(format!("{}/{}", gw, cidr.prefix_len()))
    }
}

#[derive(Debug, Clone)]
pub struct MdeValue {
    pub slice_id: String,
    /// Scrape interval in seconds.
    pub interval: u8,
}

#[derive(Debug, Clone)]
pub struct KpiCalcValue {
    pub slice_id: String,
    pub thanos_url: String,
}
