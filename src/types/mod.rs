mod address;
mod monitor;
mod play;
mod sla;
mod slice;

pub use address::{AddressValue, SliceRecord};
pub use monitor::{
    Duration as MonitorDuration, Kpi, Monitor, MonitoringInterval, Scope, SubCounter,
    SupportedKpi, KPI_SLICE_THROUGHPUT,
};
pub use play::{BandwidthSpec, Play, ResourceSpec, SchedulingSpec, MAX_PRIORITY};
pub use sla::Sla;
pub use slice::{Ambr, Arp, BitRate, Flow, PccRule, Qos, Session, Slice};
