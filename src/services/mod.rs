pub mod ipam;
pub mod lifecycle;
pub mod metrics;
pub mod monarch;
pub mod pool;
