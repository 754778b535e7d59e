use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mongodb::bson::doc;
use mongodb::{Collection, Database};
use serde::{Deserialize, Serialize};

use super::pool::{first_free_host, first_free_subnet, host_cidr, Ipv4Cidr};
use crate::config::IpamConfig;

const POOLS_COLLECTION: &str = "ip_pools";
const N3_POOL: &str = "n3";
const N4_POOL: &str = "n4";
const SESSION_POOL: &str = "session";

/// Writers race on the pool document; a handful of optimistic retries is
/// enough to drain any realistic contention.
const MAX_WRITE_ATTEMPTS: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum IpamError {
    #[error("invalid CIDR: {0}")]
    InvalidCidr(String),
    #[error("address {0} does not belong to the {1} pool")]
    WrongPool(String, String),
    #[error("address {0} is not allocated")]
    NotAllocated(String),
    #[error("pool {0} exhausted")]
    PoolExhausted(String),
    #[error("pool {0} missing")]
    PoolMissing(String),
    #[error("write contention on pool {0}")]
    Contention(String),
    #[error("ipam operation timed out")]
    Timeout,
    #[error(transparent)]
    Database(#[from] mongodb::error::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PoolDoc {
    #[serde(rename = "_id")]
    name: String,
    cidr: String,
    /// Gateway-convention addresses, never allocatable, never releasable.
    reserved: Vec<String>,
    /// Live allocations: plain host IPs for n3/n4, child CIDRs for session.
    allocated: Vec<String>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Persistent IP address management over three pools: N3 and N4 host
/// addresses plus the session parent prefix carved into per-session subnets.
pub struct IpamService {
    db: Database,
    timeout: Duration,
    n3: Ipv4Cidr,
    n4: Ipv4Cidr,
    session: Ipv4Cidr,
    session_subnet_length: u8,
}

impl IpamService {
    /// Validates the pool configuration and bootstraps the pool documents.
    /// An invalid session subnet length is fatal, matching startup contract.
    pub async fn new(db: Database, config: &IpamConfig) -> anyhow::Result<Self> {
        let n3 = Ipv4Cidr::parse(&config.n3_network).map_err(anyhow::Error::msg)?;
        let n4 = Ipv4Cidr::parse(&config.n4_network).map_err(anyhow::Error::msg)?;
        let session = Ipv4Cidr::parse(&config.session_network).map_err(anyhow::Error::msg)?;

        if config.session_subnet_length < session.prefix_len()
            || config.session_subnet_length > 32
        {
            anyhow::bail!(
                "session subnet length {} invalid for parent {}",
                config.session_subnet_length,
                session
            );
        }

        let ipam = Self {
            db,
            timeout: config.timeout,
            n3,
            n4,
            session,
            session_subnet_length: config.session_subnet_length,
        };

        tokio::time::timeout(Duration::from_secs(60), ipam.bootstrap())
            .await
            .map_err(|_| anyhow::anyhow!("ipam bootstrap timed out"))??;

        Ok(ipam)
    }

    fn pools(&self) -> Collection<PoolDoc> {
        self.db.collection(POOLS_COLLECTION)
    }

    async fn bootstrap(&self) -> anyhow::Result<()> {
        for (name, cidr) in [
            (N3_POOL, self.n3),
            (N4_POOL, self.n4),
            (SESSION_POOL, self.session),
        ] {
            self.ensure_pool(name, &cidr).await?;
        }

        // Reserve the .1 and .2 gateway addresses in the host pools.
        for (name, cidr) in [(N3_POOL, self.n3), (N4_POOL, self.n4)] {
            for offset in [1, 2] {
                if let Some(ip) = cidr.nth_host(offset) {
                    if cidr.broadcast() == ip {
                        continue;
                    }
                    self.reserve(name, &ip.to_string()).await?;
                }
            }
        }

        Ok(())
    }

    async fn ensure_pool(&self, name: &str, cidr: &Ipv4Cidr) -> anyhow::Result<()> {
        if let Some(existing) = self.pools().find_one(doc! { "_id": name }).await? {
            if existing.cidr != cidr.to_string() {
                anyhow::bail!(
                    "pool {} already exists with CIDR {}, configured {}",
                    name,
                    existing.cidr,
                    cidr
                );
            }
            return Ok(());
        }

        let pool = PoolDoc {
            name: name.to_string(),
            cidr: cidr.to_string(),
            reserved: Vec::new(),
            allocated: Vec::new(),
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        match self.pools().insert_one(&pool).await {
            Ok(_) => {
                tracing::info!(pool = name, cidr = %cidr, "created IPAM pool");
                Ok(())
            }
            // A concurrent bootstrap won the insert; the pool exists.
            Err(e) if is_duplicate_key(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Marks a specific address reserved. Reserving an address that is
    /// already reserved is a success.
    async fn reserve(&self, pool_name: &str, ip: &str) -> anyhow::Result<()> {
        self.pools()
            .update_one(
                doc! { "_id": pool_name, "reserved": { "$ne": ip } },
                doc! {
                    "$push": { "reserved": ip },
                    "$inc": { "version": 1 },
                    "$set": { "updated_at": Utc::now().to_rfc3339() }
                },
            )
            .await?;
        Ok(())
    }

    pub async fn allocate_n3_addr(&self) -> Result<String, IpamError> {
        self.with_timeout(self.allocate_host(N3_POOL, &self.n3)).await
    }

    pub async fn allocate_n4_addr(&self) -> Result<String, IpamError> {
        self.with_timeout(self.allocate_host(N4_POOL, &self.n4)).await
    }

    /// Carves a child prefix of the configured length out of the session
    /// network.
    pub async fn allocate_session_subnet(&self) -> Result<String, IpamError> {
        self.with_timeout(self.allocate_subnet()).await
    }

    pub async fn release_n3_addr(&self, addr: &str) -> Result<(), IpamError> {
        self.with_timeout(self.release_host(N3_POOL, &self.n3, addr))
            .await
    }

    pub async fn release_n4_addr(&self, addr: &str) -> Result<(), IpamError> {
        self.with_timeout(self.release_host(N4_POOL, &self.n4, addr))
            .await
    }

    pub async fn release_session_subnet(&self, subnet: &str) -> Result<(), IpamError> {
        self.with_timeout(self.release_subnet(subnet)).await
    }

    async fn with_timeout<T, F>(&self, fut: F) -> Result<T, IpamError>
    where
        F: Future<Output = Result<T, IpamError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(res) => res,
            Err(_) => Err(IpamError::Timeout),
        }
    }

    async fn load_pool(&self, name: &str) -> Result<PoolDoc, IpamError> {
        self.pools()
            .find_one(doc! { "_id": name })
            .await?
            .ok_or_else(|| IpamError::PoolMissing(name.to_string()))
    }

    async fn allocate_host(&self, name: &str, cidr: &Ipv4Cidr) -> Result<String, IpamError> {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let pool = self.load_pool(name).await?;
            let taken: HashSet<String> = pool
                .reserved
                .iter()
                .chain(pool.allocated.iter())
                .cloned()
                .collect();
            let ip = first_free_host(cidr, &taken)
                .ok_or_else(|| IpamError::PoolExhausted(name.to_string()))?;

            if self.try_push(name, pool.version, &ip.to_string()).await? {
                tracing::info!(pool = name, addr = %ip, "allocated host address");
                return Ok(host_cidr(ip, cidr));
            }
        }
        Err(IpamError::Contention(name.to_string()))
    }

    async fn allocate_subnet(&self) -> Result<String, IpamError> {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let pool = self.load_pool(SESSION_POOL).await?;
            let taken: HashSet<String> = pool.allocated.iter().cloned().collect();
            let child = first_free_subnet(&self.session, self.session_subnet_length, &taken)
                .ok_or_else(|| IpamError::PoolExhausted(SESSION_POOL.to_string()))?;

            if self
                .try_push(SESSION_POOL, pool.version, &child.to_string())
                .await?
            {
                tracing::info!(subnet = %child, "allocated session subnet");
                return Ok(child.to_string());
            }
        }
        Err(IpamError::Contention(SESSION_POOL.to_string()))
    }

    async fn release_host(
        &self,
        name: &str,
        cidr: &Ipv4Cidr,
        addr: &str,
    ) -> Result<(), IpamError> {
        let given =
            Ipv4Cidr::parse(addr).map_err(|_| IpamError::InvalidCidr(addr.to_string()))?;
        let ip = given.addr();
        if !cidr.contains(ip) {
            return Err(IpamError::WrongPool(addr.to_string(), name.to_string()));
        }

        self.remove_allocation(name, &ip.to_string()).await?;
        tracing::info!(pool = name, addr = %ip, "released host address");
        Ok(())
    }

    async fn release_subnet(&self, subnet: &str) -> Result<(), IpamError> {
        let given =
            Ipv4Cidr::parse(subnet).map_err(|_| IpamError::InvalidCidr(subnet.to_string()))?;
        if given.prefix_len() != self.session_subnet_length
            || !self.session.contains(given.network())
        {
            return Err(IpamError::WrongPool(
                subnet.to_string(),
                SESSION_POOL.to_string(),
            ));
        }

        let canonical = format!("{}/{}", given.network(), given.prefix_len());
        self.remove_allocation(SESSION_POOL, &canonical).await?;
        tracing::info!(subnet = %canonical, "released session subnet");
        Ok(())
    }

    async fn remove_allocation(&self, name: &str, value: &str) -> Result<(), IpamError> {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let pool = self.load_pool(name).await?;
            if !pool.allocated.iter().any(|a| a == value) {
                return Err(IpamError::NotAllocated(value.to_string()));
            }

            let res = self
                .pools()
                .update_one(
                    doc! { "_id": name, "version": pool.version },
                    doc! {
                        "$pull": { "allocated": value },
                        "$inc": { "version": 1 },
                        "$set": { "updated_at": Utc::now().to_rfc3339() }
                    },
                )
                .await?;
            if res.modified_count == 1 {
                return Ok(());
            }
        }
        Err(IpamError::Contention(name.to_string()))
    }

    /// Versioned append; returns false when another writer advanced the pool
    /// in between, in which case the caller recomputes its candidate.
    async fn try_push(&self, name: &str, version: i64, value: &str) -> Result<bool, IpamError> {
        let res = self
            .pools()
            .update_one(
                doc! { "_id": name, "version": version },
                doc! {
                    "$push": { "allocated": value },
                    "$inc": { "version": 1 },
                    "$set": { "updated_at": Utc::now().to_rfc3339() }
                },
            )
            .await?;
        Ok(res.modified_count == 1)
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};
    matches!(
        *err.kind,
        ErrorKind::Write(WriteFailure::WriteError(ref we)) if we.code == 11000
    )
}
